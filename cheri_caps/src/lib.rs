#![cfg_attr(not(feature = "std"), no_std)]

pub mod capability;
pub mod fields;
pub mod util;

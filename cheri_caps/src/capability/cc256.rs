//! The uncompressed 256-bit capability format.
//!
//! Four native-endian 64-bit words:
//!
//! ```text
//! word 0: | reserved (8) | otype ^ UNSEALED (24) | uperms (16) | perms (15) | flags (1) |
//! word 1: cursor
//! word 2: base
//! word 3: length ^ u64::MAX
//! ```
//!
//! The XORs make the all-zeroes pattern decode to an unsealed capability covering the whole address space.
//! Bits 12..15 of the permissions field are reserved, and only exposed when the capability is untagged.

use core::marker::PhantomData;

use crate::{
    cap_fields,
    fields::{encode_field, extract_field},
    util::{byte_array_to_words, byte_slice_to_words, mask_if_false, split_carry_mask, words_to_byte_array},
};

use super::{AddrRange, CapFormat, Capability};

#[cfg(feature = "rand")]
pub mod rand;
#[cfg(all(test, feature = "rand"))]
mod test;

pub const METADATA_WORD: usize = 0;
pub const CURSOR_WORD: usize = 1;
pub const BASE_WORD: usize = 2;
pub const LENGTH_WORD: usize = 3;

cap_fields! {
    /// Fields of the metadata word.
    pub mod word0: 64 bits at 0 {
        FLAGS: 0, 0;
        PERMS: 15, 1;
        UPERMS: 31, 16;
        OTYPE: 55, 32;
        RESERVED: 63, 56;
    }
}

cap_fields! {
    /// Subdivision of [word0::PERMS].
    pub mod perms within super::word0::PERMS {
        HWPERMS: 11, 0;
        HWPERMS_RESERVED: 14, 12;
    }
}

/// Stored length of a null capability (before the XOR).
pub const NULL_LENGTH: u64 = u64::MAX;
pub const NULL_TOP: u128 = u64::MAX as u128;

/// Permission bits visible in a tagged capability.
pub const PERMS_ALL_BITS: u64 = perms::HWPERMS.mask_in_parent();
/// Permission bits visible in an untagged capability.
pub const PERMS_ALL_BITS_UNTAGGED: u64 = PERMS_ALL_BITS | perms::HWPERMS_RESERVED.mask_in_parent();

/// Permission mask for the given tag, selected without branching.
///
/// ```
/// # use cheri_caps::capability::cc256::perms_mask;
/// assert_eq!(perms_mask(true), 0xfff);
/// assert_eq!(perms_mask(false), 0x7fff);
/// ```
#[inline(always)]
pub const fn perms_mask(tag: bool) -> u64 {
    PERMS_ALL_BITS | (perms::HWPERMS_RESERVED.mask_in_parent() & mask_if_false(tag))
}

/// The raw 32-byte memory image of a 256-bit capability.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct InMemoryCap256 {
    u64s: [u64; 4],
}
impl InMemoryCap256 {
    pub const ZERO: Self = Self { u64s: [0; 4] };

    pub const fn from_words(u64s: [u64; 4]) -> Self {
        Self { u64s }
    }

    pub const fn words(&self) -> [u64; 4] {
        self.u64s
    }

    #[inline(always)]
    pub const fn word(&self, index: usize) -> u64 {
        self.u64s[index]
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_words(byte_array_to_words(bytes))
    }

    /// Returns None if `bytes` isn't exactly 32 bytes long.
    pub fn from_byte_slice(bytes: &[u8]) -> Option<Self> {
        byte_slice_to_words(bytes).map(Self::from_words)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        words_to_byte_array(&self.u64s)
    }
}
impl From<[u64; 4]> for InMemoryCap256 {
    fn from(value: [u64; 4]) -> Self {
        Self::from_words(value)
    }
}
impl From<InMemoryCap256> for [u64; 4] {
    fn from(value: InMemoryCap256) -> Self {
        value.u64s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cc256;

pub type Cap256 = Capability<Cc256>;

impl CapFormat for Cc256 {
    type Wire = InMemoryCap256;

    const NAME: &'static str = "cc256";
    const WIRE_BYTES: usize = core::mem::size_of::<InMemoryCap256>();

    const HWPERMS_BITS: u32 = perms::HWPERMS.size;
    const HWPERMS_RESERVED_BITS: u32 = perms::HWPERMS_RESERVED.size;
    const UPERMS_BITS: u32 = word0::UPERMS.size;
    const OTYPE_BITS: u32 = word0::OTYPE.size;
    const FLAGS_BITS: u32 = word0::FLAGS.size;
    const RESERVED_BITS: u32 = word0::RESERVED.size;

    #[inline(always)]
    fn decode_bits(mem: &InMemoryCap256, tag: bool) -> Cap256 {
        let w0 = mem.word(METADATA_WORD);
        let base = mem.word(BASE_WORD);
        let length = mem.word(LENGTH_WORD) ^ NULL_LENGTH;
        Capability {
            bounds: AddrRange::base_len_64(base, length),
            cursor: mem.word(CURSOR_WORD),
            permissions: (extract_field(w0, &word0::PERMS) & perms_mask(tag)) as u32,
            user_permissions: extract_field(w0, &word0::UPERMS) as u32,
            otype: extract_field(w0, &word0::OTYPE) as u32 ^ Self::OTYPE_UNSEALED,
            flags: extract_field(w0, &word0::FLAGS) as u8,
            reserved: extract_field(w0, &word0::RESERVED) as u8,
            tag,
            format: PhantomData,
        }
    }

    #[inline(always)]
    fn encode_bits(cap: &Cap256) -> InMemoryCap256 {
        // Untagged values write back exactly what was loaded, including the reserved permissions
        let w0 = encode_field(cap.flags as u64, &word0::FLAGS)
            | encode_field(cap.permissions as u64 & perms_mask(cap.tag), &word0::PERMS)
            | encode_field(cap.user_permissions as u64, &word0::UPERMS)
            | encode_field((cap.otype ^ Self::OTYPE_UNSEALED) as u64, &word0::OTYPE)
            | encode_field(cap.reserved as u64, &word0::RESERVED);

        // A length of 2^64 or more saturates to u64::MAX
        let (length, saturate) = split_carry_mask(cap.length());

        let mut u64s = [0; 4];
        u64s[METADATA_WORD] = w0;
        u64s[CURSOR_WORD] = cap.cursor;
        u64s[BASE_WORD] = cap.base();
        u64s[LENGTH_WORD] = (length | saturate) ^ NULL_LENGTH;
        InMemoryCap256::from_words(u64s)
    }

    fn null_wire() -> InMemoryCap256 {
        InMemoryCap256::ZERO
    }
}

#![cfg_attr(not(feature = "std"), no_std)]

use cheri_caps::capability::{
    cc256::{Cc256, InMemoryCap256},
    AddrRange, CapDecodeErr, CapEncodeErr, CapFormat, Capability,
};
use paste::paste;

/// Little-endian representation of a 128-bit number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct CCapU128([u8; 16]);

impl From<u128> for CCapU128 {
    fn from(value: u128) -> Self {
        Self(value.to_le_bytes())
    }
}
impl From<CCapU128> for u128 {
    fn from(value: CCapU128) -> Self {
        u128::from_le_bytes(value.0)
    }
}

/// The in-memory layout of a 256-bit capability, as four native-endian words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CCap256Mem {
    pub u64s: [u64; 4],
}

impl From<CCap256Mem> for InMemoryCap256 {
    fn from(value: CCap256Mem) -> Self {
        InMemoryCap256::from_words(value.u64s)
    }
}
impl From<InMemoryCap256> for CCap256Mem {
    fn from(value: InMemoryCap256) -> Self {
        Self { u64s: value.words() }
    }
}

/// A decoded capability.
/// `top` is up to 65 bits wide, so it's passed as a little-endian 128-bit number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CCapRegister {
    pub base: u64,
    pub top: CCapU128,
    pub cursor: u64,
    pub perms: u32,
    pub uperms: u32,
    pub otype: u32,
    pub flags: u8,
    pub reserved: u8,
    pub tag: bool,
}

impl<F: CapFormat> From<Capability<F>> for CCapRegister {
    fn from(value: Capability<F>) -> Self {
        Self {
            base: value.base(),
            top: value.top().into(),
            cursor: value.cursor,
            perms: value.permissions,
            uperms: value.user_permissions,
            otype: value.otype,
            flags: value.flags,
            reserved: value.reserved,
            tag: value.tag,
        }
    }
}

impl CCapRegister {
    fn to_cap<F: CapFormat>(self) -> Result<Capability<F>, CCapResult> {
        let bounds = AddrRange::try_start_end(self.base, self.top.into()).ok_or(CCapResult::Encode_InvalidBounds)?;
        Ok(Capability {
            user_permissions: self.uperms,
            otype: self.otype,
            flags: self.flags,
            reserved: self.reserved,
            ..Capability::new(bounds, self.cursor, self.perms, self.tag)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
#[repr(i32)]
pub enum CCapResult {
    Success = 0,
    Decode_ReservedBitsInTaggedCap = 1,
    Encode_ReservedBitsInTaggedCap = 2,
    Encode_FieldTooWide = 3,
    Encode_LengthSaturated = 4,
    Encode_InvalidBounds = 5,
    NullRequiredArgs = 100,
}

/// Convert a CCapResult enum to a null-terminated static immutable C string.
/// Invokes undefined behaviour if passed an value not in the enumeration.
#[no_mangle]
pub unsafe extern "C" fn ccap_result_str(res: CCapResult) -> *const core::ffi::c_char {
    let s: &'static str = match res {
        CCapResult::Success => "CCapResult::Success\0",
        CCapResult::Decode_ReservedBitsInTaggedCap => "CCapResult::Decode_ReservedBitsInTaggedCap\0",
        CCapResult::Encode_ReservedBitsInTaggedCap => "CCapResult::Encode_ReservedBitsInTaggedCap\0",
        CCapResult::Encode_FieldTooWide => "CCapResult::Encode_FieldTooWide\0",
        CCapResult::Encode_LengthSaturated => "CCapResult::Encode_LengthSaturated\0",
        CCapResult::Encode_InvalidBounds => "CCapResult::Encode_InvalidBounds\0",
        CCapResult::NullRequiredArgs => "CCapResult::NullRequiredArgs\0",
    };
    s.as_ptr() as *const core::ffi::c_char
}

impl From<CapDecodeErr> for CCapResult {
    fn from(value: CapDecodeErr) -> Self {
        match value {
            CapDecodeErr::ReservedBitsInTaggedCap { .. } => CCapResult::Decode_ReservedBitsInTaggedCap,
        }
    }
}
impl From<CapEncodeErr> for CCapResult {
    fn from(value: CapEncodeErr) -> Self {
        match value {
            CapEncodeErr::ReservedBitsInTaggedCap { .. } => CCapResult::Encode_ReservedBitsInTaggedCap,
            CapEncodeErr::FieldTooWide { .. } => CCapResult::Encode_FieldTooWide,
            CapEncodeErr::LengthSaturated { .. } => CCapResult::Encode_LengthSaturated,
        }
    }
}

/// Define the API in a rust macro so we can reproduce it for multiple different capability widths
macro_rules! ccap_api {
    ($prefix:ident, $ctype:ty, $rtype:ty) => {
        paste! {

/// Decode the in-memory capability `mem` into `cap`, given its tag.
///
/// mem and cap are non-optional, and the function returns `NullRequiredArgs` if either are null.
///
/// Reserved bits in a tagged capability are passed through (and trip an assertion in debug builds),
/// use the `_checked` variant for capabilities from untrusted sources.
#[no_mangle]
pub unsafe extern "C" fn [< $prefix _decompress_mem >](mem: *const $ctype, tagged: bool, cap: *mut CCapRegister) -> CCapResult {
    if mem.is_null() || cap.is_null() {
        return CCapResult::NullRequiredArgs;
    }
    *cap = <$rtype as CapFormat>::decode(&(*mem).into(), tagged).into();
    CCapResult::Success
}

/// Decode the in-memory capability `mem` into `cap`, given its tag.
///
/// mem and cap are non-optional, and the function returns `NullRequiredArgs` if either are null.
///
/// Returns `Decode_ReservedBitsInTaggedCap` and leaves `cap` untouched if `tagged` is set and the reserved bits aren't zero.
#[no_mangle]
pub unsafe extern "C" fn [< $prefix _decompress_mem_checked >](mem: *const $ctype, tagged: bool, cap: *mut CCapRegister) -> CCapResult {
    if mem.is_null() || cap.is_null() {
        return CCapResult::NullRequiredArgs;
    }
    match <$rtype as CapFormat>::decode_checked(&(*mem).into(), tagged) {
        Ok(rust_cap) => {
            *cap = rust_cap.into();
            CCapResult::Success
        }
        Err(err) => err.into(),
    }
}

/// Encode `cap` into the in-memory representation `mem`.
/// Fields are truncated to their widths, and a length above 2^64 - 1 is saturated.
///
/// cap and mem are non-optional, and the function returns `NullRequiredArgs` if either are null.
///
/// Returns `Encode_InvalidBounds` if `top` is below `base` or wider than 65 bits.
#[no_mangle]
pub unsafe extern "C" fn [< $prefix _compress_mem >](cap: *const CCapRegister, mem: *mut $ctype) -> CCapResult {
    if mem.is_null() || cap.is_null() {
        return CCapResult::NullRequiredArgs;
    }
    match (*cap).to_cap::<$rtype>() {
        Ok(rust_cap) => {
            *mem = <$rtype as CapFormat>::encode(&rust_cap).into();
            CCapResult::Success
        }
        Err(err) => err,
    }
}

/// Encode `cap` into the in-memory representation `mem`, only if it can be done without losing information.
///
/// cap and mem are non-optional, and the function returns `NullRequiredArgs` if either are null.
///
/// Returns `Encode_InvalidBounds` if `top` is below `base` or wider than 65 bits,
/// and an Encode error if a field is too wide, the length would saturate, or a tagged capability has reserved bits set.
#[no_mangle]
pub unsafe extern "C" fn [< $prefix _compress_mem_exact >](cap: *const CCapRegister, mem: *mut $ctype) -> CCapResult {
    if mem.is_null() || cap.is_null() {
        return CCapResult::NullRequiredArgs;
    }
    let rust_cap = match (*cap).to_cap::<$rtype>() {
        Ok(rust_cap) => rust_cap,
        Err(err) => return err,
    };
    match <$rtype as CapFormat>::encode_exact(&rust_cap) {
        Ok(encoded) => {
            *mem = encoded.into();
            CCapResult::Success
        }
        Err(err) => err.into(),
    }
}

/// Write the null capability (what an all-zeroes memory pattern decodes to) into `cap`.
///
/// cap is non-optional, and the function returns `NullRequiredArgs` if it is null.
#[no_mangle]
pub unsafe extern "C" fn [< $prefix _null_cap >](cap: *mut CCapRegister) -> CCapResult {
    if cap.is_null() {
        return CCapResult::NullRequiredArgs;
    }
    *cap = Capability::<$rtype>::null().into();
    CCapResult::Success
}

/// Returns true if `cap` holds any otype other than the unsealed one.
/// Returns false if `cap` is null.
#[no_mangle]
pub unsafe extern "C" fn [< $prefix _is_cap_sealed >](cap: *const CCapRegister) -> bool {
    match cap.as_ref() {
        Some(cap) => cap.otype != <$rtype as CapFormat>::OTYPE_UNSEALED,
        None => false,
    }
}

        }
    };
}

ccap_api!(cc256, CCap256Mem, Cc256);


// In standalone environments we need a way to handle panics.
// Because we will be linking these libraries into various places,
// it's more sensible to give them the option to define the print function.

extern "C" {
    /// A function called when libcheri_caps_c panics to print debug information.
    ///
    /// This function is *not* defined by libcheri_caps_c, and must be defined by the target linking the library in.
    #[cfg(not(feature = "std"))]
    pub fn ccap_panic_write_utf8(utf8: *const u8, utf_len: u64) -> u64;

    /// A function called once libcheri_caps_c has finished printing debug information,
    /// allowing the error to be surfaced to the relevant systems via e.g. an exception or an abort.
    ///
    /// This function is *not* defined by libcheri_caps_c, and must be defined by the target linking the library in.
    #[cfg(not(feature = "std"))]
    pub fn ccap_panic_complete();
}

/// core::fmt::Write impl which calls ccap_panic_write_utf8().
#[cfg(not(feature = "std"))]
struct PanicWriter();
#[cfg(not(feature = "std"))]
use core::fmt::Write;
#[cfg(not(feature = "std"))]
impl Write for PanicWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let expected_len = s.len() as u64;
        let actual_len = unsafe { ccap_panic_write_utf8(s.as_bytes().as_ptr(), expected_len) };
        if expected_len != actual_len {
            Err(core::fmt::Error)
        } else {
            Ok(())
        }
    }
}

#[cfg(not(feature = "std"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    writeln!(PanicWriter(), "{}", info).ok();

    unsafe {
        ccap_panic_complete();
    }

    loop {}
}

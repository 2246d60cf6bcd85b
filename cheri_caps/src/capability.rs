use core::marker::PhantomData;

#[cfg(feature = "std")]
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AddrRange {
    start: u64,
    end: u128, // 65 bits at most
}
impl AddrRange {
    pub const FULL_ADDR_SPACE: Self = Self { start: 0, end: 1 << 64 };
    /// The largest `end` any capability bounds can hold: a 64-bit base plus a 64-bit length.
    pub const MAX_END: u128 = (1 << 65) - 1;

    pub fn start_end_64(start: u64, end: u64) -> Self {
        Self::start_end(start, end as u128)
    }

    pub fn start_end(start: u64, end: u128) -> Self {
        match Self::try_start_end(start, end) {
            Some(r) => r,
            None => panic!("Can't create an AddrRange [{:x}, {:x})", start, end),
        }
    }

    /// Like [AddrRange::start_end], but returns None instead of panicking if `end` is below `start` or wider than 65 bits.
    ///
    /// ```
    /// # use cheri_caps::capability::AddrRange;
    /// assert!(AddrRange::try_start_end(0x10, 0x20).is_some());
    /// assert!(AddrRange::try_start_end(0x20, 0x10).is_none());
    /// assert!(AddrRange::try_start_end(0, 1 << 65).is_none());
    /// ```
    pub const fn try_start_end(start: u64, end: u128) -> Option<Self> {
        if (start as u128) > end || end > Self::MAX_END {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// Always valid: `u64::MAX + u64::MAX` still fits in 65 bits.
    #[inline(always)]
    pub const fn base_len_64(base: u64, len: u64) -> Self {
        Self {
            start: base,
            end: base as u128 + len as u128,
        }
    }

    pub fn base_len(base: u64, len: u128) -> Self {
        let end = (base as u128).checked_add(len).unwrap_or(u128::MAX);
        Self::start_end(base, end)
    }

    /// Returns true if `self` fully contains the entirety of `other`.
    ///
    /// ```
    /// # use cheri_caps::capability::AddrRange;
    /// assert!(AddrRange::FULL_ADDR_SPACE.encompasses(&AddrRange::FULL_ADDR_SPACE));
    /// assert!(AddrRange::FULL_ADDR_SPACE.encompasses(&AddrRange::start_end_64(0, u64::MAX)));
    /// assert!(!AddrRange::start_end_64(0, u64::MAX).encompasses(&AddrRange::FULL_ADDR_SPACE));
    /// assert!(AddrRange::start_end_64(0, 0x100).encompasses(&AddrRange::start_end_64(0x50, 0x100)));
    /// assert!(!AddrRange::start_end_64(0, 0x100).encompasses(&AddrRange::start_end_64(0x50, 0x101)));
    /// ```
    pub const fn encompasses(&self, other: &AddrRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    pub const fn base(&self) -> u64 {
        self.start
    }
    pub const fn top(&self) -> u128 {
        self.end
    }
    pub const fn len(&self) -> u128 {
        self.end - (self.start as u128)
    }
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl core::fmt::Display for AddrRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{:x}, {:x})", self.start, self.end)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum CapDecodeErr {
    #[cfg_attr(feature = "std", error("Reserved bits {reserved:#x} set in tagged capability"))]
    ReservedBitsInTaggedCap { reserved: u8 },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum CapEncodeErr {
    #[cfg_attr(feature = "std", error("Reserved bits {reserved:#x} set in tagged capability"))]
    ReservedBitsInTaggedCap { reserved: u8 },
    #[cfg_attr(feature = "std", error("Value {value:#x} doesn't fit in field {field}"))]
    FieldTooWide { field: &'static str, value: u64 },
    #[cfg_attr(feature = "std", error("Length {length:#x} would be saturated to 64 bits"))]
    LengthSaturated { length: u128 },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum CapEncDecErr {
    #[cfg_attr(feature = "std", error("Enc: {0}"))]
    Enc(CapEncodeErr),
    #[cfg_attr(feature = "std", error("Dec: {0}"))]
    Dec(CapDecodeErr),
}
impl From<CapEncodeErr> for CapEncDecErr {
    fn from(value: CapEncodeErr) -> Self {
        Self::Enc(value)
    }
}
impl From<CapDecodeErr> for CapEncDecErr {
    fn from(value: CapDecodeErr) -> Self {
        Self::Dec(value)
    }
}

/// A capability width and its in-memory representation.
///
/// Every width exposes the same decode/encode contract over [Capability], so callers pick a width with a
/// type parameter and keep their call sites unchanged.
/// Compressed widths (64- and 128-bit) implement this trait outside this crate.
///
/// `decode_bits` and `encode_bits` are the raw conversions and must be total: no input within the declared
/// field widths may make them fail or panic.
/// The provided `decode` and `encode` wrap them with a debug-only check of the tag/reserved invariant,
/// and `decode_checked` and `encode_exact` are the validating variants for trust boundaries.
pub trait CapFormat: Sized + Copy + core::fmt::Debug + PartialEq + Eq {
    type Wire: Copy + core::fmt::Debug + PartialEq + Eq;

    const NAME: &'static str;
    const WIRE_BYTES: usize;

    /// Architectural hardware permissions, visible whether or not the capability is tagged.
    const HWPERMS_BITS: u32;
    /// Extra permission bits only exposed (verbatim) when the capability is untagged.
    const HWPERMS_RESERVED_BITS: u32;
    const UPERMS_BITS: u32;
    const OTYPE_BITS: u32;
    const FLAGS_BITS: u32;
    const RESERVED_BITS: u32;

    const MAX_REPRESENTABLE_OTYPE: u32 = ((1u64 << Self::OTYPE_BITS) - 1) as u32;
    // The top 16 otypes are reserved
    const FIRST_SPECIAL_OTYPE: u32 = Self::MAX_REPRESENTABLE_OTYPE;
    const OTYPE_UNSEALED: u32 = Self::MAX_REPRESENTABLE_OTYPE;
    const OTYPE_SENTRY: u32 = Self::MAX_REPRESENTABLE_OTYPE - 1;
    const LAST_SPECIAL_OTYPE: u32 = Self::MAX_REPRESENTABLE_OTYPE - 15;
    /// Sealing with an otype below this bound never collides with a special otype.
    const LAST_NONRESERVED_OTYPE: u32 = Self::MAX_REPRESENTABLE_OTYPE - 15;

    fn decode_bits(wire: &Self::Wire, tag: bool) -> Capability<Self>;
    fn encode_bits(cap: &Capability<Self>) -> Self::Wire;

    /// The in-memory pattern of a null capability.
    fn null_wire() -> Self::Wire;

    /// Check that encoding `cap` wouldn't lose information, beyond the field widths checked by
    /// [Capability::check_field_widths].
    fn check_representable(cap: &Capability<Self>) -> Result<(), CapEncodeErr> {
        let length = cap.length();
        if length > u64::MAX as u128 {
            Err(CapEncodeErr::LengthSaturated { length })
        } else {
            Ok(())
        }
    }

    /// Decode `wire` given its out-of-band tag.
    ///
    /// Reserved bits in a tagged capability trip a debug assertion and are otherwise passed through.
    #[inline(always)]
    fn decode(wire: &Self::Wire, tag: bool) -> Capability<Self> {
        let cap = Self::decode_bits(wire, tag);
        debug_assert!(!(cap.tag && cap.reserved != 0), "Unknown reserved bits set in tagged capability");
        cap
    }

    /// Encode `cap`, silently truncating fields to their widths and saturating the length.
    #[inline(always)]
    fn encode(cap: &Capability<Self>) -> Self::Wire {
        debug_assert!(!(cap.tag && cap.reserved != 0), "Unknown reserved bits set in tagged capability");
        Self::encode_bits(cap)
    }

    /// Decode `wire`, rejecting a tagged capability with reserved bits set.
    /// Intended for capabilities arriving from untrusted sources.
    fn decode_checked(wire: &Self::Wire, tag: bool) -> Result<Capability<Self>, CapDecodeErr> {
        let cap = Self::decode_bits(wire, tag);
        if let Err(e) = cap.check_reserved() {
            log::warn!("{}: rejecting decoded capability: {:?}", Self::NAME, e);
            return Err(e);
        }
        Ok(cap)
    }

    /// Encode `cap` only if the result decodes back to exactly `cap`.
    fn encode_exact(cap: &Capability<Self>) -> Result<Self::Wire, CapEncodeErr> {
        let checked = match cap.check_reserved() {
            Ok(()) => cap.check_field_widths().and_then(|_| Self::check_representable(cap)),
            Err(CapDecodeErr::ReservedBitsInTaggedCap { reserved }) => {
                Err(CapEncodeErr::ReservedBitsInTaggedCap { reserved })
            }
        };
        if let Err(e) = checked {
            log::warn!("{}: refusing lossy encode: {:?}", Self::NAME, e);
            return Err(e);
        }
        Ok(Self::encode_bits(cap))
    }

    /// Validate a wire image from an untrusted source by decoding it and re-encoding it exactly.
    /// Returns the decoded capability only if the image is accepted by both checked paths.
    fn recode_exact(wire: &Self::Wire, tag: bool) -> Result<Capability<Self>, CapEncDecErr> {
        let cap = Self::decode_checked(wire, tag)?;
        Self::encode_exact(&cap)?;
        Ok(cap)
    }
}

/// A decoded capability of width `F`.
///
/// Fields are plain values, the record is freely copied, and it's only ever replaced whole.
/// The only invariant not enforced by construction is that a tagged capability has no reserved bits,
/// see [Capability::check_reserved].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability<F: CapFormat> {
    pub bounds: AddrRange,
    pub cursor: u64,
    pub permissions: u32,
    pub user_permissions: u32,
    pub otype: u32,
    pub flags: u8,
    pub reserved: u8,
    pub tag: bool,
    pub format: PhantomData<F>,
}
impl<F: CapFormat> Capability<F> {
    /// An unsealed capability with no user permissions or flags.
    pub fn new(bounds: AddrRange, cursor: u64, permissions: u32, tag: bool) -> Self {
        Self {
            bounds,
            cursor,
            permissions,
            user_permissions: 0,
            otype: F::OTYPE_UNSEALED,
            flags: 0,
            reserved: 0,
            tag,
            format: PhantomData,
        }
    }

    /// The untagged capability an all-zeroes in-memory pattern represents.
    pub fn null() -> Self {
        F::decode_bits(&F::null_wire(), false)
    }

    pub fn base(&self) -> u64 {
        self.bounds.base()
    }
    pub fn top(&self) -> u128 {
        self.bounds.top()
    }
    pub fn length(&self) -> u128 {
        self.bounds.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.otype != F::OTYPE_UNSEALED
    }

    pub fn is_sentry(&self) -> bool {
        self.otype == F::OTYPE_SENTRY
    }

    /// The otype is one of the special codes with no assigned meaning yet.
    pub fn has_reserved_otype(&self) -> bool {
        self.otype >= F::LAST_SPECIAL_OTYPE && self.otype < F::OTYPE_SENTRY
    }

    /// The otype with the special codes mapped to negative numbers (unsealed = -1, sentry = -2, ...)
    /// the way they appear in register dumps.
    pub fn otype_signed(&self) -> i64 {
        if self.otype >= F::LAST_SPECIAL_OTYPE && self.otype <= F::MAX_REPRESENTABLE_OTYPE {
            -1 - (F::MAX_REPRESENTABLE_OTYPE - self.otype) as i64
        } else {
            self.otype as i64
        }
    }

    pub fn check_reserved(&self) -> Result<(), CapDecodeErr> {
        if self.tag && self.reserved != 0 {
            Err(CapDecodeErr::ReservedBitsInTaggedCap { reserved: self.reserved })
        } else {
            Ok(())
        }
    }

    /// Check every field fits the width `F` stores it in.
    /// Untagged capabilities may additionally carry the reserved hardware permission bits.
    pub fn check_field_widths(&self) -> Result<(), CapEncodeErr> {
        let perms_bits = if self.tag {
            F::HWPERMS_BITS
        } else {
            F::HWPERMS_BITS + F::HWPERMS_RESERVED_BITS
        };
        let checks: [(&'static str, u64, u32); 5] = [
            ("permissions", self.permissions as u64, perms_bits),
            ("user_permissions", self.user_permissions as u64, F::UPERMS_BITS),
            ("otype", self.otype as u64, F::OTYPE_BITS),
            ("flags", self.flags as u64, F::FLAGS_BITS),
            ("reserved", self.reserved as u64, F::RESERVED_BITS),
        ];
        for (field, value, bits) in checks {
            if bits < 64 && (value >> bits) != 0 {
                return Err(CapEncodeErr::FieldTooWide { field, value });
            }
        }
        Ok(())
    }
}
impl<F: CapFormat> core::fmt::Display for Capability<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} v:{} c:{:x} b:{} p:{:x} up:{:x} ot:{} fl:{:x}",
            F::NAME,
            self.tag as u8,
            self.cursor,
            self.bounds,
            self.permissions,
            self.user_permissions,
            self.otype_signed(),
            self.flags,
        )?;
        if self.reserved != 0 {
            write!(f, " rsvd:{:x}", self.reserved)?;
        }
        Ok(())
    }
}

pub mod cc256;

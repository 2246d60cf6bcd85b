//! Compile-time bit field layouts.
//!
//! A capability format declares the fields of each metadata word as inclusive `(last, start)` bit ranges,
//! and every derived quantity (size, masks, maximum value) is computed by `const fn`s so the tables never
//! exist at runtime. The [cap_fields] macro additionally asserts at build time that a table covers its word
//! exactly once, so a typo in a bit range is a compile error instead of a silently corrupted capability.

/// A named bit field inside a 64-bit word.
///
/// ```
/// # use cheri_caps::fields::FieldLayout;
/// const OTYPE: FieldLayout = FieldLayout::new("OTYPE", 55, 32);
/// assert_eq!(OTYPE.size, 24);
/// assert_eq!(OTYPE.mask_not_shifted, 0xff_ffff);
/// assert_eq!(OTYPE.mask64, 0x00ff_ffff_0000_0000);
/// assert_eq!(OTYPE.max_value, 0xff_ffff);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    /// Lowest bit of the field within the word.
    pub start: u32,
    /// Highest bit of the field within the word (inclusive).
    pub last: u32,
    pub size: u32,
    pub mask_not_shifted: u64,
    pub mask64: u64,
    pub max_value: u64,
    /// Start of the enclosing field for nested layouts, 0 for fields declared directly on a word.
    pub parent_start: u32,
}

/// Mask with the bottom `size` bits set, for `size` in `1..=64`.
const fn low_bits(size: u32) -> u64 {
    u64::MAX >> (64 - size)
}

impl FieldLayout {
    /// Declare a field occupying bits `start..=last` of a 64-bit word.
    pub const fn new(name: &'static str, last: u32, start: u32) -> Self {
        assert!(start <= last, "field start must not be above its last bit");
        assert!(last < 64, "field must fit inside a 64-bit word");
        let size = last - start + 1;
        let mask_not_shifted = low_bits(size);
        Self {
            name,
            start,
            last,
            size,
            mask_not_shifted,
            mask64: mask_not_shifted << start,
            max_value: mask_not_shifted,
            parent_start: 0,
        }
    }

    /// Declare a field whose bit numbers are given relative to a larger frame starting at `frame_offset`,
    /// e.g. a second word declared as bits 64..128 of a 128-bit capability.
    ///
    /// ```
    /// # use cheri_caps::fields::FieldLayout;
    /// let f = FieldLayout::framed("RESERVED", 127, 120, 64);
    /// assert_eq!(f.start, 56);
    /// assert_eq!(f.last, 63);
    /// ```
    pub const fn framed(name: &'static str, last: u32, start: u32, frame_offset: u32) -> Self {
        assert!(start >= frame_offset, "field starts before its frame");
        Self::new(name, last - frame_offset, start - frame_offset)
    }

    /// Declare a field whose bit numbers are relative to the start of `parent`.
    /// The resulting [FieldLayout::start] is absolute within the word, so [encode_field] and [extract_field]
    /// work on the containing word directly.
    ///
    /// ```
    /// # use cheri_caps::fields::FieldLayout;
    /// const PERMS: FieldLayout = FieldLayout::new("PERMS", 15, 1);
    /// const HWPERMS_RESERVED: FieldLayout = FieldLayout::nested("HWPERMS_RESERVED", 14, 12, PERMS);
    /// assert_eq!(HWPERMS_RESERVED.start, 13);
    /// assert_eq!(HWPERMS_RESERVED.mask_in_parent(), 0b111 << 12);
    /// ```
    pub const fn nested(name: &'static str, last: u32, start: u32, parent: FieldLayout) -> Self {
        assert!(last < parent.size, "nested field must fit inside its parent");
        let mut f = Self::new(name, last + parent.start, start + parent.start);
        f.parent_start = parent.start;
        f
    }

    /// The field mask shifted to its position within the parent field (or the word, for top-level fields).
    pub const fn mask_in_parent(&self) -> u64 {
        self.mask_not_shifted << (self.start - self.parent_start)
    }

    /// Whether `value` can be stored in this field without truncation.
    pub const fn fits(&self, value: u64) -> bool {
        value & self.max_value == value
    }
}

/// Position `value` in `field`, silently truncating anything above [FieldLayout::max_value].
///
/// ```
/// # use cheri_caps::fields::{encode_field, FieldLayout};
/// const UPERMS: FieldLayout = FieldLayout::new("UPERMS", 31, 16);
/// assert_eq!(encode_field(0xabcd, &UPERMS), 0xabcd_0000);
/// // Truncation is silent
/// assert_eq!(encode_field(0x1_abcd, &UPERMS), 0xabcd_0000);
/// ```
#[inline(always)]
pub const fn encode_field(value: u64, field: &FieldLayout) -> u64 {
    (value & field.max_value) << field.start
}

/// Pull the value of `field` out of `word`.
///
/// ```
/// # use cheri_caps::fields::{extract_field, FieldLayout};
/// const FLAGS: FieldLayout = FieldLayout::new("FLAGS", 0, 0);
/// assert_eq!(extract_field(0xffff_fffe, &FLAGS), 0);
/// assert_eq!(extract_field(0x1, &FLAGS), 1);
/// ```
#[inline(always)]
pub const fn extract_field(word: u64, field: &FieldLayout) -> u64 {
    (word >> field.start) & field.mask_not_shifted
}

/// Check every bit of `[0, width)` (relative to the fields' parent) is claimed by exactly one field.
pub const fn tiles_exactly(fields: &[FieldLayout], width: u32) -> bool {
    if width == 0 || width > 64 {
        return false;
    }
    let mut covered: u64 = 0;
    let mut i = 0;
    while i < fields.len() {
        let f = &fields[i];
        if f.last - f.parent_start >= width {
            return false;
        }
        let mask = f.mask_in_parent();
        if covered & mask != 0 {
            return false;
        }
        covered |= mask;
        i += 1;
    }
    covered == low_bits(width)
}

/// Declare a module of [FieldLayout] constants plus `WIDTH` and `ALL`, and fail the build if the fields
/// don't cover `WIDTH` bits exactly once.
///
/// Fields are declared as `NAME: last, start;`, numbered within the enclosing frame.
/// The frame form subtracts `at OFFSET` from every bit number.
/// The nested form declares fields relative to a parent field (given as a path resolved from inside the
/// generated module, so usually `super::...`), and its width is the parent's size.
///
/// ```
/// cheri_caps::cap_fields! {
///     pub mod header: 16 bits at 0 {
///         KIND: 3, 0;
///         LEN: 15, 4;
///     }
/// }
/// assert_eq!(header::LEN.size, 12);
/// assert_eq!(header::ALL.len(), 2);
/// ```
///
/// Overlapping or missing bits don't compile:
/// ```compile_fail
/// cheri_caps::cap_fields! {
///     pub mod header: 16 bits at 0 {
///         KIND: 3, 0;
///         LEN: 15, 3;
///     }
/// }
/// ```
#[macro_export]
macro_rules! cap_fields {
    (
        $(#[$meta:meta])*
        $vis:vis mod $name:ident : $width:literal bits at $offset:literal {
            $( $(#[$fmeta:meta])* $field:ident : $last:literal , $start:literal );+ $(;)?
        }
    ) => {
        $(#[$meta])*
        #[allow(dead_code)]
        $vis mod $name {
            $(
                $(#[$fmeta])*
                pub const $field: $crate::fields::FieldLayout =
                    $crate::fields::FieldLayout::framed(stringify!($field), $last, $start, $offset);
            )+

            pub const WIDTH: u32 = $width;
            pub const ALL: &[$crate::fields::FieldLayout] = &[$($field),+];

            const _: () = assert!(
                $crate::fields::tiles_exactly(ALL, WIDTH),
                "field layout does not exactly cover its declared width"
            );
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis mod $name:ident within $parent:path {
            $( $(#[$fmeta:meta])* $field:ident : $last:literal , $start:literal );+ $(;)?
        }
    ) => {
        $(#[$meta])*
        #[allow(dead_code)]
        $vis mod $name {
            $(
                $(#[$fmeta])*
                pub const $field: $crate::fields::FieldLayout =
                    $crate::fields::FieldLayout::nested(stringify!($field), $last, $start, $parent);
            )+

            pub const WIDTH: u32 = $parent.size;
            pub const ALL: &[$crate::fields::FieldLayout] = &[$($field),+];

            const _: () = assert!(
                $crate::fields::tiles_exactly(ALL, WIDTH),
                "nested field layout does not exactly cover its parent"
            );
        }
    };
}

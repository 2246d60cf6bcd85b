use ::rand::{rngs::StdRng, SeedableRng};
use assert_hex::assert_eq_hex;

use crate::capability::{AddrRange, CapDecodeErr, CapEncDecErr, CapEncodeErr, CapFormat, Capability};

use super::{
    perms, perms_mask, rand::{RandCap, RandomCategory}, word0, Cap256, Cc256, InMemoryCap256, BASE_WORD, CURSOR_WORD,
    LENGTH_WORD, METADATA_WORD, NULL_TOP, PERMS_ALL_BITS, PERMS_ALL_BITS_UNTAGGED,
};

const UNSEALED: u32 = 0xff_ffff;
const SENTRY: u32 = 0xff_fffe;

fn mem(w0: u64, cursor: u64, base: u64, length_word: u64) -> InMemoryCap256 {
    let mut u64s = [0; 4];
    u64s[METADATA_WORD] = w0;
    u64s[CURSOR_WORD] = cursor;
    u64s[BASE_WORD] = base;
    u64s[LENGTH_WORD] = length_word;
    InMemoryCap256::from_words(u64s)
}

#[test]
fn layout_matches_memory_format() {
    assert_eq!(word0::FLAGS.start, 0);
    assert_eq!(word0::PERMS.start, 1);
    assert_eq!(word0::UPERMS.start, 16);
    assert_eq!(word0::OTYPE.start, 32);
    assert_eq!(word0::RESERVED.start, 56);
    assert_eq!(perms::HWPERMS_RESERVED.start, 13);
    assert_eq_hex!(PERMS_ALL_BITS, 0xfff);
    assert_eq_hex!(PERMS_ALL_BITS_UNTAGGED, 0x7fff);
    assert_eq_hex!(word0::OTYPE.mask64, 0x00ff_ffff_0000_0000);

    assert_eq!(Cc256::WIRE_BYTES, 32);
    assert_eq!(Cc256::HWPERMS_BITS, 12);
    assert_eq!(Cc256::HWPERMS_RESERVED_BITS, 3);
    assert_eq!(Cc256::UPERMS_BITS, 16);
    assert_eq!(Cc256::OTYPE_BITS, 24);
    assert_eq!(Cc256::FLAGS_BITS, 1);
    assert_eq!(Cc256::RESERVED_BITS, 8);
    assert_eq_hex!(Cc256::OTYPE_UNSEALED, UNSEALED);
    assert_eq_hex!(Cc256::OTYPE_SENTRY, SENTRY);
    assert_eq_hex!(Cc256::LAST_SPECIAL_OTYPE, 0xff_fff0);
    assert_eq_hex!(Cc256::LAST_NONRESERVED_OTYPE, 0xff_fff0);
}

#[test]
fn null_pattern() {
    let cap = Cc256::decode(&InMemoryCap256::ZERO, false);
    assert_eq!(cap.base(), 0);
    assert_eq!(cap.cursor, 0);
    assert_eq_hex!(cap.length(), u64::MAX as u128);
    assert_eq_hex!(cap.top(), NULL_TOP);
    assert_eq_hex!(cap.otype, UNSEALED);
    assert_eq!(cap.permissions, 0);
    assert_eq!(cap.user_permissions, 0);
    assert_eq!(cap.flags, 0);
    assert_eq!(cap.reserved, 0);
    assert!(!cap.tag);
    assert!(!cap.is_sealed());
    assert_eq!(cap, Cap256::null());
    assert_eq!(Cc256::encode(&cap), InMemoryCap256::ZERO);
}

#[test]
fn zero_otype_bits_decode_as_unsealed() {
    let mut rng = StdRng::seed_from_u64(0x0e);
    for tag in [false, true] {
        for _ in 0..256 {
            let mut u64s = Cc256::rand_wire(&mut rng, tag).words();
            u64s[METADATA_WORD] &= !word0::OTYPE.mask64;
            let cap = Cc256::decode(&InMemoryCap256::from_words(u64s), tag);
            assert_eq_hex!(cap.otype, UNSEALED);
            assert!(!cap.is_sealed());
        }
    }
}

#[test]
fn all_ones_otype_bits_decode_as_zero() {
    let cap = Cc256::decode(&mem(word0::OTYPE.mask64, 0, 0, 0), false);
    assert_eq!(cap.otype, 0);
    assert!(cap.is_sealed());
}

#[test]
fn tag_selects_permission_mask() {
    // All 15 permission bits set, including the 3 reserved ones
    let w0 = word0::PERMS.mask64;
    let tagged = Cc256::decode(&mem(w0, 0, 0, 0), true);
    let untagged = Cc256::decode(&mem(w0, 0, 0, 0), false);
    assert_eq_hex!(tagged.permissions, 0xfff);
    assert_eq_hex!(untagged.permissions, 0x7fff);

    // Only the reserved ones
    let w0 = perms::HWPERMS_RESERVED.mask64;
    assert_eq!(Cc256::decode(&mem(w0, 0, 0, 0), true).permissions, 0);
    assert_eq_hex!(Cc256::decode(&mem(w0, 0, 0, 0), false).permissions, 0x7000);

    assert_eq_hex!(perms_mask(true), PERMS_ALL_BITS);
    assert_eq_hex!(perms_mask(false), PERMS_ALL_BITS_UNTAGGED);
}

#[test]
fn encode_drops_reserved_perms_when_tagged() {
    let cap = Capability::new(AddrRange::start_end_64(0, 0x10), 0, 0x7fff, true);
    assert_eq_hex!(Cc256::encode(&cap).word(METADATA_WORD), 0xfff << 1);
    let cap = Capability { tag: false, ..cap };
    assert_eq_hex!(Cc256::encode(&cap).word(METADATA_WORD), 0x7fff << 1);
}

#[test]
fn concrete_tagged_cap() {
    let cap: Cap256 = Capability::new(AddrRange::start_end_64(0x1000, 0x2000), 0x1800, 0xfff, true);
    let m = Cc256::encode(&cap);
    assert_eq_hex!(m.word(METADATA_WORD), 0xfff << 1);
    assert_eq_hex!(m.word(CURSOR_WORD), 0x1800);
    assert_eq_hex!(m.word(BASE_WORD), 0x1000);
    assert_eq_hex!(m.word(LENGTH_WORD), !0x1000u64);
    assert_eq!(Cc256::decode(&m, true), cap);
}

#[test]
fn word0_field_positions() {
    let cap = Capability {
        flags: 1,
        user_permissions: 0xabcd,
        otype: 0x12_3456,
        ..Cap256::new(AddrRange::start_end_64(0, 0), 0, 0x555, true)
    };
    let w0 = Cc256::encode(&cap).word(METADATA_WORD);
    assert_eq_hex!(w0, 0x00ed_cba9_abcd_0aab);
    assert!(cap.is_sealed());
}

#[test]
fn saturating_length() {
    let cap: Cap256 = Capability::new(AddrRange::FULL_ADDR_SPACE, 0, 0, false);
    assert_eq_hex!(cap.length(), 1u128 << 64);
    let m = Cc256::encode(&cap);
    // Stored length is u64::MAX, which is stored XORed as 0
    assert_eq_hex!(m.word(LENGTH_WORD), 0);
    let decoded = Cc256::decode(&m, false);
    assert_eq_hex!(decoded.top(), u64::MAX as u128);
    assert_eq!(decoded, Capability { bounds: AddrRange::start_end_64(0, u64::MAX), ..cap });

    // The largest representable top
    let cap: Cap256 = Capability::new(AddrRange::start_end(u64::MAX, AddrRange::MAX_END), 0, 0, false);
    let decoded = Cc256::decode(&Cc256::encode(&cap), false);
    assert_eq_hex!(decoded.top(), (u64::MAX as u128) * 2);
}

#[test]
fn zero_length() {
    let cap = Cc256::decode(&mem(0, 0, 0x4000, u64::MAX), true);
    assert_eq!(cap.length(), 0);
    assert_eq!(cap.top(), 0x4000);
    assert!(cap.bounds.is_empty());
}

#[test]
fn top_above_2_pow_64() {
    let cap = Cc256::decode(&mem(0, 0, u64::MAX, 0), false);
    assert_eq_hex!(cap.top(), (u64::MAX as u128) * 2);
    assert_eq!(Cc256::encode(&cap), mem(0, 0, u64::MAX, 0));
}

#[test]
fn wire_round_trip() {
    let mut rng = StdRng::seed_from_u64(256);
    for tag in [false, true] {
        for _ in 0..10_000 {
            let m = Cc256::rand_wire(&mut rng, tag);
            let cap = Cc256::decode(&m, tag);
            assert_eq!(Cc256::encode(&cap), m, "{:x?} tag {} decoded to {}", m, tag, cap);
        }
    }
}

#[test]
fn record_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x1000);
    for tag in [false, true] {
        for _ in 0..10_000 {
            let cap = Cc256::rand_cap(&mut rng, tag);
            assert_eq!(cap.check_field_widths(), Ok(()));
            assert_eq!(Cc256::decode(&Cc256::encode(&cap), tag), cap);
            assert!(Cc256::encode_exact(&cap).is_ok());
        }
    }
}

#[test]
fn record_round_trip_saturates_long_lengths() {
    let mut rng = StdRng::seed_from_u64(0x2000);
    for tag in [false, true] {
        for _ in 0..10_000 {
            let cap = Cc256::rand_saturating_cap(&mut rng, tag);
            assert!(cap.length() > u64::MAX as u128);
            let m = Cc256::encode(&cap);
            assert_eq_hex!(m.word(LENGTH_WORD), 0);
            let decoded = Cc256::decode(&m, tag);
            assert_eq_hex!(decoded.top(), cap.base() as u128 + u64::MAX as u128);
            assert_eq!(decoded, Capability { bounds: AddrRange::base_len_64(cap.base(), u64::MAX), ..cap });
            assert_eq!(Cc256::encode_exact(&cap), Err(CapEncodeErr::LengthSaturated { length: cap.length() }));
        }
    }
}

#[test]
fn bytes_are_native_endian_words() {
    let m = mem(1, 2, 3, 4);
    let bytes = m.to_bytes();
    assert_eq!(&bytes[8..16], &2u64.to_ne_bytes());
    assert_eq!(InMemoryCap256::from_bytes(&bytes), m);
    assert_eq!(InMemoryCap256::from_byte_slice(&bytes), Some(m));
    assert_eq!(InMemoryCap256::from_byte_slice(&bytes[..31]), None);
}

#[test]
fn checked_decode_rejects_tagged_reserved() {
    let m = mem(0x5a << 56, 0, 0, 0);
    assert_eq!(
        Cc256::decode_checked(&m, true),
        Err(CapDecodeErr::ReservedBitsInTaggedCap { reserved: 0x5a })
    );
    let untagged = Cc256::decode_checked(&m, false).unwrap();
    assert_eq_hex!(untagged.reserved, 0x5a);
    assert_eq!(Cc256::encode(&untagged), m);
}

#[test]
fn recode_exact_accepts_only_clean_images() {
    let m = mem(0xfff << 1, 0x1800, 0x1000, !0x1000);
    let cap = Cc256::recode_exact(&m, true).unwrap();
    assert_eq!(cap, Cc256::decode(&m, true));

    let mut rng = StdRng::seed_from_u64(0x3000);
    for tag in [false, true] {
        for _ in 0..1000 {
            let m = Cc256::rand_wire(&mut rng, tag);
            assert_eq!(Cc256::recode_exact(&m, tag), Ok(Cc256::decode(&m, tag)));
        }
    }

    assert_eq!(
        Cc256::recode_exact(&mem(0x5a << 56, 0, 0, 0), true),
        Err(CapEncDecErr::Dec(CapDecodeErr::ReservedBitsInTaggedCap { reserved: 0x5a }))
    );
    assert_eq!(
        CapEncDecErr::from(CapEncodeErr::LengthSaturated { length: 1 << 64 }),
        CapEncDecErr::Enc(CapEncodeErr::LengthSaturated { length: 1 << 64 })
    );
}

#[test]
fn unchecked_decode_passes_reserved_through_in_release() {
    let m = mem(0x01 << 56, 0, 0, 0);
    let cap = Cc256::decode_bits(&m, true);
    assert_eq!(cap.reserved, 1);
    assert_eq!(Cc256::encode_bits(&cap), m);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "reserved bits")]
fn unchecked_decode_asserts_in_debug() {
    Cc256::decode(&mem(0x80 << 56, 0, 0, 0), true);
}

#[test]
fn exact_encode_rejects_lossy_caps() {
    let cap: Cap256 = Capability::new(AddrRange::start_end_64(0x10, 0x20), 0x10, 0x3, true);
    assert!(Cc256::encode_exact(&cap).is_ok());

    assert_eq!(
        Cc256::encode_exact(&Capability { reserved: 2, ..cap }),
        Err(CapEncodeErr::ReservedBitsInTaggedCap { reserved: 2 })
    );
    assert_eq!(
        Cc256::encode_exact(&Capability { permissions: 0x1000, ..cap }),
        Err(CapEncodeErr::FieldTooWide { field: "permissions", value: 0x1000 })
    );
    // Untagged capabilities can hold the reserved permissions...
    assert!(Cc256::encode_exact(&Capability { permissions: 0x7fff, tag: false, ..cap }).is_ok());
    // ...but nothing above them
    assert!(Cc256::encode_exact(&Capability { permissions: 0x8000, tag: false, ..cap }).is_err());
    assert_eq!(
        Cc256::encode_exact(&Capability { otype: 0x100_0000, ..cap }),
        Err(CapEncodeErr::FieldTooWide { field: "otype", value: 0x100_0000 })
    );
    assert_eq!(
        Cc256::encode_exact(&Capability { flags: 2, ..cap }),
        Err(CapEncodeErr::FieldTooWide { field: "flags", value: 2 })
    );
    assert_eq!(
        Cc256::encode_exact(&Capability { bounds: AddrRange::FULL_ADDR_SPACE, ..cap }),
        Err(CapEncodeErr::LengthSaturated { length: 1 << 64 })
    );
}

#[test]
fn otype_helpers() {
    let cap: Cap256 = Capability::new(AddrRange::start_end_64(0, 0x100), 0, 0, true);
    assert_eq!(cap.otype_signed(), -1);
    assert!(!cap.is_sentry());

    let sentry = Capability { otype: SENTRY, ..cap };
    assert!(sentry.is_sealed());
    assert!(sentry.is_sentry());
    assert!(!sentry.has_reserved_otype());
    assert_eq!(sentry.otype_signed(), -2);

    let reserved = Capability { otype: 0xff_fff0, ..cap };
    assert!(reserved.has_reserved_otype());
    assert_eq!(reserved.otype_signed(), -16);

    let sealed = Capability { otype: 42, ..cap };
    assert!(sealed.is_sealed());
    assert!(!sealed.has_reserved_otype());
    assert_eq!(sealed.otype_signed(), 42);
}

#[test]
fn display() {
    let cap: Cap256 = Capability::new(AddrRange::start_end_64(0x1000, 0x2000), 0x1800, 0xfff, true);
    assert_eq!(format!("{cap}"), "cc256 v:1 c:1800 b:[1000, 2000) p:fff up:0 ot:-1 fl:0");
    let cap = Capability { reserved: 3, tag: false, ..cap };
    assert_eq!(format!("{cap}"), "cc256 v:0 c:1800 b:[1000, 2000) p:fff up:0 ot:-1 fl:0 rsvd:3");
}

#[test]
fn rand_test_cases_decode_to_expected() {
    let mut rng = StdRng::seed_from_u64(0xcafe);
    for category in RandomCategory::ALL {
        for _ in 0..100 {
            let case = Cc256::rand_test_case(&mut rng, category);
            assert_eq!(Cc256::decode(&case.wire, case.tag), case.expected, "{:?}", category);
            assert_eq!(Cc256::encode(&case.expected), case.wire, "{:?}", category);
            match category {
                RandomCategory::Null => assert_eq!(case.expected, Cap256::null()),
                RandomCategory::Sealed => {
                    assert!(case.expected.is_sealed() && !case.expected.is_sentry() && !case.expected.has_reserved_otype())
                }
                RandomCategory::Sentry => assert!(case.expected.is_sentry()),
                RandomCategory::FullLength => assert_eq_hex!(case.expected.length(), u64::MAX as u128),
                RandomCategory::Tagged => assert!(case.tag),
                RandomCategory::Untagged => assert!(!case.tag),
            }
        }
    }
}

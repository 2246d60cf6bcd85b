//! Random capabilities and wire images, for property tests and external test vectors.

use ::rand::Rng;

use crate::capability::{AddrRange, CapFormat, Capability};

use super::{perms, word0, Cap256, Cc256, InMemoryCap256, LENGTH_WORD, METADATA_WORD};

#[derive(Debug, Clone, Copy)]
pub enum ChooseRand {
    Any,
    AnyNBits(u32),
    Specific(u64),
    /// Uniform distribution sampling over inclusive range (.0)..=(.1)
    Between(u64, u64),
}
impl ChooseRand {
    pub fn sample<R: Rng>(self, rng: &mut R) -> u64 {
        match self {
            ChooseRand::Any => rng.gen(),
            ChooseRand::AnyNBits(n) if n >= 64 => rng.gen(),
            ChooseRand::AnyNBits(n) => rng.gen_range(0..(1u64 << n)),
            ChooseRand::Specific(v) => v,
            ChooseRand::Between(a, b) => {
                if a > b {
                    panic!("Cannot ChooseRand::Between({:x}, {:x}) where a > b", a, b);
                }
                rng.gen_range(a..=b)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomCategory {
    /// The all-zeroes pattern.
    Null,
    /// Any bit pattern, untagged.
    Untagged,
    /// Any bit pattern with no reserved bits set, tagged.
    Tagged,
    /// A tagged capability sealed with a non-special otype.
    Sealed,
    Sentry,
    /// A stored length of all-ones, i.e. the top can be above 2^64.
    FullLength,
}
impl RandomCategory {
    pub const ALL: [RandomCategory; 6] = [
        RandomCategory::Null,
        RandomCategory::Untagged,
        RandomCategory::Tagged,
        RandomCategory::Sealed,
        RandomCategory::Sentry,
        RandomCategory::FullLength,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RandomCategory::Null => "null",
            RandomCategory::Untagged => "untagged",
            RandomCategory::Tagged => "tagged",
            RandomCategory::Sealed => "sealed",
            RandomCategory::Sentry => "sentry",
            RandomCategory::FullLength => "full-length",
        }
    }
}

/// A wire image, its tag, and the capability it should decode to.
#[derive(Debug, Clone, Copy)]
pub struct CapTestCase<F: CapFormat> {
    pub wire: F::Wire,
    pub tag: bool,
    pub expected: Capability<F>,
}

pub trait RandCap: CapFormat {
    /// A random wire image. Tagged images never have reserved bits set.
    fn rand_wire<R: Rng>(rng: &mut R, tag: bool) -> Self::Wire;

    /// A random capability whose fields fit their widths and whose length is representable,
    /// so it survives an encode/decode round trip unchanged.
    fn rand_cap<R: Rng>(rng: &mut R, tag: bool) -> Capability<Self>;

    fn rand_test_case<R: Rng>(rng: &mut R, category: RandomCategory) -> CapTestCase<Self>;

    /// A random capability whose length is too large to store, so encoding saturates it.
    fn rand_saturating_cap<R: Rng>(rng: &mut R, tag: bool) -> Capability<Self> {
        let cap = Self::rand_cap(rng, tag);
        let lowest_top = cap.base() as u128 + u64::MAX as u128 + 1;
        let top = rng.gen_range(lowest_top..=AddrRange::MAX_END);
        Capability {
            bounds: AddrRange::start_end(cap.base(), top),
            ..cap
        }
    }
}

impl RandCap for Cc256 {
    fn rand_wire<R: Rng>(rng: &mut R, tag: bool) -> InMemoryCap256 {
        let mut u64s: [u64; 4] = rng.gen();
        if tag {
            u64s[METADATA_WORD] &= !(word0::RESERVED.mask64 | perms::HWPERMS_RESERVED.mask64);
        }
        InMemoryCap256::from_words(u64s)
    }

    fn rand_cap<R: Rng>(rng: &mut R, tag: bool) -> Cap256 {
        let perms_bits = if tag {
            Self::HWPERMS_BITS
        } else {
            Self::HWPERMS_BITS + Self::HWPERMS_RESERVED_BITS
        };
        let reserved = if tag {
            ChooseRand::Specific(0)
        } else {
            ChooseRand::AnyNBits(Self::RESERVED_BITS)
        };
        let base = ChooseRand::Any.sample(rng);
        let length = ChooseRand::Any.sample(rng);
        Capability {
            user_permissions: ChooseRand::AnyNBits(Self::UPERMS_BITS).sample(rng) as u32,
            otype: ChooseRand::AnyNBits(Self::OTYPE_BITS).sample(rng) as u32,
            flags: ChooseRand::AnyNBits(Self::FLAGS_BITS).sample(rng) as u8,
            reserved: reserved.sample(rng) as u8,
            ..Capability::new(
                AddrRange::base_len_64(base, length),
                ChooseRand::Any.sample(rng),
                ChooseRand::AnyNBits(perms_bits).sample(rng) as u32,
                tag,
            )
        }
    }

    fn rand_test_case<R: Rng>(rng: &mut R, category: RandomCategory) -> CapTestCase<Self> {
        let (wire, tag) = match category {
            RandomCategory::Null => (InMemoryCap256::ZERO, false),
            RandomCategory::Untagged => (Self::rand_wire(rng, false), false),
            RandomCategory::Tagged => (Self::rand_wire(rng, true), true),
            RandomCategory::Sealed | RandomCategory::Sentry => {
                let otype = match category {
                    RandomCategory::Sentry => Self::OTYPE_SENTRY as u64,
                    _ => ChooseRand::Between(0, Self::LAST_NONRESERVED_OTYPE as u64 - 1).sample(rng),
                };
                let cap = Capability {
                    otype: otype as u32,
                    ..Self::rand_cap(rng, true)
                };
                // Built independently of decode, so the expectation isn't circular
                return CapTestCase {
                    wire: Self::encode(&cap),
                    tag: true,
                    expected: cap,
                };
            }
            RandomCategory::FullLength => {
                let tag = rng.gen_bool(0.5);
                let mut u64s = Self::rand_wire(rng, tag).words();
                u64s[LENGTH_WORD] = 0;
                (InMemoryCap256::from_words(u64s), tag)
            }
        };
        CapTestCase {
            wire,
            tag,
            expected: Self::decode(&wire, tag),
        }
    }
}

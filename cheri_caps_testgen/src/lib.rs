//! This module concerns the encoding and decoding of external test files for other implementations e.g. simulators.
//

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{formats::Lowercase, DeserializeAs, SerializeAs};

use cheri_caps::capability::{
    cc256::{
        rand::{CapTestCase, RandCap, RandomCategory},
        Cap256, Cc256, InMemoryCap256,
    },
    AddrRange, CapFormat, Capability,
};

#[derive(clap::ValueEnum, Clone, Copy, Default, Debug)]
pub enum CapVariant {
    #[default]
    Cc256,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestCategory {
    Null,
    Untagged,
    Tagged,
    Sealed,
    Sentry,
    FullLength,
}
impl From<TestCategory> for RandomCategory {
    fn from(value: TestCategory) -> Self {
        match value {
            TestCategory::Null => RandomCategory::Null,
            TestCategory::Untagged => RandomCategory::Untagged,
            TestCategory::Tagged => RandomCategory::Tagged,
            TestCategory::Sealed => RandomCategory::Sealed,
            TestCategory::Sentry => RandomCategory::Sentry,
            TestCategory::FullLength => RandomCategory::FullLength,
        }
    }
}

pub fn gen_in_category<R: Rng>(rng: &mut R, cap: CapVariant, category: TestCategory) -> CapTestCaseSerDe {
    match cap {
        CapVariant::Cc256 => {
            let category: RandomCategory = category.into();
            CapTestCaseSerDe::new(category, Cc256::rand_test_case(rng, category))
        }
    }
}

fn serialize_hex_u32<S>(v: &u32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serde_with::hex::Hex::<Lowercase>::serialize_as(&u32::to_be_bytes(*v), serializer)
}

fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error> where D: Deserializer<'de> {
    let bytes: [u8; 4] = serde_with::hex::Hex::<Lowercase>::deserialize_as(deserializer)?;
    Ok(u32::from_be_bytes(bytes))
}

fn serialize_hex_u64<S>(v: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serde_with::hex::Hex::<Lowercase>::serialize_as(&u64::to_be_bytes(*v), serializer)
}

fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error> where D: Deserializer<'de> {
    let bytes: [u8; 8] = serde_with::hex::Hex::<Lowercase>::deserialize_as(deserializer)?;
    Ok(u64::from_be_bytes(bytes))
}

fn serialize_hex_u128<S>(v: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serde_with::hex::Hex::<Lowercase>::serialize_as(&u128::to_be_bytes(*v), serializer)
}

fn deserialize_hex_u128<'de, D>(deserializer: D) -> Result<u128, D::Error> where D: Deserializer<'de> {
    let bytes: [u8; 16] = serde_with::hex::Hex::<Lowercase>::deserialize_as(deserializer)?;
    Ok(u128::from_be_bytes(bytes))
}

/// One row of a test vector file: the four in-memory words, the tag, and the expected decoded fields.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct CapTestCaseSerDe {
    category: String,

    #[serde(serialize_with = "serialize_hex_u64", deserialize_with = "deserialize_hex_u64")]
    word0: u64,
    #[serde(serialize_with = "serialize_hex_u64", deserialize_with = "deserialize_hex_u64")]
    word1: u64,
    #[serde(serialize_with = "serialize_hex_u64", deserialize_with = "deserialize_hex_u64")]
    word2: u64,
    #[serde(serialize_with = "serialize_hex_u64", deserialize_with = "deserialize_hex_u64")]
    word3: u64,
    tag: bool,

    #[serde(serialize_with = "serialize_hex_u64", deserialize_with = "deserialize_hex_u64")]
    base: u64,
    #[serde(serialize_with = "serialize_hex_u128", deserialize_with = "deserialize_hex_u128")]
    top: u128,
    #[serde(serialize_with = "serialize_hex_u64", deserialize_with = "deserialize_hex_u64")]
    cursor: u64,
    #[serde(serialize_with = "serialize_hex_u32", deserialize_with = "deserialize_hex_u32")]
    perms: u32,
    #[serde(serialize_with = "serialize_hex_u32", deserialize_with = "deserialize_hex_u32")]
    uperms: u32,
    #[serde(serialize_with = "serialize_hex_u32", deserialize_with = "deserialize_hex_u32")]
    otype: u32,
    flags: u8,
    reserved: u8,
}
impl CapTestCaseSerDe {
    pub fn new(category: RandomCategory, value: CapTestCase<Cc256>) -> Self {
        let [word0, word1, word2, word3] = value.wire.words();
        let cap = value.expected;
        Self {
            category: category.name().to_string(),
            word0,
            word1,
            word2,
            word3,
            tag: value.tag,
            base: cap.base(),
            top: cap.top(),
            cursor: cap.cursor,
            perms: cap.permissions,
            uperms: cap.user_permissions,
            otype: cap.otype,
            flags: cap.flags,
            reserved: cap.reserved,
        }
    }

    pub fn wire(&self) -> InMemoryCap256 {
        InMemoryCap256::from_words([self.word0, self.word1, self.word2, self.word3])
    }

    /// The expected capability, or an error if the recorded bounds are impossible.
    pub fn expected(&self) -> Result<Cap256, String> {
        let bounds = AddrRange::try_start_end(self.base, self.top)
            .ok_or_else(|| format!("Bad bounds in test case: base {:x} top {:x}", self.base, self.top))?;
        Ok(Capability {
            user_permissions: self.uperms,
            otype: self.otype,
            flags: self.flags,
            reserved: self.reserved,
            ..Capability::new(bounds, self.cursor, self.perms, self.tag)
        })
    }

    /// Check this row against the reference decoder and encoder.
    pub fn verify(&self) -> Result<(), String> {
        let expected = self.expected()?;
        let decoded = Cc256::decode_bits(&self.wire(), self.tag);
        if decoded != expected {
            return Err(format!("{:x?} decoded to {} but expected {}", self.wire(), decoded, expected));
        }
        let encoded = Cc256::encode_bits(&expected);
        if encoded != self.wire() {
            return Err(format!("{} encoded to {:x?} but expected {:x?}", expected, encoded, self.wire()));
        }
        Ok(())
    }
}

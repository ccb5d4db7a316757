//! Serialization support for digests.
//!
//! Hashes appear in repodata, `paths.json` and prefix records as lowercase
//! hex strings. The [`HexDigest`] adapter plugs into `serde_with`'s
//! `serde_as` attribute so record structs can (de)serialize digest fields
//! without manual conversions.

use digest::{Digest, Output};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{DeserializeAs, SerializeAs};
use std::borrow::Cow;
use std::fmt::LowerHex;

/// Deserialize the [`Output`] of a [`Digest`] from a hex string.
pub fn deserialize<'de, D, Dig: Digest>(deserializer: D) -> Result<Output<Dig>, D::Error>
where
    D: Deserializer<'de>,
{
    let str = Cow::<'de, str>::deserialize(deserializer)?;
    super::parse_digest_from_hex::<Dig>(str.as_ref())
        .ok_or_else(|| Error::custom("failed to parse digest"))
}

/// Serializes the [`Output`] of a [`Digest`] as a hex string.
pub fn serialize<'a, S: Serializer, Dig: Digest>(
    digest: &'a Output<Dig>,
    s: S,
) -> Result<S::Ok, S::Error>
where
    &'a Output<Dig>: LowerHex,
{
    format!("{digest:x}").serialize(s)
}

/// A `serde_with` adapter that encodes a digest as a lowercase hex string.
pub struct HexDigest<T: Digest>(pub Output<T>);

impl<T: Digest> SerializeAs<Output<T>> for HexDigest<T>
where
    for<'a> &'a Output<T>: LowerHex,
{
    fn serialize_as<S>(source: &Output<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize::<S, T>(source, serializer)
    }
}

impl<'de, T: Digest + Default> DeserializeAs<'de, Output<T>> for HexDigest<T> {
    fn deserialize_as<D>(deserializer: D) -> Result<Output<T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize::<D, T>(deserializer)
    }
}

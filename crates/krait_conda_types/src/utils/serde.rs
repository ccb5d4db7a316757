//! Serde adapters for the quirks of the conda on-disk formats.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{DeserializeAs, SerializeAs};

/// Timestamps in repodata are in milliseconds since the epoch, but very old
/// entries are in seconds. Anything that would be later than the year 9999
/// when interpreted as seconds is treated as milliseconds.
pub(crate) struct Timestamp;

impl SerializeAs<DateTime<Utc>> for Timestamp {
    fn serialize_as<S: Serializer>(
        source: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        source.timestamp_millis().serialize(serializer)
    }
}

impl<'de> DeserializeAs<'de, DateTime<Utc>> for Timestamp {
    fn deserialize_as<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let mut timestamp = i64::deserialize(deserializer)?;

        // 253402300799 is the last second of the year 9999.
        if timestamp > 253_402_300_799 {
            // The timestamp is in milliseconds.
        } else {
            timestamp *= 1000;
        }

        Utc.timestamp_millis_opt(timestamp)
            .single()
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// `track_features` appears in the wild as a list of strings, or as a single
/// string with comma or space separated entries.
pub(crate) struct FeatureSet;

impl SerializeAs<Vec<String>> for FeatureSet {
    fn serialize_as<S: Serializer>(source: &Vec<String>, serializer: S) -> Result<S::Ok, S::Error> {
        source.serialize(serializer)
    }
}

impl<'de> DeserializeAs<'de, Vec<String>> for FeatureSet {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Str(s) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
            Raw::List(list) => list.into_iter().filter(|s| !s.is_empty()).collect(),
        })
    }
}

/// Paths are stored with forward slashes regardless of platform.
pub(crate) struct NormalizedPath;

impl SerializeAs<PathBuf> for NormalizedPath {
    fn serialize_as<S: Serializer>(source: &PathBuf, serializer: S) -> Result<S::Ok, S::Error> {
        source
            .to_string_lossy()
            .replace('\\', "/")
            .serialize(serializer)
    }
}

impl<'de> DeserializeAs<'de, PathBuf> for NormalizedPath {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        Ok(PathBuf::from(String::deserialize(deserializer)?))
    }
}

/// Serializes a map sorted by its keys to keep written files deterministic.
pub(crate) fn sort_map_alphabetically<S: Serializer, V: Serialize>(
    value: &fxhash::FxHashMap<String, V>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    value
        .iter()
        .collect::<BTreeMap<_, _>>()
        .serialize(serializer)
}

#[cfg(test)]
mod test {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use serde_with::serde_as;

    #[serde_as]
    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct WithTimestamp {
        #[serde_as(as = "Option<super::Timestamp>")]
        timestamp: Option<DateTime<Utc>>,
    }

    #[test]
    fn timestamp_milliseconds() {
        let value: WithTimestamp =
            serde_json::from_str(r#"{"timestamp": 1633094802000}"#).unwrap();
        assert_eq!(value.timestamp.unwrap().timestamp(), 1633094802);
    }

    #[test]
    fn timestamp_seconds() {
        let value: WithTimestamp = serde_json::from_str(r#"{"timestamp": 1633094802}"#).unwrap();
        assert_eq!(value.timestamp.unwrap().timestamp(), 1633094802);
    }

    #[serde_as]
    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct WithFeatures {
        #[serde_as(as = "super::FeatureSet")]
        #[serde(default)]
        track_features: Vec<String>,
    }

    #[test]
    fn features_from_string_or_list() {
        let value: WithFeatures =
            serde_json::from_str(r#"{"track_features": "mkl nomkl"}"#).unwrap();
        assert_eq!(value.track_features, vec!["mkl", "nomkl"]);

        let value: WithFeatures =
            serde_json::from_str(r#"{"track_features": "mkl,nomkl"}"#).unwrap();
        assert_eq!(value.track_features, vec!["mkl", "nomkl"]);

        let value: WithFeatures =
            serde_json::from_str(r#"{"track_features": ["mkl"]}"#).unwrap();
        assert_eq!(value.track_features, vec!["mkl"]);
    }
}

//! The `noarch` field of a package record.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The noarch variant of a package.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NoArchKind {
    /// A noarch python package: pure python source that is mapped into the
    /// interpreter's site-packages directory at install time.
    Python,
    /// A noarch generic package: installs the same files on every platform.
    Generic,
}

/// Whether a package is independent of architecture, and if so, in what way.
///
/// Old repodata encodes generic noarch packages as `"noarch": true`; newer
/// repodata uses the strings `"python"` and `"generic"`. Both forms are
/// accepted, the string form is written.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NoArchType(pub Option<NoArchKind>);

impl NoArchType {
    /// A package that is not noarch.
    pub fn none() -> Self {
        Self(None)
    }

    /// A `noarch: python` package.
    pub fn python() -> Self {
        Self(Some(NoArchKind::Python))
    }

    /// A `noarch: generic` package.
    pub fn generic() -> Self {
        Self(Some(NoArchKind::Generic))
    }

    /// Returns the noarch kind, if any.
    pub fn kind(&self) -> Option<NoArchKind> {
        self.0
    }

    /// Returns true if this package is not a noarch package.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Returns true if this is a `noarch: python` package.
    pub fn is_python(&self) -> bool {
        matches!(self.0, Some(NoArchKind::Python))
    }

    /// Returns true if this is a `noarch: generic` package.
    pub fn is_generic(&self) -> bool {
        matches!(self.0, Some(NoArchKind::Generic))
    }
}

impl Serialize for NoArchType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            None => serializer.serialize_none(),
            Some(NoArchKind::Python) => serializer.serialize_str("python"),
            Some(NoArchKind::Generic) => serializer.serialize_str("generic"),
        }
    }
}

impl<'de> Deserialize<'de> for NoArchType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Str(String),
        }

        let raw = Option::<Raw>::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(Raw::Bool(false)) => NoArchType(None),
            // Old-style repodata spells generic noarch as `true`.
            Some(Raw::Bool(true)) => NoArchType(Some(NoArchKind::Generic)),
            Some(Raw::Str(s)) => match s.as_str() {
                "python" => NoArchType(Some(NoArchKind::Python)),
                "generic" => NoArchType(Some(NoArchKind::Generic)),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "invalid noarch type '{other}'"
                    )))
                }
            },
        })
    }
}

#[cfg(test)]
mod test {
    use super::{NoArchKind, NoArchType};

    #[derive(serde::Deserialize)]
    struct Record {
        #[serde(default)]
        noarch: NoArchType,
    }

    #[test]
    fn deserialize_variants() {
        let record: Record = serde_json::from_str(r#"{"noarch": "python"}"#).unwrap();
        assert_eq!(record.noarch.kind(), Some(NoArchKind::Python));

        let record: Record = serde_json::from_str(r#"{"noarch": "generic"}"#).unwrap();
        assert_eq!(record.noarch.kind(), Some(NoArchKind::Generic));

        let record: Record = serde_json::from_str(r#"{"noarch": true}"#).unwrap();
        assert_eq!(record.noarch.kind(), Some(NoArchKind::Generic));

        let record: Record = serde_json::from_str(r#"{}"#).unwrap();
        assert!(record.noarch.is_none());
    }
}

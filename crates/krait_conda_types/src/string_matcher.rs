//! Matching of free-form strings (most prominently build strings) by exact
//! value, glob or regex.

use std::hash::{Hash, Hasher};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Matches a string either exactly, by glob, or by regex.
///
/// A pattern that starts with `^` and ends with `$` is interpreted as an
/// anchored regex. A pattern containing `*` is a glob. Anything else must
/// match exactly.
#[derive(Debug, Clone)]
pub enum StringMatcher {
    /// Match the string exactly.
    Exact(String),
    /// Match the string by glob, where `*` matches any run of characters.
    Glob(glob::Pattern),
    /// Match the string by an anchored regex.
    Regex(regex::Regex),
}

impl StringMatcher {
    /// Returns true if the given string matches.
    pub fn matches(&self, other: &str) -> bool {
        match self {
            StringMatcher::Exact(s) => s == other,
            StringMatcher::Glob(glob) => glob.matches(other),
            StringMatcher::Regex(regex) => regex.is_match(other),
        }
    }
}

/// An error that can occur while parsing a [`StringMatcher`].
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum StringMatcherParseError {
    /// The glob pattern could not be compiled.
    #[error("invalid glob: {glob}")]
    InvalidGlob {
        /// The offending pattern.
        glob: String,
    },

    /// The regex could not be compiled.
    #[error("invalid regex: {regex}")]
    InvalidRegex {
        /// The offending pattern.
        regex: String,
    },
}

impl FromStr for StringMatcher {
    type Err = StringMatcherParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('^') && s.ends_with('$') {
            Ok(StringMatcher::Regex(regex::Regex::new(s).map_err(
                |_| StringMatcherParseError::InvalidRegex {
                    regex: s.to_string(),
                },
            )?))
        } else if s.contains('*') {
            Ok(StringMatcher::Glob(glob::Pattern::new(s).map_err(
                |_| StringMatcherParseError::InvalidGlob {
                    glob: s.to_string(),
                },
            )?))
        } else {
            Ok(StringMatcher::Exact(s.to_string()))
        }
    }
}

impl Display for StringMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StringMatcher::Exact(s) => write!(f, "{s}"),
            StringMatcher::Glob(s) => write!(f, "{}", s.as_str()),
            StringMatcher::Regex(s) => write!(f, "{}", s.as_str()),
        }
    }
}

impl PartialEq for StringMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StringMatcher::Exact(a), StringMatcher::Exact(b)) => a == b,
            (StringMatcher::Glob(a), StringMatcher::Glob(b)) => a.as_str() == b.as_str(),
            (StringMatcher::Regex(a), StringMatcher::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for StringMatcher {}

impl Hash for StringMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            StringMatcher::Exact(s) => s.hash(state),
            StringMatcher::Glob(pattern) => pattern.as_str().hash(state),
            StringMatcher::Regex(regex) => regex.as_str().hash(state),
        }
    }
}

impl Serialize for StringMatcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StringMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        source.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::StringMatcher;
    use std::str::FromStr;

    #[test]
    fn parse() {
        assert_eq!(
            StringMatcher::from_str("foo").unwrap(),
            StringMatcher::Exact("foo".to_string())
        );
        assert!(matches!(
            StringMatcher::from_str("foo*").unwrap(),
            StringMatcher::Glob(_)
        ));
        assert!(matches!(
            StringMatcher::from_str("^foo.*$").unwrap(),
            StringMatcher::Regex(_)
        ));
    }

    #[test]
    fn matches() {
        assert!(StringMatcher::from_str("foo").unwrap().matches("foo"));
        assert!(!StringMatcher::from_str("foo").unwrap().matches("bar"));
        assert!(StringMatcher::from_str("py*").unwrap().matches("py38_0"));
        assert!(StringMatcher::from_str("*_0").unwrap().matches("py38_0"));
        assert!(!StringMatcher::from_str("*_1").unwrap().matches("py38_0"));
        assert!(StringMatcher::from_str("py*37").unwrap().matches("py1137"));
        assert!(StringMatcher::from_str("^py.*37$").unwrap().matches("py1137"));
        assert!(!StringMatcher::from_str("^py.*38$").unwrap().matches("py1137"));
    }
}

//! Constraints on the build number of a package, e.g. `>=3` in
//! `foo[build_number=">=3"]`.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The build number of a package.
pub type BuildNumber = u64;

/// An ordering operator usable on plain integers.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum OrdOperator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Display for OrdOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
        }
    }
}

/// A constraint on the build number of a package.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct BuildNumberSpec {
    op: OrdOperator,
    rhs: BuildNumber,
}

impl BuildNumberSpec {
    /// Constructs a new spec from an operator and a build number.
    pub fn new(op: OrdOperator, rhs: BuildNumber) -> Self {
        Self { op, rhs }
    }

    /// Returns whether the given build number satisfies this spec.
    pub fn matches(&self, build_number: &BuildNumber) -> bool {
        match self.op {
            OrdOperator::Gt => build_number > &self.rhs,
            OrdOperator::Ge => build_number >= &self.rhs,
            OrdOperator::Lt => build_number < &self.rhs,
            OrdOperator::Le => build_number <= &self.rhs,
            OrdOperator::Eq => build_number == &self.rhs,
            OrdOperator::Ne => build_number != &self.rhs,
        }
    }
}

impl Display for BuildNumberSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.op, self.rhs)
    }
}

/// An error that can occur while parsing a [`BuildNumberSpec`].
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseBuildNumberSpecError {
    /// The operator was not recognized.
    #[error("invalid build number operator '{0}'")]
    InvalidOperator(String),

    /// The number failed to parse.
    #[error("invalid build number '{0}'")]
    InvalidBuildNumber(String),
}

impl FromStr for BuildNumberSpec {
    type Err = ParseBuildNumberSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let op_len = s.chars().take_while(|c| "=!<>".contains(*c)).count();
        let (op_str, number) = s.split_at(op_len);
        let op = match op_str {
            ">" => OrdOperator::Gt,
            ">=" => OrdOperator::Ge,
            "<" => OrdOperator::Lt,
            "<=" => OrdOperator::Le,
            // A bare number is an exact constraint.
            "==" | "=" | "" => OrdOperator::Eq,
            "!=" => OrdOperator::Ne,
            other => return Err(ParseBuildNumberSpecError::InvalidOperator(other.to_owned())),
        };
        let rhs = number
            .trim()
            .parse()
            .map_err(|_| ParseBuildNumberSpecError::InvalidBuildNumber(number.to_owned()))?;
        Ok(Self { op, rhs })
    }
}

impl Serialize for BuildNumberSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BuildNumberSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        source.parse().map_err(serde::de::Error::custom)
    }
}

use std::{
    fmt::{Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, digit1},
    combinator::{map, opt},
    error::{ErrorKind, ParseError},
    sequence::terminated,
    IResult,
};
use smallvec::SmallVec;
use thiserror::Error;

use super::{Component, Version};

type ComponentVec = SmallVec<[Component; 4]>;
type SegmentVec = SmallVec<[u16; 4]>;

/// An error that occurred while parsing a version string.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseVersionError {
    /// The original string that was the input of the parser.
    pub version: String,

    /// The kind of parse error that occurred.
    pub kind: ParseVersionErrorKind,
}

impl Display for ParseVersionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "malformed version string '{}': {}",
            &self.version, &self.kind
        )
    }
}

impl std::error::Error for ParseVersionError {}

impl ParseVersionError {
    /// Constructs a new parse error from the offending input and the error
    /// kind.
    pub fn new(text: impl Into<String>, kind: ParseVersionErrorKind) -> Self {
        Self {
            version: text.into(),
            kind,
        }
    }
}

/// The kind of error that occurred while parsing a version string.
#[derive(Debug, Eq, PartialEq, Clone, Error)]
pub enum ParseVersionErrorKind {
    /// The string was empty.
    #[error("empty string")]
    Empty,
    /// The epoch was not an integer value.
    #[error("epoch is not a number")]
    EpochMustBeInteger(ParseIntError),
    /// A numeral did not fit in 64 bits.
    #[error("invalid number")]
    InvalidNumeral(ParseIntError),
    /// Expected a version component.
    #[error("expected a version component e.g. `2` or `rc`")]
    ExpectedComponent,
    /// A segment holds more components than can be represented.
    #[error("too many components in a single segment")]
    TooManyComponents,
    /// A version holds more segments than can be represented.
    #[error("too many segments")]
    TooManySegments,
    /// The parser did not consume the entire input.
    #[error("encountered more characters but expected none")]
    ExpectedEof,
    /// An unclassified parser error.
    #[error("{0:?}")]
    Nom(ErrorKind),
}

impl<'i> ParseError<&'i str> for ParseVersionErrorKind {
    fn from_error_kind(_: &'i str, kind: ErrorKind) -> Self {
        ParseVersionErrorKind::Nom(kind)
    }

    fn append(_: &'i str, _: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Parses a numeral, failing when the digits do not fit an `u64`.
fn numeral_parser(input: &str) -> IResult<&str, u64, ParseVersionErrorKind> {
    let (rest, digits) = digit1(input)?;
    match u64::from_str(digits) {
        Ok(numeral) => Ok((rest, numeral)),
        Err(e) => Err(nom::Err::Failure(ParseVersionErrorKind::InvalidNumeral(e))),
    }
}

/// Parses a single version component: a numeral, or a run of (lowercase)
/// letters with `post` and `dev` mapped to their special variants.
fn component_parser(input: &str) -> IResult<&str, Component, ParseVersionErrorKind> {
    alt((
        map(numeral_parser, Component::Numeral),
        map(alpha1, |alpha: &str| match alpha {
            "post" => Component::Post,
            "dev" => Component::Dev,
            other => Component::Iden(other.into()),
        }),
    ))(input)
}

/// Parses one segment into `components`, returning the number of components
/// that were added. A segment that starts with a letter gets an implicit
/// leading zero so numbers and letters stay in phase across versions.
fn segment_parser<'i>(
    components: &mut ComponentVec,
    input: &'i str,
) -> IResult<&'i str, u16, ParseVersionErrorKind> {
    let (mut rest, first) = match component_parser(input) {
        Ok(result) => result,
        Err(nom::Err::Error(_)) => {
            return Err(nom::Err::Error(ParseVersionErrorKind::ExpectedComponent))
        }
        Err(e) => return Err(e),
    };

    let mut count: u16 = 0;
    if !first.is_numeral() {
        components.push(Component::default());
        count += 1;
    }
    components.push(first);
    count += 1;

    loop {
        let (remaining, component) = opt(component_parser)(rest)?;
        match component {
            Some(component) => {
                components.push(component);
                count = count
                    .checked_add(1)
                    .ok_or(nom::Err::Failure(ParseVersionErrorKind::TooManyComponents))?;
                rest = remaining;
            }
            None => return Ok((remaining, count)),
        }
    }
}

/// Parses a dotted sequence of segments (the common or the local part of a
/// version). Trailing `_` or `-` separators become a literal `_` component on
/// the last segment; this keeps the openssl-style `1.0.1_` representable.
fn part_parser<'i>(
    components: &mut ComponentVec,
    segment_lengths: &mut SegmentVec,
    input: &'i str,
) -> IResult<&'i str, (), ParseVersionErrorKind> {
    let (mut rest, first_len) = segment_parser(components, input)?;
    segment_lengths.push(first_len);

    loop {
        let separator = match rest.chars().next() {
            Some(c @ ('.' | '-' | '_')) => c,
            _ => return Ok((rest, ())),
        };
        let after = &rest[separator.len_utf8()..];

        match segment_parser(components, after) {
            Ok((remaining, len)) => {
                segment_lengths.push(len);
                rest = remaining;
            }
            Err(nom::Err::Error(_)) if separator != '.' => {
                // A trailing underscore or dash sorts as a string component on
                // the last segment ("1.0.1_" for the openssl convention).
                let last = segment_lengths
                    .last_mut()
                    .expect("at least one segment was parsed");
                components.push(Component::Iden("_".into()));
                *last = last
                    .checked_add(1)
                    .ok_or(nom::Err::Failure(ParseVersionErrorKind::TooManyComponents))?;

                let mut remaining = after;
                while let Some(c @ ('-' | '_')) = remaining.chars().next() {
                    components.push(Component::Iden("_".into()));
                    *last = last
                        .checked_add(1)
                        .ok_or(nom::Err::Failure(ParseVersionErrorKind::TooManyComponents))?;
                    remaining = &remaining[c.len_utf8()..];
                }
                return Ok((remaining, ()));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parses an epoch, a number followed by `!`.
fn epoch_parser(input: &str) -> IResult<&str, u64, ParseVersionErrorKind> {
    let (rest, digits) = terminated(digit1, tag("!"))(input)?;
    let epoch = digits
        .parse()
        .map_err(ParseVersionErrorKind::EpochMustBeInteger)
        .map_err(nom::Err::Failure)?;
    Ok((rest, epoch))
}

pub(crate) fn parse_version(normalized: &str) -> Result<Version, ParseVersionErrorKind> {
    if normalized.is_empty() {
        return Err(ParseVersionErrorKind::Empty);
    }

    let mut components = ComponentVec::new();
    let mut segment_lengths = SegmentVec::new();

    let (input, epoch) =
        opt(epoch_parser)(normalized).map_err(|e: nom::Err<ParseVersionErrorKind>| unwrap_err(e))?;

    let (rest, ()) = part_parser(&mut components, &mut segment_lengths, input)
        .map_err(unwrap_err)?;

    let local_start =
        u16::try_from(segment_lengths.len()).map_err(|_| ParseVersionErrorKind::TooManySegments)?;

    let rest = if let Some(local) = rest.strip_prefix('+') {
        let (rest, ()) =
            part_parser(&mut components, &mut segment_lengths, local).map_err(unwrap_err)?;
        rest
    } else {
        rest
    };

    if !rest.is_empty() {
        return Err(ParseVersionErrorKind::ExpectedEof);
    }
    if segment_lengths.len() > u16::MAX as usize {
        return Err(ParseVersionErrorKind::TooManySegments);
    }

    Ok(Version::from_parts(
        normalized.into(),
        epoch.unwrap_or(0),
        components,
        segment_lengths,
        local_start,
    ))
}

fn unwrap_err(e: nom::Err<ParseVersionErrorKind>) -> ParseVersionErrorKind {
    match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => unreachable!("only complete parsers are used"),
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        parse_version(&normalized).map_err(|kind| ParseVersionError::new(s, kind))
    }
}

impl FromStr for super::StrictVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(super::StrictVersion(Version::from_str(s)?))
    }
}

#[cfg(test)]
mod test {
    use super::super::Version;
    use super::ParseVersionErrorKind;
    use std::str::FromStr;

    #[test]
    fn valid_versions() {
        for version in [
            "1",
            "1.2.3",
            "0.4.1.rc",
            "1!1.2a.3-rc1",
            "1+2",
            "1-2-3",
            "1.0.1_",
            "1.0.1-",
            "1.0.1post.za",
            "1_",
            "1__",
            "1_2_3_",
            "4.2+local.3",
            "2020.12ab",
        ] {
            let parsed = Version::from_str(version);
            assert!(parsed.is_ok(), "{version}: {:?}", parsed.err());
        }
    }

    #[test]
    fn invalid_versions() {
        for (version, kind) in [
            ("", ParseVersionErrorKind::Empty),
            ("  ", ParseVersionErrorKind::Empty),
            ("$", ParseVersionErrorKind::ExpectedComponent),
            (".", ParseVersionErrorKind::ExpectedComponent),
            ("1.", ParseVersionErrorKind::ExpectedComponent),
            ("1+", ParseVersionErrorKind::ExpectedComponent),
            ("1+$", ParseVersionErrorKind::ExpectedComponent),
            ("1@2", ParseVersionErrorKind::ExpectedEof),
            ("1.*", ParseVersionErrorKind::ExpectedComponent),
        ] {
            assert_eq!(
                Version::from_str(version).map_err(|e| e.kind),
                Err(kind),
                "{version}"
            );
        }
    }

    #[test]
    fn epoch() {
        assert_eq!(Version::from_str("1!1.2").unwrap().epoch(), 1);
        assert_eq!(Version::from_str("1.2").unwrap().epoch(), 0);
        assert!(matches!(
            Version::from_str("123456789012345678901234567890!1.2")
                .unwrap_err()
                .kind,
            ParseVersionErrorKind::EpochMustBeInteger(_)
        ));
    }

    #[test]
    fn implicit_zero_before_letters() {
        // 1.1.a1 == 1.1.0a1 because a leading letter gets an implicit zero.
        assert_eq!(
            Version::from_str("1.1.a1").unwrap(),
            Version::from_str("1.1.0a1").unwrap()
        );
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(
            Version::from_str("0.4.1.RC").unwrap(),
            Version::from_str("0.4.1.rc").unwrap()
        );
    }
}

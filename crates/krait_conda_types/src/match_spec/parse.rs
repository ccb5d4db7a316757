//! Parsing of [`MatchSpec`] strings.

use std::str::FromStr;

use krait_digest::parse_digest_from_hex;
use thiserror::Error;

use crate::{
    BuildNumberSpec, EqualityOperator, InvalidPackageNameError, MatchSpec, PackageName,
    ParseBuildNumberSpecError, ParseStrictness, ParseVersionSpecError, Platform, StringMatcher,
    StringMatcherParseError, Version, VersionSpec,
};

/// An error that can occur while parsing a [`MatchSpec`] string.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseMatchSpecError {
    /// The spec has no package name.
    #[error("missing package name in '{0}'")]
    MissingPackageName(String),

    /// The spec could not be split into its parts.
    #[error("invalid match spec near '{0}'")]
    InvalidSpec(String),

    /// A bracket section was malformed.
    #[error("invalid bracket section '{0}'")]
    InvalidBracket(String),

    /// An unknown key appeared in a bracket section.
    #[error("unknown bracket key '{0}'")]
    UnknownBracketKey(String),

    /// A hash value could not be parsed.
    #[error("invalid hash digest '{0}'")]
    InvalidHashDigest(String),

    /// The package name is invalid.
    #[error(transparent)]
    InvalidPackageName(#[from] InvalidPackageNameError),

    /// The version part is invalid.
    #[error(transparent)]
    InvalidVersionSpec(#[from] ParseVersionSpecError),

    /// The build number part is invalid.
    #[error(transparent)]
    InvalidBuildNumberSpec(#[from] ParseBuildNumberSpecError),

    /// The build string matcher is invalid.
    #[error(transparent)]
    InvalidStringMatcher(#[from] StringMatcherParseError),
}

impl MatchSpec {
    /// Parses a [`MatchSpec`] from a string.
    ///
    /// The grammar accepts `channel(/subdir)::name version build` with an
    /// optional trailing `[key=value, ...]` bracket section, as well as the
    /// pip-style `name>=version` and the exact `name=version=build` forms.
    pub fn from_str(
        source: &str,
        strictness: ParseStrictness,
    ) -> Result<Self, ParseMatchSpecError> {
        let mut spec = MatchSpec::default();

        // Strip a trailing comment.
        let source = match source.find('#') {
            Some(idx) => &source[..idx],
            None => source,
        };
        let source = source.trim();

        // Split off the bracket section.
        let source = if let Some(stripped) = source.strip_suffix(']') {
            let (rest, brackets) = stripped
                .rsplit_once('[')
                .ok_or_else(|| ParseMatchSpecError::InvalidBracket(source.to_owned()))?;
            parse_bracket_section(brackets, &mut spec, strictness)?;
            rest.trim()
        } else {
            source
        };

        // Split off the channel part.
        let source = if let Some((channel_part, rest)) = source.split_once("::") {
            apply_channel(channel_part, &mut spec);
            rest.trim()
        } else {
            source
        };

        // The name runs until the first operator or whitespace.
        let name_end = source
            .find(|c: char| " =<>!~".contains(c))
            .unwrap_or(source.len());
        let (name, spec_part) = source.split_at(name_end);
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseMatchSpecError::MissingPackageName(source.to_owned()));
        }
        if name != "*" {
            spec.name = Some(PackageName::from_str(name)?);
        }

        let spec_part = spec_part.trim();
        if !spec_part.is_empty() {
            let (version, build) = split_version_and_build(spec_part)?;
            if let Some(version) = version {
                // Bracket values take precedence over the positional parts.
                if spec.version.is_none() {
                    spec.version = Some(version);
                }
            }
            if let Some(build) = build {
                if spec.build.is_none() {
                    spec.build = Some(StringMatcher::from_str(&build)?);
                }
            }
        }

        Ok(spec)
    }
}

impl FromStr for MatchSpec {
    type Err = ParseMatchSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatchSpec::from_str(s, ParseStrictness::Lenient)
    }
}

/// Applies a `channel` or `channel/subdir` prefix to the spec. A bare `*`
/// leaves both unconstrained.
fn apply_channel(channel_part: &str, spec: &mut MatchSpec) {
    let channel_part = channel_part.trim();
    if channel_part.is_empty() || channel_part == "*" {
        return;
    }

    // When the last path component is a platform it is the subdir.
    if let Some((channel, maybe_subdir)) = channel_part.rsplit_once('/') {
        if Platform::from_str(maybe_subdir).is_ok() {
            spec.channel = Some(channel.to_owned());
            spec.subdir = Some(maybe_subdir.to_owned());
            return;
        }
    }
    spec.channel = Some(channel_part.to_owned());
}

/// Splits `1.0.* py27_0`-style text into its version and build parts.
fn split_version_and_build(
    spec_part: &str,
) -> Result<(Option<VersionSpec>, Option<String>), ParseMatchSpecError> {
    // The `=version=build` form pins the version exactly.
    if !spec_part.contains(char::is_whitespace)
        && spec_part.starts_with('=')
        && !spec_part.starts_with("==")
    {
        if let Some((version, build)) = spec_part[1..].split_once('=') {
            if !build.is_empty() && !build.starts_with('=') {
                let version_spec = if version.ends_with('*') {
                    VersionSpec::from_str(version, ParseStrictness::Lenient)?
                } else {
                    VersionSpec::Exact(
                        EqualityOperator::Equals,
                        Version::from_str(version).map_err(|e| {
                            ParseMatchSpecError::InvalidVersionSpec(
                                ParseVersionSpecError::InvalidVersion(e),
                            )
                        })?,
                    )
                };
                return Ok((Some(version_spec), Some(build.to_owned())));
            }
        }
    }

    // Merge tokens so that `>= 1.2` and `>=1.0, <2.0` stay one version part.
    let mut tokens: Vec<String> = Vec::new();
    for token in spec_part.split_whitespace() {
        let merge = tokens.last().is_some_and(|prev: &String| {
            prev.ends_with(|c| "=<>!~,|".contains(c))
        }) || tokens.last().is_some() && token.starts_with(|c| ",|".contains(c));
        if merge {
            tokens.last_mut().unwrap().push_str(token);
        } else {
            tokens.push(token.to_owned());
        }
    }

    match tokens.len() {
        0 => Ok((None, None)),
        1 => Ok((
            Some(VersionSpec::from_str(&tokens[0], ParseStrictness::Lenient)?),
            None,
        )),
        2 => Ok((
            Some(VersionSpec::from_str(&tokens[0], ParseStrictness::Lenient)?),
            Some(tokens[1].clone()),
        )),
        _ => Err(ParseMatchSpecError::InvalidSpec(spec_part.to_owned())),
    }
}

/// Parses the `[key=value, key2="value 2"]` section of a spec.
fn parse_bracket_section(
    section: &str,
    spec: &mut MatchSpec,
    strictness: ParseStrictness,
) -> Result<(), ParseMatchSpecError> {
    for entry in split_bracket_entries(section) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (key, value) = match entry.split_once('=') {
            Some((key, value)) => (key.trim(), unquote(value.trim())),
            None => (entry, ""),
        };

        match key {
            "version" => {
                spec.version = Some(VersionSpec::from_str(value, strictness)?);
            }
            "build" => {
                spec.build = Some(StringMatcher::from_str(value)?);
            }
            "build_number" => {
                spec.build_number = Some(BuildNumberSpec::from_str(value)?);
            }
            "channel" => {
                apply_channel(value, spec);
            }
            "subdir" => {
                spec.subdir = Some(value.to_owned());
            }
            "fn" => {
                spec.file_name = Some(value.to_owned());
            }
            "md5" => {
                spec.md5 = Some(
                    parse_digest_from_hex::<krait_digest::Md5>(value)
                        .ok_or_else(|| ParseMatchSpecError::InvalidHashDigest(value.to_owned()))?,
                );
            }
            "sha256" => {
                spec.sha256 = Some(
                    parse_digest_from_hex::<krait_digest::Sha256>(value)
                        .ok_or_else(|| ParseMatchSpecError::InvalidHashDigest(value.to_owned()))?,
                );
            }
            "features" => {
                spec.features = Some(split_feature_list(value));
            }
            "track_features" => {
                spec.track_features = Some(split_feature_list(value));
            }
            "optional" => {
                spec.optional = value.is_empty() || value == "true";
            }
            "target" => {
                spec.target = Some(value.to_owned());
            }
            other => return Err(ParseMatchSpecError::UnknownBracketKey(other.to_owned())),
        }
    }
    Ok(())
}

/// Splits bracket entries on commas that are not inside quotes.
fn split_bracket_entries(section: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (idx, c) in section.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => {
                entries.push(&section[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    entries.push(&section[start..]);
    entries
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('\'') && value.ends_with('\''))
            || (value.starts_with('"') && value.ends_with('"')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn split_feature_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

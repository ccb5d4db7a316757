use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{all_consuming, map},
    multi::separated_list1,
    sequence::delimited,
    IResult,
};
use thiserror::Error;

use crate::{ParseStrictness, ParseVersionError, StrictVersion, Version};

use super::{
    EqualityOperator, LogicalOperator, RangeOperator, StrictRangeOperator, VersionSpec,
};

/// A hierarchy of version constraints before the individual terms are parsed,
/// e.g. `1.3.4,>=5.0.1|(1.2.4,>=3.0.1)`.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum VersionTree<'a> {
    Term(&'a str),
    Group(LogicalOperator, Vec<VersionTree<'a>>),
}

/// An error that can occur while parsing an individual version constraint.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ParseConstraintError {
    /// A glob (`*`) was used together with an operator that cannot support
    /// it.
    #[error("`*` is incompatible with the `{0}` operator")]
    GlobIncompatibleWithOperator(String),
    /// A glob appeared in the middle of a version (e.g. `2023.*.0`).
    #[error("glob patterns are only supported at the end of a version")]
    GlobNotAtEnd,
    /// Regular expression constraints are not supported.
    #[error("regex constraints are not supported")]
    RegexConstraintsNotSupported,
    /// A regex constraint without a closing `$`.
    #[error("unterminated unsupported regular expression")]
    UnterminatedRegex,
    /// The operator was not recognized.
    #[error("invalid operator '{0}'")]
    InvalidOperator(String),
    /// The version failed to parse.
    #[error(transparent)]
    InvalidVersion(#[from] ParseVersionError),
    /// A version was expected but not found.
    #[error("expected a version")]
    ExpectedVersion,
    /// Trailing characters after the constraint.
    #[error("unexpected trailing characters '{0}'")]
    UnexpectedTrailing(String),
}

/// The operator that prefixes a single constraint term.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ConstraintOperator {
    Range(RangeOperator),
    StartsWith,
    Compatible,
    Exact(EqualityOperator),
}

impl ConstraintOperator {
    fn as_str(&self) -> &'static str {
        match self {
            ConstraintOperator::Range(RangeOperator::Greater) => ">",
            ConstraintOperator::Range(RangeOperator::GreaterEquals) => ">=",
            ConstraintOperator::Range(RangeOperator::Less) => "<",
            ConstraintOperator::Range(RangeOperator::LessEquals) => "<=",
            ConstraintOperator::StartsWith => "=",
            ConstraintOperator::Compatible => "~=",
            ConstraintOperator::Exact(EqualityOperator::Equals) => "==",
            ConstraintOperator::Exact(EqualityOperator::NotEquals) => "!=",
        }
    }
}

/// Splits the operator off the front of a constraint term.
fn split_operator(term: &str) -> Result<(Option<ConstraintOperator>, &str), ParseConstraintError> {
    let op_len = term.chars().take_while(|c| "=!<>~".contains(*c)).count();
    let (op, rest) = term.split_at(op_len);
    let operator = match op {
        "" => None,
        "==" => Some(ConstraintOperator::Exact(EqualityOperator::Equals)),
        "!=" => Some(ConstraintOperator::Exact(EqualityOperator::NotEquals)),
        "=" => Some(ConstraintOperator::StartsWith),
        "<" => Some(ConstraintOperator::Range(RangeOperator::Less)),
        "<=" => Some(ConstraintOperator::Range(RangeOperator::LessEquals)),
        ">" => Some(ConstraintOperator::Range(RangeOperator::Greater)),
        ">=" => Some(ConstraintOperator::Range(RangeOperator::GreaterEquals)),
        "~=" => Some(ConstraintOperator::Compatible),
        other => return Err(ParseConstraintError::InvalidOperator(other.to_owned())),
    };
    Ok((operator, rest.trim_start()))
}

/// Parses a single constraint term like `>=1.2.3`, `1.2.*` or `*`.
pub(crate) fn constraint_parser(
    term: &str,
    strictness: ParseStrictness,
) -> Result<VersionSpec, ParseConstraintError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ParseConstraintError::ExpectedVersion);
    }

    // Regex constraints are recognized but explicitly unsupported.
    if let Some(regex) = term.strip_prefix('^') {
        return Err(if regex.ends_with('$') {
            ParseConstraintError::RegexConstraintsNotSupported
        } else {
            ParseConstraintError::UnterminatedRegex
        });
    }

    let (operator, rest) = split_operator(term)?;

    // The any constraint, optionally behind an operator.
    if rest == "*" || rest == "*.*" {
        return match operator {
            None => Ok(VersionSpec::Any),
            Some(op) => {
                let compatible = matches!(
                    op,
                    ConstraintOperator::Range(RangeOperator::GreaterEquals)
                        | ConstraintOperator::Range(RangeOperator::LessEquals)
                        | ConstraintOperator::StartsWith
                        | ConstraintOperator::Compatible
                        | ConstraintOperator::Exact(EqualityOperator::Equals)
                );
                if compatible && strictness == ParseStrictness::Lenient {
                    Ok(VersionSpec::Any)
                } else {
                    Err(ParseConstraintError::GlobIncompatibleWithOperator(
                        op.as_str().to_owned(),
                    ))
                }
            }
        };
    }

    if rest.is_empty() {
        return Err(ParseConstraintError::ExpectedVersion);
    }

    // Strip a trailing glob. Lenient mode also accepts sloppy forms like
    // `2023.*.*` and `0.2.18.*.`.
    let version_str = rest.trim_end_matches(|c| c == '.' || c == '*');
    let suffix = &rest[version_str.len()..];
    let glob = !suffix.is_empty();
    if glob && strictness == ParseStrictness::Strict && !matches!(suffix, "*" | ".*") {
        return Err(ParseConstraintError::GlobNotAtEnd);
    }
    if version_str.contains('*') {
        return Err(ParseConstraintError::GlobNotAtEnd);
    }
    if version_str.is_empty() {
        return Err(ParseConstraintError::ExpectedVersion);
    }

    let version: Version = version_str.parse()?;

    let spec = match (glob, operator) {
        // A glob without an operator, or behind `=`, is a startswith match.
        (true, None) | (true, Some(ConstraintOperator::StartsWith)) => {
            VersionSpec::StrictRange(StrictRangeOperator::StartsWith, StrictVersion(version))
        }
        (true, Some(op)) => {
            if strictness == ParseStrictness::Strict {
                return Err(ParseConstraintError::GlobIncompatibleWithOperator(
                    op.as_str().to_owned(),
                ));
            }
            match op {
                ConstraintOperator::Range(
                    RangeOperator::Greater | RangeOperator::GreaterEquals,
                ) => VersionSpec::Range(RangeOperator::GreaterEquals, version),
                ConstraintOperator::Exact(EqualityOperator::NotEquals) => VersionSpec::StrictRange(
                    StrictRangeOperator::NotStartsWith,
                    StrictVersion(version),
                ),
                ConstraintOperator::Compatible => VersionSpec::StrictRange(
                    StrictRangeOperator::Compatible,
                    StrictVersion(version),
                ),
                op => {
                    tracing::warn!(
                        "using a glob with the `{}` operator is superfluous, ignoring the glob",
                        op.as_str()
                    );
                    operator_spec(op, version)
                }
            }
        }
        (false, Some(op)) => operator_spec(op, version),
        (false, None) => VersionSpec::Exact(EqualityOperator::Equals, version),
    };

    Ok(spec)
}

fn operator_spec(op: ConstraintOperator, version: Version) -> VersionSpec {
    match op {
        ConstraintOperator::Range(range) => VersionSpec::Range(range, version),
        ConstraintOperator::StartsWith => {
            VersionSpec::StrictRange(StrictRangeOperator::StartsWith, StrictVersion(version))
        }
        ConstraintOperator::Compatible => {
            VersionSpec::StrictRange(StrictRangeOperator::Compatible, StrictVersion(version))
        }
        ConstraintOperator::Exact(eq) => VersionSpec::Exact(eq, version),
    }
}

type TreeResult<'a, T> = IResult<&'a str, T, nom::error::Error<&'a str>>;

impl<'a> VersionTree<'a> {
    /// Parses the `,`/`|`/parenthesis structure of a version spec. The
    /// individual terms are left unparsed.
    pub(crate) fn try_from(input: &'a str) -> Result<Self, String> {
        fn parse_term<'a>(input: &'a str) -> TreeResult<'a, VersionTree<'a>> {
            alt((
                delimited(
                    delimited(multispace0, char('('), multispace0),
                    parse_or_group,
                    delimited(multispace0, char(')'), multispace0),
                ),
                map(
                    take_while1(|c: char| !",|()".contains(c)),
                    |term: &str| VersionTree::Term(term.trim()),
                ),
            ))(input)
        }

        fn flatten_group<'a>(
            operator: LogicalOperator,
            mut args: Vec<VersionTree<'a>>,
        ) -> VersionTree<'a> {
            if args.len() == 1 {
                args.pop().unwrap()
            } else {
                let mut result = Vec::new();
                for term in args {
                    match term {
                        VersionTree::Group(op, mut others) if op == operator => {
                            result.append(&mut others);
                        }
                        term => result.push(term),
                    }
                }
                VersionTree::Group(operator, result)
            }
        }

        fn parse_and_group<'a>(input: &'a str) -> TreeResult<'a, VersionTree<'a>> {
            map(separated_list1(char(','), parse_term), |terms| {
                flatten_group(LogicalOperator::And, terms)
            })(input)
        }

        fn parse_or_group<'a>(input: &'a str) -> TreeResult<'a, VersionTree<'a>> {
            map(separated_list1(char('|'), parse_and_group), |terms| {
                flatten_group(LogicalOperator::Or, terms)
            })(input)
        }

        match all_consuming(parse_or_group)(input) {
            Ok((_, tree)) => Ok(tree),
            Err(e) => Err(format!("failed to parse version spec '{input}': {e}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{LogicalOperator, VersionTree};

    #[test]
    fn tree_structure() {
        assert_eq!(
            VersionTree::try_from(">=1.2.3,<2").unwrap(),
            VersionTree::Group(
                LogicalOperator::And,
                vec![VersionTree::Term(">=1.2.3"), VersionTree::Term("<2")]
            )
        );
        assert_eq!(
            VersionTree::try_from("1.2|(>3,<4)").unwrap(),
            VersionTree::Group(
                LogicalOperator::Or,
                vec![
                    VersionTree::Term("1.2"),
                    VersionTree::Group(
                        LogicalOperator::And,
                        vec![VersionTree::Term(">3"), VersionTree::Term("<4")]
                    )
                ]
            )
        );
    }

    #[test]
    fn nested_groups_flatten() {
        assert_eq!(
            VersionTree::try_from("(1|2)|3").unwrap(),
            VersionTree::Group(
                LogicalOperator::Or,
                vec![
                    VersionTree::Term("1"),
                    VersionTree::Term("2"),
                    VersionTree::Term("3")
                ]
            )
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(VersionTree::try_from("").is_err());
    }
}

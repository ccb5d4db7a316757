//! `krait_conda_types` contains the data types used across the krait
//! workspace to describe Conda packages, the channels they come from, the
//! constraints users place on them, and the state of an installed prefix.
//!
//! Nothing in this crate performs IO beyond reading and writing the on-disk
//! JSON formats; fetching, solving and linking live in the sibling crates.

mod build_spec;
mod channel;
pub mod history;
mod match_spec;
mod no_arch_type;
pub mod package;
mod package_name;
mod platform;
pub mod prefix_record;
mod repo_data;
mod repo_data_record;
mod string_matcher;
mod utils;
mod version;
mod version_spec;

pub use build_spec::{BuildNumber, BuildNumberSpec, OrdOperator, ParseBuildNumberSpecError};
pub use channel::{Channel, ChannelConfig, NamedChannelOrUrl, ParseChannelError};
pub use history::{
    History, HistoryError, HistoryRevision, ParsedHistory, Revision, UserRequest,
};
pub use match_spec::{MatchSpec, Matches, NamelessMatchSpec, ParseMatchSpecError};
pub use no_arch_type::{NoArchKind, NoArchType};
pub use package_name::{InvalidPackageNameError, PackageName};
pub use platform::{Arch, ParsePlatformError, Platform};
pub use prefix_record::{
    Link, LinkType, PathType, PathsEntry, PrefixPaths, PrefixRecord,
};
pub use repo_data::{
    compute_package_url, ChannelInfo, PackageRecord, RepoData, ValidatePackageRecordsError,
};
pub use repo_data_record::RepoDataRecord;
pub use string_matcher::{StringMatcher, StringMatcherParseError};
pub use version::{
    ParseVersionError, ParseVersionErrorKind, StrictVersion, Version,
};
pub use version_spec::{
    EqualityOperator, LogicalOperator, ParseVersionSpecError, RangeOperator,
    StrictRangeOperator, VersionSpec,
};

/// How strict parsing of a user supplied string should be.
///
/// Conda has historically been very lenient in what it accepts (e.g. `>=3.8*`
/// or `2023.*.*`). `Lenient` mode accepts those legacy forms and normalizes
/// them, `Strict` mode rejects them.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum ParseStrictness {
    /// Accept legacy spec forms and normalize them.
    #[default]
    Lenient,
    /// Reject anything that is not canonical.
    Strict,
}

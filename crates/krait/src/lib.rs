//! krait is a library to create and manipulate conda environments: it
//! installs, upgrades and removes pre-built packages in directory-based
//! prefixes.
//!
//! The heavy machinery lives in the sibling crates (`krait_conda_types` for
//! the data model, `krait_solve` for dependency resolution, `krait_cache`
//! and `krait_package_streaming` for the package cache and downloads,
//! `krait_repodata` for index loading). This crate ties them together and
//! owns what remains: the configuration, the per-prefix installed-record
//! database, the fetch/extract pipeline, and — at the center — the
//! unlink/link transaction that mutates a prefix atomically.

pub mod activate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod install;
pub mod prefix_data;

pub use activate::{activate, ActivationResult};
pub use config::{Config, PathConflict, SafetyChecks};
pub use error::{Confirmation, KraitError};
pub use prefix_data::{PrefixData, PrefixDataError};

#![deny(missing_docs)]

//! The local package cache shared by every prefix on the machine.
//!
//! A cache directory contains, per package build:
//!
//! * `<name>-<version>-<build>/` — the extracted package tree. The presence
//!   of `info/index.json` inside marks the entry as complete.
//! * `<name>-<version>-<build>.tar.bz2` — the original archive.
//! * `.trash/<uuid>` — entries pending deletion on filesystems that refuse
//!   to delete files that are still open (virus scanners, locked files).
//!
//! Writers for the same entry are serialized through a lock file; readers
//! only check the completion sentinel and never take a lock.

mod package_cache;
pub mod validation;

pub use package_cache::{CacheLocation, PackageCache, PackageCacheError};

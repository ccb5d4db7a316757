#![deny(missing_docs)]

//! Fetching of `repodata.json` files and assembly of the package index the
//! solver works on.
//!
//! Per (channel, platform) pair the [`fetch`] module downloads
//! `repodata.json` (or its `repodata.json.bz2` variant), keeping an
//! etag-validated copy under `<pkgs_dir>/cache/`. The [`index`] module loads
//! and merges the repodata of all configured channels into a single
//! [`index::Index`], deduplicating records across channels and inserting the
//! synthetic `@feature` records the solver uses to reason about track
//! features.

pub mod fetch;
pub mod index;

pub use fetch::{fetch_repo_data, FetchRepoDataError};
pub use index::{load_index, ChannelError, Index};

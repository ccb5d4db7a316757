//! Installing and removing packages in a prefix.
//!
//! The submodules are layered: [`link`] and [`unlink`] hold the per-file
//! primitives, [`actions`] wraps them in verify/execute/reverse action
//! objects, and [`transaction`] orchestrates the actions in a two-phase
//! transaction with rollback. [`python`] carries the interpreter specifics
//! for `noarch: python` packages, [`entry_point`] materializes console
//! scripts, and [`link_script`] runs the pre/post scripts packages ship.

pub mod actions;
pub mod entry_point;
pub mod link;
pub mod link_script;
pub mod python;
pub(crate) mod signal;
pub mod transaction;
pub mod unlink;

pub use link::{link_file, LinkFileError, LinkMethod};
pub use python::PythonInfo;
pub use transaction::{
    Transaction, TransactionError, TransactionOperation, UnlinkLinkTransaction,
};

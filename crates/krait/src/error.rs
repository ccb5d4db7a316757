//! The closed error taxonomy the core reports to its CLI collaborator.
//!
//! Everything that can fail user-visibly maps onto one of these kinds; the
//! collaborator renders them and exits with [`KraitError::exit_code`]. There
//! is no runtime error registry: the enumeration is the contract.

use std::path::PathBuf;

use krait_conda_types::ParseMatchSpecError;

use crate::install::transaction::TransactionError;
use crate::prefix_data::PrefixDataError;

/// The outcome of asking the user to confirm a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Execute the plan.
    Proceed,
    /// Print the plan and exit successfully without executing.
    DryRun,
    /// The user declined.
    Abort,
}

/// A user visible failure of the core.
#[derive(Debug, thiserror::Error)]
pub enum KraitError {
    /// A spec string could not be parsed.
    #[error("invalid match spec: {0}")]
    InvalidSpec(#[from] ParseMatchSpecError),

    /// A spec matched no record in any consulted channel.
    #[error(transparent)]
    PackagesNotFound(#[from] krait_solve::PackagesNotFoundError),

    /// The requested specs cannot be satisfied together.
    #[error(transparent)]
    Unsatisfiable(#[from] krait_solve::UnsatisfiableError),

    /// The solver failed for another reason.
    #[error(transparent)]
    SolveError(krait_solve::SolveError),

    /// A channel failed to load.
    #[error(transparent)]
    ChannelError(#[from] krait_repodata::ChannelError),

    /// Downloading or validating packages failed.
    #[error(transparent)]
    FetchError(#[from] crate::fetch::FetchErrors),

    /// A package that is not installed was addressed.
    #[error("package '{0}' is not installed")]
    PackageNotInstalled(String),

    /// The target directory is not a conda environment.
    #[error("'{0}' is not a conda environment")]
    DirectoryNotACondaEnvironment(PathBuf),

    /// The target environment cannot be written to.
    #[error("the environment '{0}' is not writable")]
    EnvironmentNotWritable(PathBuf),

    /// Reading or writing prefix records failed.
    #[error(transparent)]
    PrefixDataError(#[from] PrefixDataError),

    /// The transaction failed; see the contained phase error.
    #[error(transparent)]
    TransactionError(#[from] TransactionError),

    /// The plan was not executed because dry-run mode is active. This is a
    /// success for exit-code purposes.
    #[error("dry run: exiting without executing the plan")]
    DryRunExit,

    /// The user declined the plan.
    #[error("aborted by user")]
    Aborted,
}

impl From<krait_solve::SolveError> for KraitError {
    fn from(err: krait_solve::SolveError) -> Self {
        match err {
            krait_solve::SolveError::PackagesNotFound(e) => KraitError::PackagesNotFound(e),
            krait_solve::SolveError::Unsatisfiable(e) => KraitError::Unsatisfiable(e),
            other => KraitError::SolveError(other),
        }
    }
}

impl KraitError {
    /// The process exit code the CLI collaborator should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            // A dry run is a successful outcome.
            KraitError::DryRunExit => 0,
            // Malformed user input.
            KraitError::InvalidSpec(_) => 2,
            _ => 1,
        }
    }
}

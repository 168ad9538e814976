use thiserror::Error;

use crate::core::config::ConfigError;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors surfaced by the registry, the history writer and the remote sync
#[derive(Error, Debug)]
pub enum DeployError {
    /// An identifier matched neither a version nor an alias
    #[error("identifier '{0}' does not exist")]
    NotFound(String),

    /// The persisted versions document could not be understood
    #[error("corrupt versions data: {0}")]
    CorruptData(String),

    /// The branch tip moved between the start of a transaction and its commit
    #[error("{branch} was updated concurrently (expected {expected}, found {found})")]
    ConcurrentUpdate {
        branch: String,
        expected: String,
        found: String,
    },

    /// Local and remote branch share no linear history (strict mode only)
    #[error("{branch} has diverged from {remote}/{branch}")]
    DivergedHistory { branch: String, remote: String },

    /// Fetching the remote branch failed
    #[error("failed to fetch {remote}/{branch}: {reason}")]
    Network {
        remote: String,
        branch: String,
        reason: String,
    },

    /// Any other failure reported by the history backend
    #[error("history backend error: {0}")]
    Backend(String),

    /// Invalid arguments
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Build a `ConcurrentUpdate` from the tip we expected and the one we saw
    pub(crate) fn concurrent_update(
        branch: &str,
        expected: Option<crate::core::ObjectId>,
        found: Option<crate::core::ObjectId>,
    ) -> Self {
        let show = |id: Option<crate::core::ObjectId>| {
            id.map(|id| id.short()).unwrap_or_else(|| "nothing".to_string())
        };
        DeployError::ConcurrentUpdate {
            branch: branch.to_string(),
            expected: show(expected),
            found: show(found),
        }
    }
}

/// Shorthand for wrapping a backend failure with context
pub(crate) fn backend_err(context: &str, err: impl std::fmt::Display) -> DeployError {
    DeployError::Backend(format!("{}: {}", context, err))
}

//! Caller-facing operations.
//!
//! Every operation runs the same pipeline: synchronize the branch with its
//! remote, read the versions registry from the tip, mutate it together with
//! the published files inside one [`Transaction`], and commit. A failure at
//! any step leaves the branch untouched.

mod list;
mod manage;
mod publish;

use crate::core::{DeployConfig, DeployError, Result};
use crate::repository::{synchronize, HistoryBackend, SyncOptions, SyncReport, Transaction, TreeSource};
use crate::utils::path::join_tree_path;
use crate::versions::Versions;

pub use list::format_entry;

/// Per-invocation switches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationOptions {
    /// Abort instead of warning when the branch has diverged from the remote
    pub strict: bool,
    /// Skip remote synchronization altogether
    pub ignore_remote_status: bool,
    /// Commit message overriding the generated one
    pub message: Option<String>,
}

impl OperationOptions {
    fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            strict: self.strict,
            ignore_remote_status: self.ignore_remote_status,
        }
    }

    fn message_or(&self, generated: String) -> String {
        self.message.clone().unwrap_or(generated)
    }
}

/// Result of an operation along with what synchronization reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    /// `None` when synchronization was skipped after a fetch failure
    pub sync: Option<SyncReport>,
    pub warnings: Vec<String>,
}

/// Operations on the versions published to one branch
pub struct Deployer<'a, B: HistoryBackend> {
    backend: &'a B,
    config: &'a DeployConfig,
}

impl<'a, B: HistoryBackend> Deployer<'a, B> {
    pub fn new(backend: &'a B, config: &'a DeployConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &DeployConfig {
        self.config
    }

    /// Reconcile with the remote; read-only callers tolerate a failed fetch
    fn prepare(&self, options: &OperationOptions, read_only: bool) -> Result<(Option<SyncReport>, Vec<String>)> {
        match synchronize(
            self.backend,
            &self.config.remote,
            &self.config.branch,
            options.sync_options(),
        ) {
            Ok(report) => {
                let warnings = report.warning.iter().cloned().collect();
                Ok((Some(report), warnings))
            }
            Err(err @ DeployError::Network { .. }) if read_only => {
                log::debug!("continuing with local {}: {}", self.config.branch, err);
                Ok((None, vec![err.to_string()]))
            }
            Err(err) => Err(err),
        }
    }

    /// Registry as committed at the branch tip
    fn read_versions(&self) -> Result<Versions> {
        match self.backend.get_ref(&self.config.branch)? {
            Some(tip) => {
                let content = self.backend.read_file(&tip, &self.config.versions_path())?;
                parse_versions(content)
            }
            None => Ok(Versions::new()),
        }
    }

    fn begin(&self, message: String) -> Result<Transaction<'a, B>> {
        Transaction::begin(self.backend, &self.config.branch, &message)
    }

    /// Registry as the transaction currently sees it
    fn load(&self, tx: &Transaction<'a, B>) -> Result<Versions> {
        parse_versions(tx.read_file(&self.config.versions_path())?)
    }

    fn store(&self, tx: &mut Transaction<'a, B>, versions: &Versions) -> Result<()> {
        tx.add_file(&self.config.versions_path(), versions.serialize()?)
    }

    /// Reject ids and aliases that cannot own a directory next to the registry
    fn check_name(&self, kind: &str, name: &str) -> Result<()> {
        validate_name(kind, name)?;
        if name == self.config.versions_file {
            return Err(DeployError::InvalidArgument(format!(
                "{} '{}' collides with the versions file",
                kind, name
            )));
        }
        Ok(())
    }

    /// Replace the directory of `alias` with a copy of the version directory
    /// as committed at the transaction's base
    fn copy_alias_from_base(&self, tx: &mut Transaction<'a, B>, version: &str, alias: &str) -> Result<usize> {
        let base = match tx.base() {
            Some(base) => *base,
            None => return Ok(0),
        };
        let from = self.config.version_dir(version);
        let to = self.config.version_dir(alias);
        tx.delete_file(&to)?;
        tx.copy_from(TreeSource::Revision(base), |path| relocate(path, &from, &to))
    }
}

fn parse_versions(content: Option<Vec<u8>>) -> Result<Versions> {
    match content {
        Some(bytes) => {
            let document = String::from_utf8(bytes)
                .map_err(|e| DeployError::CorruptData(format!("versions file is not UTF-8: {}", e)))?;
            Versions::deserialize(&document)
        }
        None => Ok(Versions::new()),
    }
}

/// Map `path` from under `from` to the same place under `to`
fn relocate(path: &str, from: &str, to: &str) -> Option<String> {
    let rest = path.strip_prefix(from)?.strip_prefix('/')?;
    Some(join_tree_path(to, rest))
}

/// Version ids and aliases name a single directory of the branch
fn validate_name(kind: &str, name: &str) -> Result<()> {
    let bad = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']);
    if bad {
        return Err(DeployError::InvalidArgument(format!("invalid {} '{}'", kind, name)));
    }
    Ok(())
}

//! Remote synchronization.
//!
//! Before any write the local branch is reconciled with its remote-tracking
//! counterpart so that a transaction starts from a known-good tip:
//!
//! ```text
//!   ignore / no remote ──────────────► NoRemote   (proceed)
//!   local == remote ─────────────────► InSync     (proceed)
//!   local ancestor of remote ────────► Behind     (fast-forward, proceed)
//!   remote ancestor of local ────────► Ahead      (proceed)
//!   neither ─────────────────────────► Diverged   (warn and proceed from local,
//!                                                  or abort in strict mode)
//! ```
//!
//! The local ref is only ever moved forward, never rewound.

use std::fmt;

use crate::core::{DeployError, ObjectId, Result};
use crate::repository::{Ancestry, HistoryBackend, RefUpdate};

/// How the local branch relates to the remote one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    InSync,
    Ahead,
    Behind,
    Diverged,
    NoRemote,
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteStatus::InSync => "in-sync",
            RemoteStatus::Ahead => "ahead",
            RemoteStatus::Behind => "behind",
            RemoteStatus::Diverged => "diverged",
            RemoteStatus::NoRemote => "no-remote",
        };
        f.write_str(name)
    }
}

/// Caller switches for one synchronization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Fail with `DivergedHistory` instead of warning
    pub strict: bool,
    /// Skip the check entirely
    pub ignore_remote_status: bool,
}

/// What synchronization found and did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub status: RemoteStatus,
    /// New local tip when the branch was fast-forwarded
    pub fast_forwarded: Option<ObjectId>,
    /// Non-fatal condition the caller should show
    pub warning: Option<String>,
}

impl SyncReport {
    fn new(status: RemoteStatus) -> Self {
        Self {
            status,
            fast_forwarded: None,
            warning: None,
        }
    }
}

/// Reconcile the local `branch` with `remote`'s copy of it
pub fn synchronize<B: HistoryBackend>(
    backend: &B,
    remote: &str,
    branch: &str,
    options: SyncOptions,
) -> Result<SyncReport> {
    if options.ignore_remote_status {
        log::debug!("skipping remote status check for {}", branch);
        return Ok(SyncReport::new(RemoteStatus::NoRemote));
    }
    if !backend.has_remote(remote)? {
        log::debug!("no remote named {}, using local {}", remote, branch);
        return Ok(SyncReport::new(RemoteStatus::NoRemote));
    }

    backend.fetch(remote, branch)?;

    let remote_tip = match backend.get_remote_ref(remote, branch)? {
        Some(tip) => tip,
        None => {
            log::debug!("{} has no branch {}", remote, branch);
            return Ok(SyncReport::new(RemoteStatus::NoRemote));
        }
    };

    let local_tip = match backend.get_ref(branch)? {
        Some(tip) => tip,
        None => {
            fast_forward(backend, branch, None, &remote_tip)?;
            log::info!("created {} from {}/{}", branch, remote, branch);
            return Ok(SyncReport {
                fast_forwarded: Some(remote_tip),
                ..SyncReport::new(RemoteStatus::Behind)
            });
        }
    };

    let report = match backend.ancestry(&local_tip, &remote_tip)? {
        Ancestry::Equal => SyncReport::new(RemoteStatus::InSync),
        Ancestry::DescendantOf => SyncReport::new(RemoteStatus::Ahead),
        Ancestry::AncestorOf => {
            fast_forward(backend, branch, Some(&local_tip), &remote_tip)?;
            log::info!(
                "fast-forwarded {} from {} to {}",
                branch,
                local_tip.short(),
                remote_tip.short()
            );
            SyncReport {
                fast_forwarded: Some(remote_tip),
                ..SyncReport::new(RemoteStatus::Behind)
            }
        }
        Ancestry::Unrelated => {
            let err = DeployError::DivergedHistory {
                branch: branch.to_string(),
                remote: remote.to_string(),
            };
            if options.strict {
                return Err(err);
            }
            log::debug!("proceeding from local {}: {}", branch, err);
            SyncReport {
                warning: Some(err.to_string()),
                ..SyncReport::new(RemoteStatus::Diverged)
            }
        }
    };

    Ok(report)
}

fn fast_forward<B: HistoryBackend>(
    backend: &B,
    branch: &str,
    expected: Option<&ObjectId>,
    new: &ObjectId,
) -> Result<()> {
    match backend.update_ref(branch, expected, new)? {
        RefUpdate::Updated => Ok(()),
        RefUpdate::Stale => {
            let found = backend.get_ref(branch)?;
            Err(DeployError::concurrent_update(branch, expected.copied(), found))
        }
    }
}

//! docver: publish versioned documentation to a git branch without a checkout
//!
//! The versions registry lives as a JSON file inside the published branch;
//! every change to it and to the published files lands as a single commit
//! built directly from git objects.

pub mod commands;
pub mod core;
pub mod repository;
pub mod utils;
pub mod versions;

// Re-export main components for easier consumption
pub use commands::{format_entry, Deployer, OperationOptions, Outcome};
pub use core::{CommitterConfig, ConfigError, DeployConfig, DeployError, ObjectId, ObjectType, Result};
pub use repository::{
    synchronize, GixBackend, HistoryBackend, MemoryBackend, RemoteStatus, SyncOptions, SyncReport, Transaction,
    TreeSource,
};
pub use versions::{compare_versions, VersionEntry, VersionInfo, Versions};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

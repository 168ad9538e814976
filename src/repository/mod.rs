pub mod commit;
pub mod gix_backend;
pub mod memory;
pub mod sync;

use std::collections::BTreeMap;

use crate::core::{ObjectId, Result};

pub use commit::{Transaction, TreeSource};
pub use gix_backend::GixBackend;
pub use memory::MemoryBackend;
pub use sync::{synchronize, RemoteStatus, SyncOptions, SyncReport};

/// Relationship of revision `a` to revision `b`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    Equal,
    /// `a` is a strict ancestor of `b`
    AncestorOf,
    /// `b` is a strict ancestor of `a`
    DescendantOf,
    Unrelated,
}

/// Outcome of a compare-and-swap ref update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefUpdate {
    Updated,
    /// The ref no longer had the expected value; nothing was written
    Stale,
}

/// Kind of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
}

/// One entry of a single directory level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub id: ObjectId,
}

impl TreeEntry {
    /// Key git sorts tree entries by: directories compare as if they ended in '/'
    pub fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.kind == EntryKind::Tree {
            key.push(b'/');
        }
        key
    }
}

/// Primitives a version-control store must offer
pub trait HistoryBackend {
    /// Tip of the local branch, `None` if the branch is unborn
    fn get_ref(&self, branch: &str) -> Result<Option<ObjectId>>;

    /// Last fetched tip of `remote`'s branch
    fn get_remote_ref(&self, remote: &str, branch: &str) -> Result<Option<ObjectId>>;

    /// Whether a remote with this name is configured
    fn has_remote(&self, remote: &str) -> Result<bool>;

    /// Update the remote-tracking ref of `branch` from `remote`
    fn fetch(&self, remote: &str, branch: &str) -> Result<()>;

    /// How revision `a` relates to revision `b`
    fn ancestry(&self, a: &ObjectId, b: &ObjectId) -> Result<Ancestry>;

    /// All blobs reachable from the revision's tree, keyed by `/`-separated path
    fn read_tree(&self, revision: &ObjectId) -> Result<BTreeMap<String, ObjectId>>;

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>>;

    fn write_blob(&self, content: &[u8]) -> Result<ObjectId>;

    /// Write one directory level; entries may arrive in any order
    fn write_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId>;

    fn write_commit(&self, tree: &ObjectId, parent: Option<&ObjectId>, message: &str) -> Result<ObjectId>;

    /// Point `branch` at `new` only if it currently equals `expected`
    /// (`None` meaning the branch must not exist yet)
    fn update_ref(&self, branch: &str, expected: Option<&ObjectId>, new: &ObjectId) -> Result<RefUpdate>;

    /// Content of one file at a revision, if present
    fn read_file(&self, revision: &ObjectId, path: &str) -> Result<Option<Vec<u8>>> {
        match self.read_tree(revision)?.get(path) {
            Some(id) => Ok(Some(self.read_blob(id)?)),
            None => Ok(None),
        }
    }
}

/// Sort entries the way git stores them inside a tree object
pub(crate) fn sort_entries(entries: &[TreeEntry]) -> Vec<TreeEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(TreeEntry::sort_key);
    sorted
}

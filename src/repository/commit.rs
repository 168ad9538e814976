//! Transactional history writer.
//!
//! A [`Transaction`] records file edits against the tip of one branch and
//! turns them into exactly one new commit. The resulting tree is built from
//! objects alone (the base tree overlaid with the edits), and the branch is
//! moved with a compare-and-swap against the tip observed at `begin`, so a
//! concurrent writer makes `commit` fail instead of being overwritten.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::{DeployError, ObjectId, Result};
use crate::repository::{EntryKind, HistoryBackend, RefUpdate, TreeEntry};
use crate::utils::path::{is_within, normalize_tree_path};

/// Content scheduled for a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingFile {
    /// New bytes, written as a blob at commit time
    Content(Vec<u8>),
    /// An existing blob, carried over by id
    Object(ObjectId),
}

/// Where `copy_from` takes files from
pub enum TreeSource<'s, 'a, B: HistoryBackend> {
    /// The tree of an existing revision
    Revision(ObjectId),
    /// The tree another open transaction would commit
    Transaction(&'s Transaction<'a, B>),
}

/// An open unit of work against one branch
pub struct Transaction<'a, B: HistoryBackend> {
    backend: &'a B,
    branch: String,
    base: Option<ObjectId>,
    message: String,
    writes: BTreeMap<String, PendingFile>,
    deletes: BTreeSet<String>,
    wipe: bool,
}

impl<'a, B: HistoryBackend> Transaction<'a, B> {
    /// Capture the current tip of `branch` and open an empty edit set
    pub fn begin(backend: &'a B, branch: &str, message: &str) -> Result<Self> {
        if branch.trim().is_empty() {
            return Err(DeployError::InvalidArgument("branch name must not be empty".to_string()));
        }

        let base = backend.get_ref(branch)?;
        match &base {
            Some(tip) => log::debug!("transaction on {} based on {}", branch, tip.short()),
            None => log::debug!("transaction on unborn branch {}", branch),
        }

        Ok(Self {
            backend,
            branch: branch.to_string(),
            base,
            message: message.to_string(),
            writes: BTreeMap::new(),
            deletes: BTreeSet::new(),
            wipe: false,
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Tip observed at `begin`; `None` for an unborn branch
    pub fn base(&self) -> Option<&ObjectId> {
        self.base.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: &str) {
        self.message = message.to_string();
    }

    /// Schedule `content` at `path`, replacing any earlier edit of it
    pub fn add_file(&mut self, path: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        let path = normalize_tree_path(path)?;
        self.schedule(path, PendingFile::Content(content.into()));
        Ok(())
    }

    fn schedule(&mut self, path: String, file: PendingFile) {
        // a path cannot be both a file and a directory
        self.writes
            .retain(|existing, _| !is_within(existing, &path) && !is_within(&path, existing));
        self.writes.insert(path, file);
    }

    /// Delete a file or a whole directory
    ///
    /// Deleting exactly a path added earlier in this transaction only drops
    /// that add.
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let path = normalize_tree_path(path)?;
        if self.writes.remove(&path).is_some() {
            return Ok(());
        }
        self.writes.retain(|existing, _| !is_within(existing, &path));
        self.deletes.insert(path);
        Ok(())
    }

    /// Start from an empty tree instead of the base tree
    pub fn delete_all(&mut self) {
        self.writes.clear();
        self.deletes.clear();
        self.wipe = true;
    }

    /// Import files from another tree as ordinary adds
    ///
    /// `select` receives each source path and returns the destination path,
    /// or `None` to skip the file.
    pub fn copy_from<F>(&mut self, source: TreeSource<'_, '_, B>, mut select: F) -> Result<usize>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let files = match source {
            TreeSource::Revision(revision) => self
                .backend
                .read_tree(&revision)?
                .into_iter()
                .map(|(path, id)| (path, PendingFile::Object(id)))
                .collect(),
            TreeSource::Transaction(other) => other.resulting_files()?,
        };

        let mut copied = 0;
        for (path, file) in files {
            if let Some(destination) = select(&path) {
                let destination = normalize_tree_path(&destination)?;
                self.schedule(destination, file);
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Content `path` will have once committed
    pub fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_tree_path(path)?;
        match self.writes.get(&path) {
            Some(PendingFile::Content(content)) => return Ok(Some(content.clone())),
            Some(PendingFile::Object(id)) => return Ok(Some(self.backend.read_blob(id)?)),
            None => {}
        }

        if self.wipe || self.deletes.iter().any(|d| is_within(&path, d)) {
            return Ok(None);
        }
        match &self.base {
            Some(base) => self.backend.read_file(base, &path),
            None => Ok(None),
        }
    }

    /// Every file of the tree this transaction would commit
    fn resulting_files(&self) -> Result<BTreeMap<String, PendingFile>> {
        let mut files: BTreeMap<String, PendingFile> = match (&self.base, self.wipe) {
            (Some(base), false) => self
                .backend
                .read_tree(base)?
                .into_iter()
                .map(|(path, id)| (path, PendingFile::Object(id)))
                .collect(),
            _ => BTreeMap::new(),
        };

        files.retain(|path, _| !self.deletes.iter().any(|d| is_within(path, d)));
        for (path, file) in &self.writes {
            files.retain(|existing, _| !is_within(existing, path) && !is_within(path, existing));
            files.insert(path.clone(), file.clone());
        }
        Ok(files)
    }

    /// Write the tree and commit, then move the branch if nobody else did
    pub fn commit(self) -> Result<ObjectId> {
        let current = self.backend.get_ref(&self.branch)?;
        if current != self.base {
            return Err(DeployError::concurrent_update(&self.branch, self.base, current));
        }

        let mut root = Directory::default();
        for (path, file) in self.resulting_files()? {
            let id = match file {
                PendingFile::Content(content) => self.backend.write_blob(&content)?,
                PendingFile::Object(id) => id,
            };
            root.insert(&path, id);
        }

        let tree = root.write(self.backend)?;
        let commit = self
            .backend
            .write_commit(&tree, self.base.as_ref(), &self.message)?;

        match self.backend.update_ref(&self.branch, self.base.as_ref(), &commit)? {
            RefUpdate::Updated => {
                log::info!("committed {} to {}", commit.short(), self.branch);
                Ok(commit)
            }
            RefUpdate::Stale => {
                let found = self.backend.get_ref(&self.branch)?;
                Err(DeployError::concurrent_update(&self.branch, self.base, found))
            }
        }
    }

    /// Discard the transaction; no object or ref is touched
    pub fn abort(self) {
        log::debug!("discarding transaction on {}", self.branch);
    }
}

/// Directory skeleton assembled from flat paths, written bottom-up
#[derive(Default)]
struct Directory {
    files: BTreeMap<String, ObjectId>,
    dirs: BTreeMap<String, Directory>,
}

impl Directory {
    fn insert(&mut self, path: &str, id: ObjectId) {
        match path.split_once('/') {
            Some((dir, rest)) => self.dirs.entry(dir.to_string()).or_default().insert(rest, id),
            None => {
                self.files.insert(path.to_string(), id);
            }
        }
    }

    fn write<B: HistoryBackend>(&self, backend: &B) -> Result<ObjectId> {
        let mut entries: Vec<TreeEntry> = self
            .files
            .iter()
            .map(|(name, id)| TreeEntry {
                name: name.clone(),
                kind: EntryKind::Blob,
                id: *id,
            })
            .collect();

        for (name, dir) in &self.dirs {
            entries.push(TreeEntry {
                name: name.clone(),
                kind: EntryKind::Tree,
                id: dir.write(backend)?,
            });
        }

        backend.write_tree(&entries)
    }
}

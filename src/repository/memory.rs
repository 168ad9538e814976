use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{DeployError, ObjectId, ObjectType, Result};
use crate::repository::{sort_entries, Ancestry, EntryKind, HistoryBackend, RefUpdate, TreeEntry};

/// Fixed identity so identical commits hash identically
const SIGNATURE: &str = "docver <docver@localhost> 0 +0000";

#[derive(Debug, Clone)]
enum StoredObject {
    Blob(Vec<u8>),
    Tree(Vec<TreeEntry>),
    Commit {
        tree: ObjectId,
        parent: Option<ObjectId>,
    },
}

type ObjectDb = Arc<Mutex<HashMap<ObjectId, StoredObject>>>;

/// Content-addressed repository held entirely in memory
///
/// Object ids are computed exactly as git computes them, so identical
/// content is stored once. Remotes are other `MemoryBackend`s; fetching
/// copies their branch tip into `refs/remotes/<remote>/<branch>`.
pub struct MemoryBackend {
    objects: ObjectDb,
    refs: Mutex<HashMap<String, ObjectId>>,
    remotes: Mutex<HashMap<String, Arc<MemoryBackend>>>,
    fail_fetch: Mutex<bool>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            refs: Mutex::new(HashMap::new()),
            remotes: Mutex::new(HashMap::new()),
            fail_fetch: Mutex::new(false),
        }
    }

    /// Create a repository that tracks `remote` under `name`, sharing its objects
    pub fn cloned_from(name: &str, remote: Arc<MemoryBackend>) -> Self {
        let backend = Self {
            objects: Arc::clone(&remote.objects),
            ..Self::new()
        };
        backend.add_remote(name, remote);
        backend
    }

    /// Register a remote
    pub fn add_remote(&self, name: &str, remote: Arc<MemoryBackend>) {
        self.remotes.lock().insert(name.to_string(), remote);
    }

    /// Make every subsequent fetch fail (or succeed again)
    pub fn set_fetch_failure(&self, fail: bool) {
        *self.fail_fetch.lock() = fail;
    }

    /// Force a local branch to a revision, bypassing compare-and-swap
    pub fn force_ref(&self, branch: &str, id: ObjectId) {
        self.refs.lock().insert(local_ref(branch), id);
    }

    /// Number of distinct objects stored
    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    /// Tree id of a commit
    pub fn commit_tree(&self, commit: &ObjectId) -> Result<ObjectId> {
        match self.objects.lock().get(commit) {
            Some(StoredObject::Commit { tree, .. }) => Ok(*tree),
            _ => Err(DeployError::Backend(format!("{} is not a commit", commit))),
        }
    }

    /// Parent of a commit
    pub fn commit_parent(&self, commit: &ObjectId) -> Result<Option<ObjectId>> {
        match self.objects.lock().get(commit) {
            Some(StoredObject::Commit { parent, .. }) => Ok(*parent),
            _ => Err(DeployError::Backend(format!("{} is not a commit", commit))),
        }
    }

    fn store(&self, object_type: ObjectType, raw: &[u8], object: StoredObject) -> ObjectId {
        let id = ObjectId::compute(object_type, raw);
        self.objects.lock().entry(id).or_insert(object);
        id
    }

    fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
        let mut current = self.commit_parent(descendant)?;
        while let Some(id) = current {
            if id == *ancestor {
                return Ok(true);
            }
            current = self.commit_parent(&id)?;
        }
        Ok(false)
    }

    fn flatten(&self, tree: &ObjectId, prefix: &str, out: &mut BTreeMap<String, ObjectId>) -> Result<()> {
        let entries = match self.objects.lock().get(tree) {
            Some(StoredObject::Tree(entries)) => entries.clone(),
            _ => return Err(DeployError::Backend(format!("{} is not a tree", tree))),
        };

        for entry in entries {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", prefix, entry.name)
            };
            match entry.kind {
                EntryKind::Blob => {
                    out.insert(path, entry.id);
                }
                EntryKind::Tree => self.flatten(&entry.id, &path, out)?,
            }
        }
        Ok(())
    }
}

fn local_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

fn remote_ref(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{}/{}", remote, branch)
}

impl HistoryBackend for MemoryBackend {
    fn get_ref(&self, branch: &str) -> Result<Option<ObjectId>> {
        Ok(self.refs.lock().get(&local_ref(branch)).copied())
    }

    fn get_remote_ref(&self, remote: &str, branch: &str) -> Result<Option<ObjectId>> {
        Ok(self.refs.lock().get(&remote_ref(remote, branch)).copied())
    }

    fn has_remote(&self, remote: &str) -> Result<bool> {
        Ok(self.remotes.lock().contains_key(remote))
    }

    fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        let network_err = |reason: &str| DeployError::Network {
            remote: remote.to_string(),
            branch: branch.to_string(),
            reason: reason.to_string(),
        };

        if *self.fail_fetch.lock() {
            return Err(network_err("remote unreachable"));
        }
        let upstream = self
            .remotes
            .lock()
            .get(remote)
            .cloned()
            .ok_or_else(|| network_err("no such remote"))?;

        if !Arc::ptr_eq(&upstream.objects, &self.objects) {
            let theirs = upstream.objects.lock().clone();
            self.objects.lock().extend(theirs);
        }

        let tip = upstream.get_ref(branch)?;
        let mut refs = self.refs.lock();
        match tip {
            Some(id) => {
                refs.insert(remote_ref(remote, branch), id);
            }
            None => {
                refs.remove(&remote_ref(remote, branch));
            }
        }
        Ok(())
    }

    fn ancestry(&self, a: &ObjectId, b: &ObjectId) -> Result<Ancestry> {
        if a == b {
            Ok(Ancestry::Equal)
        } else if self.is_ancestor(a, b)? {
            Ok(Ancestry::AncestorOf)
        } else if self.is_ancestor(b, a)? {
            Ok(Ancestry::DescendantOf)
        } else {
            Ok(Ancestry::Unrelated)
        }
    }

    fn read_tree(&self, revision: &ObjectId) -> Result<BTreeMap<String, ObjectId>> {
        let tree = self.commit_tree(revision)?;
        let mut files = BTreeMap::new();
        self.flatten(&tree, "", &mut files)?;
        Ok(files)
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        match self.objects.lock().get(id) {
            Some(StoredObject::Blob(data)) => Ok(data.clone()),
            _ => Err(DeployError::Backend(format!("{} is not a blob", id))),
        }
    }

    fn write_blob(&self, content: &[u8]) -> Result<ObjectId> {
        Ok(self.store(ObjectType::Blob, content, StoredObject::Blob(content.to_vec())))
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId> {
        let sorted = sort_entries(entries);
        let mut raw = Vec::new();
        for entry in &sorted {
            let mode = match entry.kind {
                EntryKind::Blob => "100644",
                EntryKind::Tree => "40000",
            };
            raw.extend_from_slice(format!("{} {}\0", mode, entry.name).as_bytes());
            raw.extend_from_slice(entry.id.as_bytes());
        }
        Ok(self.store(ObjectType::Tree, &raw, StoredObject::Tree(sorted)))
    }

    fn write_commit(&self, tree: &ObjectId, parent: Option<&ObjectId>, message: &str) -> Result<ObjectId> {
        let mut raw = format!("tree {}\n", tree);
        if let Some(parent) = parent {
            raw.push_str(&format!("parent {}\n", parent));
        }
        raw.push_str(&format!("author {}\ncommitter {}\n\n{}", SIGNATURE, SIGNATURE, message));

        let object = StoredObject::Commit {
            tree: *tree,
            parent: parent.copied(),
        };
        Ok(self.store(ObjectType::Commit, raw.as_bytes(), object))
    }

    fn update_ref(&self, branch: &str, expected: Option<&ObjectId>, new: &ObjectId) -> Result<RefUpdate> {
        let mut refs = self.refs.lock();
        let name = local_ref(branch);
        if refs.get(&name) != expected {
            return Ok(RefUpdate::Stale);
        }
        refs.insert(name, *new);
        Ok(RefUpdate::Updated)
    }
}

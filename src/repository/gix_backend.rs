use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;

use gix::objs::tree::EntryMode;
use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit, RefLog};
use gix::refs::{FullName, Target};

use crate::core::{backend_err, CommitterConfig, DeployError, ObjectId, Result};
use crate::repository::{sort_entries, Ancestry, EntryKind, HistoryBackend, RefUpdate, TreeEntry};

/// History backend over a git repository, driven through gitoxide
///
/// Objects and refs are read and written directly in the object database;
/// the working tree and index are never consulted. Fetching shells out to
/// `git` since network transports are not part of this gix build.
pub struct GixBackend {
    repo: gix::Repository,
    committer: CommitterConfig,
}

fn to_gix(id: &ObjectId) -> gix::ObjectId {
    gix::ObjectId::from(*id.as_bytes())
}

fn from_gix(id: &gix::oid) -> Result<ObjectId> {
    ObjectId::from_bytes(id.as_bytes())
}

fn local_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

fn remote_ref(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{}/{}", remote, branch)
}

impl GixBackend {
    /// Open the repository at `path`
    pub fn open(path: impl AsRef<Path>, committer: CommitterConfig) -> Result<Self> {
        let path = path.as_ref();
        let repo = gix::open(path)
            .map_err(|e| backend_err(&format!("Failed to open repository at {}", path.display()), e))?;
        Ok(Self { repo, committer })
    }

    /// Find the repository containing `path`
    pub fn discover(path: impl AsRef<Path>, committer: CommitterConfig) -> Result<Self> {
        let path = path.as_ref();
        let repo = gix::discover(path)
            .map_err(|e| backend_err(&format!("Not a git repository: {}", path.display()), e))?;
        log::debug!("using repository at {}", repo.git_dir().display());
        Ok(Self { repo, committer })
    }

    pub fn git_dir(&self) -> &Path {
        self.repo.git_dir()
    }

    fn find_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let reference = self
            .repo
            .try_find_reference(name)
            .map_err(|e| backend_err(&format!("Failed to read {}", name), e))?;

        match reference {
            Some(mut reference) => {
                let id = reference
                    .peel_to_id_in_place()
                    .map_err(|e| backend_err(&format!("Failed to resolve {}", name), e))?;
                Ok(Some(from_gix(&id)?))
            }
            None => Ok(None),
        }
    }

    fn find_commit(&self, id: gix::ObjectId) -> Result<gix::Commit<'_>> {
        self.repo
            .find_object(id)
            .map_err(|e| backend_err(&format!("Failed to find {}", id), e))?
            .try_into_commit()
            .map_err(|e| backend_err(&format!("{} is not a commit", id), e))
    }

    fn is_ancestor(&self, ancestor: gix::ObjectId, descendant: gix::ObjectId) -> Result<bool> {
        let mut queue = VecDeque::from([descendant]);
        let mut seen = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if id == ancestor {
                return Ok(true);
            }
            if !seen.insert(id) {
                continue;
            }
            let commit = self.find_commit(id)?;
            queue.extend(commit.parent_ids().map(|parent| parent.detach()));
        }
        Ok(false)
    }

    fn flatten(&self, tree: gix::ObjectId, prefix: &str, out: &mut BTreeMap<String, ObjectId>) -> Result<()> {
        let tree = self
            .repo
            .find_object(tree)
            .map_err(|e| backend_err(&format!("Failed to find tree {}", tree), e))?
            .try_into_tree()
            .map_err(|e| backend_err("Expected a tree", e))?;

        let entries: Vec<(EntryMode, String, gix::ObjectId)> = tree
            .decode()
            .map_err(|e| backend_err("Failed to decode tree", e))?
            .entries
            .iter()
            .map(|entry| (entry.mode, entry.filename.to_string(), entry.oid.to_owned()))
            .collect();

        for (mode, name, id) in entries {
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            match mode {
                EntryMode::Tree => self.flatten(id, &path, out)?,
                EntryMode::Blob | EntryMode::BlobExecutable | EntryMode::Link => {
                    out.insert(path, from_gix(&id)?);
                }
                EntryMode::Commit => log::debug!("skipping submodule entry {}", path),
            }
        }
        Ok(())
    }

    fn signature(&self) -> gix::actor::Signature {
        gix::actor::Signature {
            name: self.committer.name.as_str().into(),
            email: self.committer.email.as_str().into(),
            time: gix::date::Time::now_local_or_utc(),
        }
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir")
            .arg(PathBuf::from(self.git_dir()))
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }
}

impl HistoryBackend for GixBackend {
    fn get_ref(&self, branch: &str) -> Result<Option<ObjectId>> {
        self.find_ref(&local_ref(branch))
    }

    fn get_remote_ref(&self, remote: &str, branch: &str) -> Result<Option<ObjectId>> {
        self.find_ref(&remote_ref(remote, branch))
    }

    fn has_remote(&self, remote: &str) -> Result<bool> {
        Ok(self.repo.find_remote(remote).is_ok())
    }

    fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        let network_err = |reason: String| DeployError::Network {
            remote: remote.to_string(),
            branch: branch.to_string(),
            reason,
        };
        let tracking = remote_ref(remote, branch);

        let listing = self
            .git()
            .args(["ls-remote", "--exit-code", remote, local_ref(branch).as_str()])
            .output()
            .map_err(|e| network_err(format!("failed to run git: {}", e)))?;

        match listing.status.code() {
            Some(0) => {}
            // the remote has no such branch
            Some(2) => {
                if self.find_ref(&tracking)?.is_some() {
                    log::debug!("{} has no {}, dropping {}", remote, branch, tracking);
                    let output = self
                        .git()
                        .args(["update-ref", "-d", tracking.as_str()])
                        .output()
                        .map_err(|e| backend_err(&format!("failed to delete {}", tracking), e))?;
                    if !output.status.success() {
                        return Err(backend_err(
                            &format!("failed to delete {}", tracking),
                            String::from_utf8_lossy(&output.stderr).trim(),
                        ));
                    }
                }
                return Ok(());
            }
            _ => return Err(network_err(String::from_utf8_lossy(&listing.stderr).trim().to_string())),
        }

        log::info!("fetching {} from {}", branch, remote);
        let refspec = format!("+{}:{}", local_ref(branch), tracking);
        let output = self
            .git()
            .args(["fetch", "--quiet", remote, refspec.as_str()])
            .output()
            .map_err(|e| network_err(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(network_err(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(())
    }

    fn ancestry(&self, a: &ObjectId, b: &ObjectId) -> Result<Ancestry> {
        let (a, b) = (to_gix(a), to_gix(b));
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
        let tree = self
            .find_commit(to_gix(revision))?
            .tree_id()
            .map_err(|e| backend_err(&format!("Failed to read tree of {}", revision), e))?
            .detach();

        let mut files = BTreeMap::new();
        self.flatten(tree, "", &mut files)?;
        Ok(files)
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let object = self
            .repo
            .find_object(to_gix(id))
            .map_err(|e| backend_err(&format!("Failed to find blob {}", id), e))?;
        Ok(object.detach().data)
    }

    fn write_blob(&self, content: &[u8]) -> Result<ObjectId> {
        let blob = gix::objs::Blob {
            data: content.to_vec(),
        };
        let id = self
            .repo
            .write_object(&blob)
            .map_err(|e| backend_err("Failed to write blob", e))?;
        from_gix(&id)
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId> {
        let tree = gix::objs::Tree {
            entries: sort_entries(entries)
                .into_iter()
                .map(|entry| gix::objs::tree::Entry {
                    mode: match entry.kind {
                        EntryKind::Blob => EntryMode::Blob,
                        EntryKind::Tree => EntryMode::Tree,
                    },
                    filename: entry.name.into(),
                    oid: to_gix(&entry.id),
                })
                .collect(),
        };
        let id = self
            .repo
            .write_object(&tree)
            .map_err(|e| backend_err("Failed to write tree", e))?;
        from_gix(&id)
    }

    fn write_commit(&self, tree: &ObjectId, parent: Option<&ObjectId>, message: &str) -> Result<ObjectId> {
        let signature = self.signature();
        let mut message = message.to_string();
        if !message.ends_with('\n') {
            message.push('\n');
        }

        let commit = gix::objs::Commit {
            tree: to_gix(tree),
            parents: parent.map(to_gix).into_iter().collect(),
            author: signature.clone(),
            committer: signature,
            encoding: None,
            message: message.into(),
            extra_headers: Vec::new(),
        };
        let id = self
            .repo
            .write_object(&commit)
            .map_err(|e| backend_err("Failed to write commit", e))?;
        from_gix(&id)
    }

    fn update_ref(&self, branch: &str, expected: Option<&ObjectId>, new: &ObjectId) -> Result<RefUpdate> {
        let full_name = local_ref(branch);
        let name: FullName = full_name
            .as_str()
            .try_into()
            .map_err(|e| DeployError::InvalidArgument(format!("invalid branch name '{}': {}", branch, e)))?;

        let previous = match expected {
            Some(id) => PreviousValue::MustExistAndMatch(Target::Peeled(to_gix(id))),
            None => PreviousValue::MustNotExist,
        };
        let edit = RefEdit {
            change: Change::Update {
                log: LogChange {
                    mode: RefLog::AndReference,
                    force_create_reflog: false,
                    message: format!("docver: update {} to {}", branch, new.short()).into(),
                },
                expected: previous,
                new: Target::Peeled(to_gix(new)),
            },
            name,
            deref: false,
        };

        let signature = self.signature();
        match self.repo.edit_references_as(Some(edit), Some(signature.to_ref())) {
            Ok(_) => Ok(RefUpdate::Updated),
            Err(err) => {
                // a lost race and a broken store surface the same error type
                let current = self.get_ref(branch)?;
                if current.as_ref() != expected {
                    log::debug!("{} moved to {:?} under us", full_name, current);
                    Ok(RefUpdate::Stale)
                } else {
                    Err(backend_err(&format!("Failed to update {}", full_name), err))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Transaction;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(output.status.success(), "git {:?} failed: {}", args, String::from_utf8_lossy(&output.stderr));
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    fn init_repo() -> (TempDir, GixBackend) {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        let backend = GixBackend::open(dir.path(), CommitterConfig::default()).unwrap();
        (dir, backend)
    }

    #[test]
    fn commits_without_touching_the_worktree() {
        let (dir, backend) = init_repo();

        let mut tx = Transaction::begin(&backend, "gh-pages", "Deployed 1.0").unwrap();
        tx.add_file("1.0/index.html", "<h1>1.0</h1>").unwrap();
        tx.add_file("versions.json", "[]").unwrap();
        let rev = tx.commit().unwrap();

        assert_eq!(git(dir.path(), &["rev-parse", "refs/heads/gh-pages"]), rev.to_hex());
        assert_eq!(git(dir.path(), &["show", "gh-pages:1.0/index.html"]), "<h1>1.0</h1>");
        assert_eq!(git(dir.path(), &["log", "-1", "--format=%s", "gh-pages"]), "Deployed 1.0");
        // the worktree only ever contains .git
        let names: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, [std::ffi::OsString::from(".git")]);
        git(dir.path(), &["fsck", "--strict"]);
    }

    #[test]
    fn reads_back_what_git_wrote() {
        let (dir, backend) = init_repo();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["-c", "user.name=t", "-c", "user.email=t@t", "commit", "--quiet", "-m", "seed"]);
        let head: ObjectId = git(dir.path(), &["rev-parse", "HEAD"]).parse().unwrap();

        let files = backend.read_tree(&head).unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), ["b.txt", "sub/a.txt"]);
        assert_eq!(backend.read_file(&head, "sub/a.txt").unwrap(), Some(b"alpha".to_vec()));
    }

    #[test]
    fn stale_expectations_do_not_move_the_ref() {
        let (_dir, backend) = init_repo();
        let first = {
            let mut tx = Transaction::begin(&backend, "gh-pages", "one").unwrap();
            tx.add_file("a", "1").unwrap();
            tx.commit().unwrap()
        };
        let tree = backend.write_tree(&[]).unwrap();
        let orphan = backend.write_commit(&tree, None, "orphan").unwrap();

        assert_eq!(backend.update_ref("gh-pages", None, &orphan).unwrap(), RefUpdate::Stale);
        assert_eq!(backend.update_ref("gh-pages", Some(&orphan), &orphan).unwrap(), RefUpdate::Stale);
        assert_eq!(backend.get_ref("gh-pages").unwrap(), Some(first));
        assert_eq!(backend.ancestry(&first, &orphan).unwrap(), Ancestry::Unrelated);
    }

    #[test]
    fn fetch_and_classify_against_a_real_remote() {
        let (origin_dir, origin) = init_repo();
        let base = {
            let mut tx = Transaction::begin(&origin, "gh-pages", "base").unwrap();
            tx.add_file("versions.json", "[]").unwrap();
            tx.commit().unwrap()
        };

        let (clone_dir, clone) = init_repo();
        let origin_path = origin_dir.path().to_str().unwrap();
        git(clone_dir.path(), &["remote", "add", "origin", origin_path]);
        assert!(clone.has_remote("origin").unwrap());
        assert!(!clone.has_remote("upstream").unwrap());

        clone.fetch("origin", "gh-pages").unwrap();
        assert_eq!(clone.get_remote_ref("origin", "gh-pages").unwrap(), Some(base));

        // a branch the remote lacks is not an error
        clone.fetch("origin", "missing").unwrap();
        assert_eq!(clone.get_remote_ref("origin", "missing").unwrap(), None);

        let next = {
            let mut tx = Transaction::begin(&origin, "gh-pages", "next").unwrap();
            tx.add_file("file.txt", "more").unwrap();
            tx.commit().unwrap()
        };
        clone.fetch("origin", "gh-pages").unwrap();
        assert_eq!(clone.ancestry(&base, &next).unwrap(), Ancestry::AncestorOf);
        assert_eq!(clone.ancestry(&next, &base).unwrap(), Ancestry::DescendantOf);

        // once the remote drops the branch, so does the tracking ref
        git(origin_dir.path(), &["update-ref", "-d", "refs/heads/gh-pages"]);
        clone.fetch("origin", "gh-pages").unwrap();
        assert_eq!(clone.get_remote_ref("origin", "gh-pages").unwrap(), None);

        git(clone_dir.path(), &["remote", "set-url", "origin", "/nonexistent/repo"]);
        assert!(matches!(clone.fetch("origin", "gh-pages"), Err(DeployError::Network { .. })));
    }
}

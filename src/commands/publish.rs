use std::collections::BTreeMap;

use crate::commands::{Deployer, OperationOptions, Outcome};
use crate::core::{ObjectId, Result};
use crate::repository::{HistoryBackend, Transaction, TreeSource};
use crate::utils::path::join_tree_path;

impl<'a, B: HistoryBackend> Deployer<'a, B> {
    /// Publish `files` as version `id`, replacing whatever was there before
    ///
    /// Paths in `files` are relative to the version directory. Aliases are
    /// claimed for this version; with `alias_copies` each alias directory
    /// receives a copy of the files, otherwise alias directories are removed.
    pub fn publish(
        &self,
        id: &str,
        title: Option<&str>,
        aliases: &[String],
        files: &BTreeMap<String, Vec<u8>>,
        options: &OperationOptions,
    ) -> Result<Outcome<ObjectId>> {
        self.check_name("version", id)?;
        for alias in aliases {
            self.check_name("alias", alias)?;
        }

        let (sync, warnings) = self.prepare(options, false)?;

        let mut message = format!("Deployed {}", id);
        let prefix = self.config.tree_prefix();
        if !prefix.is_empty() {
            message.push_str(&format!(" in {}", prefix));
        }
        let mut tx = self.begin(options.message_or(message))?;

        let mut versions = self.load(&tx)?;
        let entry = versions.add(id, title, aliases).clone();

        let version_dir = self.config.version_dir(id);
        tx.delete_file(&version_dir)?;
        for (path, content) in files {
            tx.add_file(&join_tree_path(&version_dir, path), content.clone())?;
        }

        for alias in &entry.aliases {
            tx.delete_file(&self.config.version_dir(alias))?;
        }
        if self.config.alias_copies && !entry.aliases.is_empty() {
            let mut staged = Transaction::begin(self.backend, &self.config.branch, "")?;
            staged.delete_all();
            for (path, content) in files {
                staged.add_file(path, content.clone())?;
            }
            for alias in &entry.aliases {
                let alias_dir = self.config.version_dir(alias);
                let copied = tx.copy_from(TreeSource::Transaction(&staged), |path| {
                    Some(join_tree_path(&alias_dir, path))
                })?;
                log::debug!("copied {} files of {} to {}", copied, id, alias_dir);
            }
            staged.abort();
        }

        self.store(&mut tx, &versions)?;
        let rev = tx.commit()?;
        log::info!("published {} as {}", id, rev.short());

        Ok(Outcome {
            value: rev,
            sync,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commands::tests::{files, tree_paths};
    use crate::core::{DeployConfig, DeployError};
    use crate::repository::{MemoryBackend, RemoteStatus};

    fn aliases(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn publishes_files_and_registry_in_one_commit() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let deployer = Deployer::new(&backend, &config);

        let docs = files(&[("index.html", "<h1>1.0</h1>"), ("css/site.css", "body {}")]);
        let rev = deployer
            .publish("1.0", None, &aliases(&["latest"]), &docs, &OperationOptions::default())
            .unwrap()
            .value;

        assert_eq!(backend.get_ref("gh-pages").unwrap(), Some(rev));
        assert_eq!(backend.commit_parent(&rev).unwrap(), None);
        assert_eq!(tree_paths(&backend, &rev), ["1.0/css/site.css", "1.0/index.html", "versions.json"]);
        assert_eq!(
            backend.read_file(&rev, "versions.json").unwrap().unwrap(),
            br#"[{"version":"1.0","title":"1.0","aliases":["latest"]}]"#.to_vec()
        );
    }

    #[test]
    fn republishing_replaces_the_version_directory() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let deployer = Deployer::new(&backend, &config);
        let options = OperationOptions::default();

        deployer
            .publish("1.0", None, &[], &files(&[("old.html", "old")]), &options)
            .unwrap();
        deployer
            .publish("2.0", None, &[], &files(&[("index.html", "2")]), &options)
            .unwrap();
        let rev = deployer
            .publish("1.0", Some("One"), &[], &files(&[("new.html", "new")]), &options)
            .unwrap()
            .value;

        assert_eq!(tree_paths(&backend, &rev), ["1.0/new.html", "2.0/index.html", "versions.json"]);
        let listed = deployer.list(&options).unwrap().value;
        assert_eq!(listed[1].title, "One");
    }

    #[test]
    fn identical_publish_keeps_tree_but_advances_ref() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let deployer = Deployer::new(&backend, &config);
        let docs = files(&[("index.html", "same")]);
        let options = OperationOptions::default();

        let first = deployer.publish("1.0", None, &[], &docs, &options).unwrap().value;
        let second = deployer.publish("1.0", None, &[], &docs, &options).unwrap().value;

        assert_ne!(first, second);
        assert_eq!(backend.commit_parent(&second).unwrap(), Some(first));
        assert_eq!(backend.commit_tree(&first).unwrap(), backend.commit_tree(&second).unwrap());
    }

    #[test]
    fn moving_an_alias_rebuilds_its_copy() {
        let backend = MemoryBackend::new();
        let config = DeployConfig {
            alias_copies: true,
            ..DeployConfig::default()
        };
        let deployer = Deployer::new(&backend, &config);
        let options = OperationOptions::default();

        deployer
            .publish("1.0", None, &aliases(&["latest"]), &files(&[("index.html", "1"), ("old.html", "1")]), &options)
            .unwrap();
        let rev = deployer
            .publish("2.0", None, &aliases(&["latest"]), &files(&[("index.html", "2")]), &options)
            .unwrap()
            .value;

        assert_eq!(
            tree_paths(&backend, &rev),
            ["1.0/index.html", "1.0/old.html", "2.0/index.html", "latest/index.html", "versions.json"]
        );
        assert_eq!(backend.read_file(&rev, "latest/index.html").unwrap(), Some(b"2".to_vec()));
        let listed = deployer.list(&options).unwrap().value;
        assert!(listed[1].aliases.is_empty());
    }

    #[test]
    fn without_copies_alias_directories_are_cleared() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let deployer = Deployer::new(&backend, &config);
        let options = OperationOptions::default();

        // a directory left behind by an earlier copy
        let mut tx = Transaction::begin(&backend, "gh-pages", "seed").unwrap();
        tx.add_file("stable/index.html", "stale").unwrap();
        tx.commit().unwrap();

        let rev = deployer
            .publish("3.0", None, &aliases(&["stable"]), &files(&[("index.html", "3")]), &options)
            .unwrap()
            .value;
        assert_eq!(tree_paths(&backend, &rev), ["3.0/index.html", "versions.json"]);
    }

    #[test]
    fn publishes_under_deploy_prefix() {
        let backend = MemoryBackend::new();
        let config = DeployConfig {
            deploy_prefix: "docs/site".to_string(),
            ..DeployConfig::default()
        };
        let deployer = Deployer::new(&backend, &config);

        let rev = deployer
            .publish("1.0", None, &[], &files(&[("index.html", "1")]), &OperationOptions::default())
            .unwrap()
            .value;
        assert_eq!(tree_paths(&backend, &rev), ["docs/site/1.0/index.html", "docs/site/versions.json"]);
    }

    #[test]
    fn custom_message_and_invalid_names() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let deployer = Deployer::new(&backend, &config);
        let docs = files(&[("index.html", "1")]);

        let options = OperationOptions {
            message: Some("release docs".to_string()),
            ..OperationOptions::default()
        };
        deployer.publish("1.0", None, &[], &docs, &options).unwrap();

        assert!(matches!(
            deployer.publish("../x", None, &[], &docs, &options),
            Err(DeployError::InvalidArgument(_))
        ));
        assert!(matches!(
            deployer.publish("1.1", None, &aliases(&["a/b"]), &docs, &options),
            Err(DeployError::InvalidArgument(_))
        ));
    }

    #[test]
    fn names_colliding_with_the_registry_are_rejected() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let deployer = Deployer::new(&backend, &config);
        let docs = files(&[("index.html", "1")]);
        let options = OperationOptions::default();
        let tip = deployer.publish("1.0", None, &[], &docs, &options).unwrap().value;

        assert!(matches!(
            deployer.publish("versions.json", None, &[], &docs, &options),
            Err(DeployError::InvalidArgument(_))
        ));
        assert!(matches!(
            deployer.publish("1.1", None, &aliases(&["versions.json"]), &docs, &options),
            Err(DeployError::InvalidArgument(_))
        ));
        assert!(matches!(
            deployer.alias("1.0", &aliases(&["versions.json"]), &options),
            Err(DeployError::InvalidArgument(_))
        ));
        assert!(matches!(
            deployer.rename("1.0", "versions.json", &options),
            Err(DeployError::InvalidArgument(_))
        ));
        assert_eq!(backend.get_ref("gh-pages").unwrap(), Some(tip));
        assert_eq!(deployer.list(&options).unwrap().value.len(), 1);
    }

    #[test]
    fn unreachable_remote_blocks_writes() {
        let config = DeployConfig::default();
        let origin = Arc::new(MemoryBackend::new());
        let docs = files(&[("index.html", "1")]);
        let base = Deployer::new(&*origin, &config)
            .publish("1.0", None, &[], &docs, &OperationOptions::default())
            .unwrap()
            .value;

        let clone = MemoryBackend::cloned_from("origin", Arc::clone(&origin));
        clone.force_ref("gh-pages", base);
        clone.set_fetch_failure(true);
        let objects = clone.object_count();
        let deployer = Deployer::new(&clone, &config);
        let options = OperationOptions::default();

        assert!(matches!(
            deployer.publish("2.0", None, &[], &docs, &options),
            Err(DeployError::Network { .. })
        ));
        assert!(matches!(
            deployer.delete(&aliases(&["1.0"]), &options),
            Err(DeployError::Network { .. })
        ));
        assert_eq!(clone.get_ref("gh-pages").unwrap(), Some(base));
        assert_eq!(clone.object_count(), objects);

        // reads still fall back to the local branch
        let listed = deployer.list(&options).unwrap();
        assert_eq!(listed.value.len(), 1);
        assert_eq!(listed.warnings.len(), 1);
    }

    #[test]
    fn strict_divergence_writes_nothing() {
        let config = DeployConfig::default();
        let origin = Arc::new(MemoryBackend::new());
        let docs = files(&[("index.html", "1")]);
        let base = Deployer::new(&*origin, &config)
            .publish("1.0", None, &[], &docs, &OperationOptions::default())
            .unwrap()
            .value;

        let clone = MemoryBackend::cloned_from("origin", Arc::clone(&origin));
        clone.force_ref("gh-pages", base);
        Deployer::new(&*origin, &config)
            .publish("2.0", None, &[], &docs, &OperationOptions::default())
            .unwrap();
        let local = Deployer::new(&clone, &config)
            .publish("1.1", None, &[], &docs, &OperationOptions { ignore_remote_status: true, ..Default::default() })
            .unwrap()
            .value;
        let objects = clone.object_count();

        let strict = OperationOptions {
            strict: true,
            ..OperationOptions::default()
        };
        let err = Deployer::new(&clone, &config)
            .publish("3.0", None, &[], &docs, &strict)
            .unwrap_err();
        assert!(matches!(err, DeployError::DivergedHistory { .. }));
        assert_eq!(clone.get_ref("gh-pages").unwrap(), Some(local));
        assert_eq!(clone.object_count(), objects);

        let relaxed = Deployer::new(&clone, &config)
            .publish("3.0", None, &[], &docs, &OperationOptions::default())
            .unwrap();
        assert_eq!(relaxed.sync.map(|s| s.status), Some(RemoteStatus::Diverged));
        assert_eq!(relaxed.warnings, ["gh-pages has diverged from origin/gh-pages"]);
        assert_eq!(clone.commit_parent(&relaxed.value).unwrap(), Some(local));
    }

    #[test]
    fn behind_clone_publishes_on_top_of_remote() {
        let config = DeployConfig::default();
        let origin = Arc::new(MemoryBackend::new());
        let docs = files(&[("index.html", "1")]);
        let first = Deployer::new(&*origin, &config)
            .publish("1.0", None, &[], &docs, &OperationOptions::default())
            .unwrap()
            .value;
        let clone = MemoryBackend::cloned_from("origin", Arc::clone(&origin));
        clone.force_ref("gh-pages", first);
        let upstream = Deployer::new(&*origin, &config)
            .publish("2.0", None, &[], &docs, &OperationOptions::default())
            .unwrap()
            .value;

        let outcome = Deployer::new(&clone, &config)
            .publish("3.0", None, &[], &docs, &OperationOptions::default())
            .unwrap();
        assert_eq!(outcome.sync.map(|s| s.status), Some(RemoteStatus::Behind));
        assert_eq!(clone.commit_parent(&outcome.value).unwrap(), Some(upstream));
        assert_eq!(
            tree_paths(&clone, &outcome.value),
            ["1.0/index.html", "2.0/index.html", "3.0/index.html", "versions.json"]
        );
    }
}

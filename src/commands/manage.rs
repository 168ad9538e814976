use crate::commands::{relocate, Deployer, OperationOptions, Outcome};
use crate::core::{ObjectId, Result};
use crate::repository::{HistoryBackend, TreeSource};

impl<'a, B: HistoryBackend> Deployer<'a, B> {
    /// Remove versions, their directories and the directories of their aliases
    pub fn delete(&self, identifiers: &[String], options: &OperationOptions) -> Result<Outcome<ObjectId>> {
        let (sync, warnings) = self.prepare(options, false)?;
        let mut tx = self.begin(options.message_or(format!("Removed {}", identifiers.join(", "))))?;
        let mut versions = self.load(&tx)?;

        for identifier in identifiers {
            let entry = versions.remove(identifier)?;
            tx.delete_file(&self.config.version_dir(&entry.version))?;
            for alias in &entry.aliases {
                tx.delete_file(&self.config.version_dir(alias))?;
            }
        }

        self.store(&mut tx, &versions)?;
        let rev = tx.commit()?;
        Ok(Outcome {
            value: rev,
            sync,
            warnings,
        })
    }

    /// Point `aliases` at an already published version
    pub fn alias(&self, identifier: &str, aliases: &[String], options: &OperationOptions) -> Result<Outcome<ObjectId>> {
        for alias in aliases {
            self.check_name("alias", alias)?;
        }

        let (sync, warnings) = self.prepare(options, false)?;
        let mut tx = self.begin(String::new())?;
        let mut versions = self.load(&tx)?;

        let version = versions.find(identifier)?.version.clone();
        tx.set_message(&options.message_or(format!("Copied {} to {}", version, aliases.join(", "))));
        let entry = versions.add(&version, None, aliases).clone();

        for alias in aliases.iter().filter(|alias| entry.aliases.contains(*alias)) {
            if self.config.alias_copies {
                self.copy_alias_from_base(&mut tx, &version, alias)?;
            } else {
                tx.delete_file(&self.config.version_dir(alias))?;
            }
        }

        self.store(&mut tx, &versions)?;
        let rev = tx.commit()?;
        Ok(Outcome {
            value: rev,
            sync,
            warnings,
        })
    }

    /// Change the display title of a version
    pub fn retitle(&self, identifier: &str, title: &str, options: &OperationOptions) -> Result<Outcome<ObjectId>> {
        let (sync, warnings) = self.prepare(options, false)?;
        let mut tx = self.begin(String::new())?;
        let mut versions = self.load(&tx)?;

        let version = versions.set_title(identifier, title)?.version.clone();
        tx.set_message(&options.message_or(format!("Set title of {} to {}", version, title)));

        self.store(&mut tx, &versions)?;
        let rev = tx.commit()?;
        Ok(Outcome {
            value: rev,
            sync,
            warnings,
        })
    }

    /// Give a version a new id and move its directory along
    pub fn rename(&self, identifier: &str, new_id: &str, options: &OperationOptions) -> Result<Outcome<ObjectId>> {
        self.check_name("version", new_id)?;

        let (sync, warnings) = self.prepare(options, false)?;
        let mut tx = self.begin(String::new())?;
        let mut versions = self.load(&tx)?;

        let old_id = versions.find(identifier)?.version.clone();
        versions.rename(&old_id, new_id)?;
        tx.set_message(&options.message_or(format!("Renamed {} to {}", old_id, new_id)));

        if old_id != new_id {
            let from = self.config.version_dir(&old_id);
            let to = self.config.version_dir(new_id);
            tx.delete_file(&to)?;
            if let Some(base) = tx.base().copied() {
                let moved = tx.copy_from(TreeSource::Revision(base), |path| relocate(path, &from, &to))?;
                log::debug!("moved {} files from {} to {}", moved, from, to);
            }
            tx.delete_file(&from)?;
        }

        self.store(&mut tx, &versions)?;
        let rev = tx.commit()?;
        Ok(Outcome {
            value: rev,
            sync,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{files, tree_paths};
    use crate::core::{DeployConfig, DeployError};
    use crate::repository::MemoryBackend;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// 1.0 and 2.0 [latest], each with an index page
    fn published(backend: &MemoryBackend, config: &DeployConfig) -> ObjectId {
        let deployer = Deployer::new(backend, config);
        let options = OperationOptions::default();
        deployer
            .publish("1.0", None, &[], &files(&[("index.html", "1")]), &options)
            .unwrap();
        deployer
            .publish("2.0", None, &names(&["latest"]), &files(&[("index.html", "2")]), &options)
            .unwrap()
            .value
    }

    fn copying() -> DeployConfig {
        DeployConfig {
            alias_copies: true,
            ..DeployConfig::default()
        }
    }

    #[test]
    fn delete_removes_versions_and_alias_dirs() {
        let backend = MemoryBackend::new();
        let config = copying();
        published(&backend, &config);
        let deployer = Deployer::new(&backend, &config);

        let rev = deployer.delete(&names(&["latest"]), &OperationOptions::default()).unwrap().value;
        assert_eq!(tree_paths(&backend, &rev), ["1.0/index.html", "versions.json"]);
        let listed = deployer.list(&OperationOptions::default()).unwrap().value;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].version, "1.0");
    }

    #[test]
    fn delete_of_unknown_identifier_touches_nothing() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let tip = published(&backend, &config);

        let err = Deployer::new(&backend, &config)
            .delete(&names(&["1.0", "nonexist"]), &OperationOptions::default())
            .unwrap_err();
        assert!(matches!(err, DeployError::NotFound(id) if id == "nonexist"));
        assert_eq!(backend.get_ref("gh-pages").unwrap(), Some(tip));
    }

    #[test]
    fn alias_moves_and_copies_from_the_committed_version() {
        let backend = MemoryBackend::new();
        let config = copying();
        published(&backend, &config);
        let deployer = Deployer::new(&backend, &config);

        let rev = deployer
            .alias("1.0", &names(&["latest", "old"]), &OperationOptions::default())
            .unwrap()
            .value;
        assert_eq!(
            tree_paths(&backend, &rev),
            ["1.0/index.html", "2.0/index.html", "latest/index.html", "old/index.html", "versions.json"]
        );
        assert_eq!(backend.read_file(&rev, "latest/index.html").unwrap(), Some(b"1".to_vec()));

        let latest = deployer.resolve("latest", &OperationOptions::default()).unwrap().value;
        assert_eq!(latest.version, "1.0");
        assert_eq!(latest.aliases, ["latest", "old"]);
    }

    #[test]
    fn alias_of_unknown_version_fails() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let tip = published(&backend, &config);
        let err = Deployer::new(&backend, &config)
            .alias("9.9", &names(&["latest"]), &OperationOptions::default())
            .unwrap_err();
        assert!(matches!(err, DeployError::NotFound(_)));
        assert_eq!(backend.get_ref("gh-pages").unwrap(), Some(tip));
    }

    #[test]
    fn retitle_by_alias() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        published(&backend, &config);
        let deployer = Deployer::new(&backend, &config);

        deployer.retitle("latest", "2.0.1", &OperationOptions::default()).unwrap();
        let entry = deployer.resolve("2.0", &OperationOptions::default()).unwrap().value;
        assert_eq!(entry.title, "2.0.1");
    }

    #[test]
    fn rename_moves_the_directory() {
        let backend = MemoryBackend::new();
        let config = copying();
        published(&backend, &config);
        let deployer = Deployer::new(&backend, &config);

        let rev = deployer.rename("2.0", "2.1", &OperationOptions::default()).unwrap().value;
        assert_eq!(
            tree_paths(&backend, &rev),
            ["1.0/index.html", "2.1/index.html", "latest/index.html", "versions.json"]
        );
        assert_eq!(backend.read_file(&rev, "2.1/index.html").unwrap(), Some(b"2".to_vec()));

        let latest = deployer.resolve("latest", &OperationOptions::default()).unwrap().value;
        assert_eq!(latest.version, "2.1");
        assert_eq!(latest.title, "2.1");
    }

    #[test]
    fn untidy_deploy_prefix_reads_and_renames() {
        let backend = MemoryBackend::new();
        let config = DeployConfig {
            deploy_prefix: "./docs//site/".to_string(),
            ..DeployConfig::default()
        };
        published(&backend, &config);
        let deployer = Deployer::new(&backend, &config);

        let listed = deployer.list(&OperationOptions::default()).unwrap().value;
        assert_eq!(listed.len(), 2);

        let rev = deployer.rename("1.0", "1.1", &OperationOptions::default()).unwrap().value;
        assert_eq!(
            tree_paths(&backend, &rev),
            ["docs/site/1.1/index.html", "docs/site/2.0/index.html", "docs/site/versions.json"]
        );
        assert_eq!(backend.read_file(&rev, "docs/site/1.1/index.html").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn rename_onto_existing_version_is_rejected() {
        let backend = MemoryBackend::new();
        let config = DeployConfig::default();
        let tip = published(&backend, &config);
        let err = Deployer::new(&backend, &config)
            .rename("2.0", "1.0", &OperationOptions::default())
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidArgument(_)));
        assert_eq!(backend.get_ref("gh-pages").unwrap(), Some(tip));
    }
}

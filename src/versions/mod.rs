//! The versions registry: which documentation versions are published, their
//! display titles, and which aliases (`latest`, `stable`, ...) point at them.
//!
//! Entries are kept in insertion order; presentation order is always derived
//! from [`compare::compare_versions`] (highest version first), with ties and
//! non-version identifiers keeping the order in which they were added.

pub mod compare;

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::{DeployError, Result};

pub use compare::{compare_versions, VersionKey};

/// One published version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: String,
    pub title: String,
    pub aliases: BTreeSet<String>,
}

impl VersionEntry {
    fn new(version: &str, title: Option<&str>) -> Self {
        Self {
            version: version.to_string(),
            title: title.unwrap_or(version).to_string(),
            aliases: BTreeSet::new(),
        }
    }

    /// Wire representation used by the persisted document and by listings
    pub fn info(&self) -> VersionInfo {
        VersionInfo {
            version: self.version.clone(),
            title: self.title.clone(),
            aliases: self.aliases.iter().cloned().collect(),
        }
    }
}

/// Serialized shape of an entry: `{"version", "title", "aliases"}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Ordered registry of version entries
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Versions {
    entries: Vec<VersionEntry>,
}

impl Versions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &VersionEntry> {
        self.entries.iter()
    }

    /// Entries by descending version precedence
    pub fn ordered(&self) -> Vec<&VersionEntry> {
        let mut ordered: Vec<&VersionEntry> = self.entries.iter().collect();
        // stable sort: equal keys keep insertion order
        ordered.sort_by(|a, b| compare_versions(&b.version, &a.version));
        ordered
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.version == identifier)
            .or_else(|| self.entries.iter().position(|e| e.aliases.contains(identifier)))
    }

    fn position_of_id(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.version == id)
    }

    /// Resolve a version id or alias
    pub fn find(&self, identifier: &str) -> Result<&VersionEntry> {
        self.position(identifier)
            .map(|i| &self.entries[i])
            .ok_or_else(|| DeployError::NotFound(identifier.to_string()))
    }

    /// Strip `alias` from whichever entry holds it, except `keep`
    fn release_alias(&mut self, alias: &str, keep: usize) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if i != keep && entry.aliases.remove(alias) {
                log::info!("moving alias '{}' away from {}", alias, entry.version);
            }
        }
    }

    /// Insert or update the entry for `id`, claiming `aliases` for it
    pub fn add<I, S>(&mut self, id: &str, title: Option<&str>, aliases: I) -> &VersionEntry
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = match self.position_of_id(id) {
            Some(index) => {
                if let Some(title) = title {
                    self.entries[index].title = title.to_string();
                }
                index
            }
            None => {
                self.entries.push(VersionEntry::new(id, title));
                let index = self.entries.len() - 1;
                // a new id takes its name back from any alias
                self.release_alias(id, index);
                index
            }
        };

        for alias in aliases {
            let alias = alias.as_ref();
            if alias == id {
                continue;
            }
            if self.position_of_id(alias).is_some() {
                log::warn!("ignoring alias '{}' for {}: it is already a version", alias, id);
                continue;
            }
            self.release_alias(alias, index);
            self.entries[index].aliases.insert(alias.to_string());
        }

        &self.entries[index]
    }

    /// Remove an entry by id or alias, freeing its aliases
    pub fn remove(&mut self, identifier: &str) -> Result<VersionEntry> {
        let index = self
            .position(identifier)
            .ok_or_else(|| DeployError::NotFound(identifier.to_string()))?;
        Ok(self.entries.remove(index))
    }

    /// Give an entry a new id, keeping its title (unless it was the old id) and aliases
    pub fn rename(&mut self, identifier: &str, new_id: &str) -> Result<&VersionEntry> {
        let index = self
            .position(identifier)
            .ok_or_else(|| DeployError::NotFound(identifier.to_string()))?;

        if new_id.is_empty() {
            return Err(DeployError::InvalidArgument("version id must not be empty".to_string()));
        }
        if let Some(other) = self.position_of_id(new_id) {
            if other != index {
                return Err(DeployError::InvalidArgument(format!(
                    "version '{}' already exists",
                    new_id
                )));
            }
        }

        for entry in self.entries.iter_mut() {
            entry.aliases.remove(new_id);
        }
        let entry = &mut self.entries[index];
        if entry.title == entry.version {
            entry.title = new_id.to_string();
        }
        entry.version = new_id.to_string();
        Ok(&self.entries[index])
    }

    /// Change the display title of an entry
    pub fn set_title(&mut self, identifier: &str, title: &str) -> Result<&VersionEntry> {
        let index = self
            .position(identifier)
            .ok_or_else(|| DeployError::NotFound(identifier.to_string()))?;
        self.entries[index].title = title.to_string();
        Ok(&self.entries[index])
    }

    /// Unbind aliases from an entry; unknown aliases are ignored
    pub fn remove_aliases<I, S>(&mut self, identifier: &str, aliases: I) -> Result<&VersionEntry>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = self
            .position(identifier)
            .ok_or_else(|| DeployError::NotFound(identifier.to_string()))?;
        for alias in aliases {
            self.entries[index].aliases.remove(alias.as_ref());
        }
        Ok(&self.entries[index])
    }

    /// Ordered wire representation
    pub fn infos(&self) -> Vec<VersionInfo> {
        self.ordered().into_iter().map(VersionEntry::info).collect()
    }

    /// Render the persisted document
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(&self.infos())
            .map_err(|e| DeployError::CorruptData(format!("failed to serialize versions: {}", e)))
    }

    /// Parse the persisted document; empty content is an empty registry
    pub fn deserialize(document: &str) -> Result<Self> {
        if document.trim().is_empty() {
            return Ok(Self::new());
        }

        let infos: Vec<VersionInfo> = serde_json::from_str(document)
            .map_err(|e| DeployError::CorruptData(e.to_string()))?;

        let ids: HashSet<&str> = infos.iter().map(|i| i.version.as_str()).collect();
        if ids.len() != infos.len() {
            return Err(DeployError::CorruptData("duplicate version ids".to_string()));
        }

        let mut seen_aliases = HashSet::new();
        let mut entries = Vec::with_capacity(infos.len());
        for info in &infos {
            if info.version.is_empty() {
                return Err(DeployError::CorruptData("empty version id".to_string()));
            }
            let mut aliases = BTreeSet::new();
            for alias in &info.aliases {
                if ids.contains(alias.as_str()) {
                    return Err(DeployError::CorruptData(format!(
                        "alias '{}' of {} is also a version",
                        alias, info.version
                    )));
                }
                if !seen_aliases.insert(alias.as_str()) {
                    return Err(DeployError::CorruptData(format!(
                        "alias '{}' is bound more than once",
                        alias
                    )));
                }
                aliases.insert(alias.clone());
            }
            entries.push(VersionEntry {
                version: info.version.clone(),
                title: info.title.clone(),
                aliases,
            });
        }

        Ok(Self { entries })
    }
}

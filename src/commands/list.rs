use crate::commands::{Deployer, OperationOptions, Outcome};
use crate::core::Result;
use crate::repository::HistoryBackend;
use crate::versions::VersionInfo;

impl<'a, B: HistoryBackend> Deployer<'a, B> {
    /// Every published version, highest first
    pub fn list(&self, options: &OperationOptions) -> Result<Outcome<Vec<VersionInfo>>> {
        let (sync, warnings) = self.prepare(options, true)?;
        let versions = self.read_versions()?;
        Ok(Outcome {
            value: versions.infos(),
            sync,
            warnings,
        })
    }

    /// The version an id or alias refers to
    pub fn resolve(&self, identifier: &str, options: &OperationOptions) -> Result<Outcome<VersionInfo>> {
        let (sync, warnings) = self.prepare(options, true)?;
        let versions = self.read_versions()?;
        let info = versions.find(identifier)?.info();
        Ok(Outcome {
            value: info,
            sync,
            warnings,
        })
    }
}

/// One line of the text listing: `"title" (version) [aliases]`, with the
/// title omitted when it equals the version
pub fn format_entry(info: &VersionInfo) -> String {
    let mut line = if info.title == info.version {
        info.version.clone()
    } else {
        format!("\"{}\" ({})", info.title, info.version)
    };

    if !info.aliases.is_empty() {
        let mut aliases: Vec<&str> = info.aliases.iter().map(String::as_str).collect();
        aliases.sort_unstable();
        line.push_str(&format!(" [{}]", aliases.join(", ")));
    }
    line
}

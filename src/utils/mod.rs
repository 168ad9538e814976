pub mod path;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::core::{DeployError, Result};

/// Read every file below `dir` into a map keyed by its `/`-separated relative path
pub fn read_dir_files(dir: impl AsRef<Path>) -> Result<BTreeMap<String, Vec<u8>>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(DeployError::InvalidArgument(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut files = BTreeMap::new();
    read_dir_recursive(dir, dir, &mut files)?;
    Ok(files)
}

fn read_dir_recursive(dir: &Path, base: &Path, files: &mut BTreeMap<String, Vec<u8>>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            read_dir_recursive(&path, base, files)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, fs::read(&path)?);
        }
    }

    Ok(())
}

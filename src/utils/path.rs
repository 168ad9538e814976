use crate::core::{DeployError, Result};

/// Normalize a path inside a tree: drop empty and "." components, reject
/// anything that would escape the root
pub fn normalize_tree_path(path: &str) -> Result<String> {
    let mut parts = Vec::new();

    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                return Err(DeployError::InvalidArgument(format!(
                    "path '{}' escapes the tree",
                    path
                )))
            }
            c => parts.push(c),
        }
    }

    if parts.is_empty() {
        return Err(DeployError::InvalidArgument(format!(
            "path '{}' does not name a file",
            path
        )));
    }

    Ok(parts.join("/"))
}

/// Join a (possibly empty) directory prefix and a relative path
pub fn join_tree_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// Whether `path` is `dir` itself or lies underneath it
pub fn is_within(path: &str, dir: &str) -> bool {
    path == dir
        || (path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/')
}

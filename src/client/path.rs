//! Path normalization for staged-writer operations.
//!
//! Paths address entries in the virtual working tree: slash-separated,
//! relative, with no `..` traversal. Blob paths are non-empty and never
//! end with `/`; tree paths may be empty, meaning the root.

use crate::errors::GitError;

/// Normalize a tree path: strip leading/trailing slashes, collapse empty
/// components, and reject `.`/`..` components. The empty string is the
/// root.
pub fn normalize_tree_path(path: &str) -> Result<String, GitError> {
    let mut components = Vec::new();
    for component in path.split('/') {
        match component {
            "" => continue,
            "." | ".." => {
                return Err(GitError::InvalidPath(format!(
                    "`{path}` contains a `{component}` component"
                )));
            }
            other => components.push(other),
        }
    }
    Ok(components.join("/"))
}

/// Normalize a blob path: tree-path rules, plus non-empty and no trailing
/// slash.
pub fn normalize_blob_path(path: &str) -> Result<String, GitError> {
    if path.len() > 1 && path.ends_with('/') {
        return Err(GitError::InvalidPath(format!(
            "blob path `{path}` must not end with `/`"
        )));
    }
    let normalized = normalize_tree_path(path)?;
    if normalized.is_empty() {
        return Err(GitError::InvalidPath("blob path is empty".to_string()));
    }
    Ok(normalized)
}

/// The parent directory of a normalized path; None for the root.
pub fn parent_dir(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""))
}

/// The final component of a normalized path.
pub fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Every ancestor directory of a normalized path, nearest first, ending
/// with the root ("").
pub fn ancestor_dirs(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = path.to_string();
    while let Some(parent) = parent_dir(&current) {
        let parent = parent.to_string();
        out.push(parent.clone());
        current = parent;
    }
    out
}

//! Path canonicalisation and repository-relative path helpers.
//!
//! Repository-relative paths use forward slashes, start with `/`, and never
//! contain `.` or `..` components. Canonicalisation here is purely lexical;
//! symlink resolution is the caller's business (via `std::fs::canonicalize`).

use std::path::Path;

/// Errors from path manipulation.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("bad path: {0}")]
    BadPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Lexically canonicalise a path: collapse repeated slashes, drop `.`
/// components, resolve `..` against earlier components.
///
/// A `..` that would escape the start of the path is an error. The result
/// preserves whether the input was absolute; it never ends in a slash
/// (unless it is exactly `/`).
pub fn canonpath(input: &str) -> Result<String, PathError> {
    let absolute = input.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for comp in input.split('/') {
        match comp {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return Err(PathError::BadPath(format!(
                        "path escapes its root: {input}"
                    )));
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        Ok(format!("/{joined}"))
    } else {
        Ok(joined)
    }
}

/// Is `path` lexically inside `ancestor`?
///
/// Both paths must already be canonical. A path is not its own child.
pub fn is_child(path: &str, ancestor: &str) -> bool {
    if path == ancestor {
        return false;
    }
    let ancestor = ancestor.trim_end_matches('/');
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Strip `ancestor` from the front of `path`, returning the remainder
/// without a leading slash.
pub fn skip_common_ancestor(ancestor: &str, path: &str) -> Result<String, PathError> {
    if !is_child(path, ancestor) {
        return Err(PathError::BadPath(format!(
            "{path} is not a child of {ancestor}"
        )));
    }
    let ancestor = ancestor.trim_end_matches('/');
    Ok(path[ancestor.len() + 1..].to_string())
}

/// Does the directory exist and contain no entries at all?
pub fn dir_is_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    }
}

//! Mapping on-disk paths to repository-relative paths.

use grit_utils::path::{canonpath, is_child, skip_common_ancestor};

use crate::{RepoError, Repository};

impl Repository {
    /// Map a user-supplied path to an in-repository path.
    ///
    /// On-disk paths inside the working copy are stripped to their
    /// repo-relative remainder; for bare repositories, and for unrelated
    /// or nonexistent paths, the input is taken as already
    /// repository-relative. The result always begins with `/` and holds
    /// no `.` or `..` components.
    pub fn map_path(&self, input: &str) -> Result<String, RepoError> {
        let canon = canonpath(input)?;
        if canon.is_empty() {
            return Ok("/".to_string());
        }

        let repo_abspath = self.path.to_string_lossy().into_owned();
        let mut path = match std::fs::canonicalize(&canon) {
            Ok(on_disk) => {
                let on_disk = on_disk.to_string_lossy().into_owned();
                if on_disk == repo_abspath {
                    String::new()
                } else if is_child(&on_disk, &repo_abspath) {
                    if self.is_bare() {
                        // Inside the repository database; the input was
                        // repository-relative all along.
                        canon
                    } else {
                        skip_common_ancestor(&repo_abspath, &on_disk)?
                    }
                } else {
                    // Unrelated on-disk path.
                    canon
                }
            }
            // Not on disk; assume repository-relative.
            Err(_) => canon,
        };

        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Ok(path)
    }
}

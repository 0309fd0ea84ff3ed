//! Repository creation.

use std::path::Path;

use grit_utils::path::dir_is_empty;

use crate::RepoError;

const DESCRIPTION: &str =
    "Unnamed repository; edit this file 'description' to name the repository.\n";
const HEAD_REF: &str = "ref: refs/heads/main\n";
const CONFIG: &str = "[core]\n\
\trepositoryformatversion = 0\n\
\tfilemode = true\n\
\tbare = true\n";

/// Create a bare repository skeleton at `repo_path`.
///
/// The directory must be empty (it is created if missing); anything else
/// is `DirNotEmpty`.
pub fn init(repo_path: impl AsRef<Path>) -> Result<(), RepoError> {
    let repo_path = repo_path.as_ref();
    if !repo_path.exists() {
        std::fs::create_dir_all(repo_path)?;
    }
    if !dir_is_empty(repo_path) {
        return Err(RepoError::DirNotEmpty(repo_path.to_path_buf()));
    }

    std::fs::create_dir(repo_path.join("objects"))?;
    std::fs::create_dir(repo_path.join("objects").join("pack"))?;
    std::fs::create_dir(repo_path.join("refs"))?;
    std::fs::write(repo_path.join("description"), DESCRIPTION)?;
    std::fs::write(repo_path.join("HEAD"), HEAD_REF)?;
    std::fs::write(repo_path.join("config"), CONFIG)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Repository;

    #[test]
    fn init_then_open() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path()).unwrap();

        let repo = Repository::open(dir.path(), None).unwrap();
        assert!(repo.is_bare());
        assert_eq!(
            std::fs::read_to_string(repo.git_dir().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert!(repo.git_dir().join("objects").join("pack").is_dir());
    }

    #[test]
    fn second_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path()).unwrap();
        assert!(matches!(
            init(dir.path()),
            Err(RepoError::DirNotEmpty(_))
        ));
    }

    #[test]
    fn nonempty_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stray"), b"x").unwrap();
        assert!(matches!(
            init(dir.path()),
            Err(RepoError::DirNotEmpty(_))
        ));
    }

    #[test]
    fn creates_missing_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("new").join("repo.git");
        init(&target).unwrap();
        assert!(target.join("HEAD").is_file());
    }
}

//! Importing a directory tree as an initial commit.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bstr::BString;
use grit_hash::ObjectId;
use grit_object::{Commit, FileMode, ObjectKind, Signature, Tree, TreeEntry};
use grit_utils::pattern::fnmatch;

use crate::{RepoError, Repository};

impl Repository {
    /// Import the files under `dir` as a root commit.
    ///
    /// `ignores` are fnmatch-style patterns applied per directory entry;
    /// `progress` is called with each added file's path. Regular files
    /// and symlinks become blobs, subdirectories become trees; a tree
    /// that would end up empty is an error.
    pub fn import(
        &mut self,
        dir: &Path,
        author: &str,
        message: &str,
        ignores: &[String],
        progress: &mut dyn FnMut(&str),
    ) -> Result<ObjectId, RepoError> {
        let tree_id = self.write_tree(dir, "", ignores, progress)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let signature = parse_author(author, now)?;

        let commit = Commit {
            tree: tree_id,
            parents: Vec::new(),
            author: signature.clone(),
            committer: signature,
            message: BString::from(message),
        };
        Ok(self.loose().write(ObjectKind::Commit, &commit.serialize())?)
    }

    fn write_tree(
        &mut self,
        dir: &Path,
        rel: &str,
        ignores: &[String],
        progress: &mut dyn FnMut(&str),
    ) -> Result<ObjectId, RepoError> {
        let mut entries: Vec<TreeEntry> = Vec::new();

        let mut dirents: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        dirents.sort_by_key(|e| e.file_name());

        for dirent in dirents {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if ignores.iter().any(|pattern| fnmatch(pattern, name)) {
                continue;
            }

            let file_type = dirent.file_type()?;
            let child_rel = if rel.is_empty() {
                name.to_string()
            } else {
                format!("{rel}/{name}")
            };

            let entry = if file_type.is_dir() {
                match self.write_tree(&dirent.path(), &child_rel, ignores, progress) {
                    Ok(id) => TreeEntry {
                        mode: FileMode::Tree,
                        name: BString::from(name),
                        id,
                    },
                    // A subdirectory with nothing to import is skipped.
                    Err(RepoError::NoTreeEntry) => continue,
                    Err(e) => return Err(e),
                }
            } else if file_type.is_symlink() {
                let target = std::fs::read_link(dirent.path())?;
                let id = self.loose().write(
                    ObjectKind::Blob,
                    target.to_string_lossy().as_bytes(),
                )?;
                progress(&child_rel);
                TreeEntry {
                    mode: FileMode::Symlink,
                    name: BString::from(name),
                    id,
                }
            } else if file_type.is_file() {
                let content = std::fs::read(dirent.path())?;
                let id = self.loose().write(ObjectKind::Blob, &content)?;
                progress(&child_rel);
                let mode = if is_executable(&dirent.path()) {
                    FileMode::Executable
                } else {
                    FileMode::Regular
                };
                TreeEntry {
                    mode,
                    name: BString::from(name),
                    id,
                }
            } else {
                continue;
            };

            if entries.iter().any(|existing| existing.name == entry.name) {
                return Err(RepoError::TreeDupEntry(child_rel));
            }
            entries.push(entry);
        }

        if entries.is_empty() {
            return Err(RepoError::NoTreeEntry);
        }

        let tree = Tree { entries };
        Ok(self.loose().write(ObjectKind::Tree, &tree.serialize())?)
    }
}

/// Split `"Name <email>"` into a signature with the given time.
fn parse_author(author: &str, time: i64) -> Result<Signature, RepoError> {
    let lt = author
        .find('<')
        .ok_or_else(|| RepoError::Object(grit_object::ObjectError::InvalidSignature(
            format!("missing '<' in author: {author}"),
        )))?;
    let gt = author
        .rfind('>')
        .filter(|&gt| gt > lt)
        .ok_or_else(|| RepoError::Object(grit_object::ObjectError::InvalidSignature(
            format!("missing '>' in author: {author}"),
        )))?;
    Ok(Signature::new(
        author[..lt].trim(),
        &author[lt + 1..gt],
        time,
    ))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::init_bare;

    const AUTHOR: &str = "Import Author <import@example.com>";

    /// Decode a commit in-process; the worker-backed path is covered by
    /// the end-to-end suite.
    fn read_commit(repo: &mut crate::Repository, id: &grit_hash::ObjectId) -> Commit {
        let (kind, payload) = repo.object_payload(id).unwrap();
        assert_eq!(kind, ObjectKind::Commit);
        Commit::parse(&payload).unwrap()
    }

    #[test]
    fn import_builds_commit_tree_and_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(work.join("src")).unwrap();
        std::fs::write(work.join("README"), b"read me\n").unwrap();
        std::fs::write(work.join("src").join("lib.rs"), b"pub fn f() {}\n").unwrap();

        let mut repo = init_bare(&repo_dir);
        let mut imported = Vec::new();
        let commit_id = repo
            .import(&work, AUTHOR, "import\n", &[], &mut |path| {
                imported.push(path.to_string())
            })
            .unwrap();

        imported.sort();
        assert_eq!(imported, vec!["README".to_string(), "src/lib.rs".to_string()]);

        let commit = read_commit(&mut repo, &commit_id);
        assert!(commit.is_root());
        assert_eq!(commit.author.name.as_slice(), b"Import Author");
        assert_eq!(commit.message.as_slice(), b"import\n");

        let tree = repo.open_tree(&commit.tree).unwrap();
        assert!(tree.find(b"README").is_some());
        let src = tree.find(b"src").unwrap();
        assert_eq!(src.mode, FileMode::Tree);
        let src_tree = repo.open_tree(&src.id).unwrap();
        assert!(src_tree.find(b"lib.rs").is_some());
    }

    #[test]
    fn ignores_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("keep.c"), b"int x;\n").unwrap();
        std::fs::write(work.join("skip.o"), b"\x7fELF").unwrap();

        let mut repo = init_bare(&repo_dir);
        let commit_id = repo
            .import(&work, AUTHOR, "msg\n", &["*.o".to_string()], &mut |_| {})
            .unwrap();

        let commit = read_commit(&mut repo, &commit_id);
        let tree = repo.open_tree(&commit.tree).unwrap();
        assert!(tree.find(b"keep.c").is_some());
        assert!(tree.find(b"skip.o").is_none());
    }

    #[test]
    fn empty_import_is_no_tree_entry() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();

        let mut repo = init_bare(&repo_dir);
        assert!(matches!(
            repo.import(&work, AUTHOR, "msg\n", &[], &mut |_| {}),
            Err(RepoError::NoTreeEntry)
        ));
    }

    #[test]
    fn empty_subdirectory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(work.join("empty")).unwrap();
        std::fs::write(work.join("file"), b"content").unwrap();

        let mut repo = init_bare(&repo_dir);
        let commit_id = repo
            .import(&work, AUTHOR, "msg\n", &[], &mut |_| {})
            .unwrap();
        let commit = read_commit(&mut repo, &commit_id);
        let tree = repo.open_tree(&commit.tree).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.find(b"empty").is_none());
    }

    #[test]
    fn executable_bit_preserved() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let script = work.join("run.sh");
        std::fs::write(&script, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut repo = init_bare(&repo_dir);
        let commit_id = repo
            .import(&work, AUTHOR, "msg\n", &[], &mut |_| {})
            .unwrap();
        let commit = read_commit(&mut repo, &commit_id);
        let tree = repo.open_tree(&commit.tree).unwrap();
        assert_eq!(tree.find(b"run.sh").unwrap().mode, FileMode::Executable);
    }

    #[test]
    fn bad_author_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo.git");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("f"), b"x").unwrap();

        let mut repo = init_bare(&repo_dir);
        assert!(repo
            .import(&work, "no email at all", "msg\n", &[], &mut |_| {})
            .is_err());
    }
}

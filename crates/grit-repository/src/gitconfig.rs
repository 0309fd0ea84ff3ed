//! Gitconfig and engine-config values the repository consumes.

use std::path::Path;

use grit_config::ConfigFile;

use crate::RepoError;

/// Values read from the repository's gitconfig (and optionally the
/// user-global one).
#[derive(Debug, Default)]
pub struct GitconfigInfo {
    pub repository_format_version: i64,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub owner: Option<String>,
    /// Declared `extensions.*` names (lowercased by the parser).
    pub extensions: Vec<String>,
    pub global_author_name: Option<String>,
    pub global_author_email: Option<String>,
}

impl GitconfigInfo {
    /// Read the repository config plus, if given, the global gitconfig.
    ///
    /// A missing file is a no-op for the fields it would provide.
    pub fn read(
        repo_config_path: &Path,
        global_gitconfig_path: Option<&Path>,
    ) -> Result<Self, RepoError> {
        let mut info = Self::default();

        if let Some(global_path) = global_gitconfig_path {
            if global_path.is_file() {
                let cfg = ConfigFile::open(global_path)?;
                info.global_author_name = cfg.get("user", "name").map(str::to_string);
                info.global_author_email = cfg.get("user", "email").map(str::to_string);
            }
        }

        if repo_config_path.is_file() {
            let cfg = ConfigFile::open(repo_config_path)?;
            info.repository_format_version = cfg
                .get_int("core", "repositoryformatversion")?
                .unwrap_or(0);
            info.author_name = cfg.get("user", "name").map(str::to_string);
            info.author_email = cfg.get("user", "email").map(str::to_string);
            info.owner = cfg
                .get("core", "owner")
                .or_else(|| cfg.get("gitweb", "owner"))
                .map(str::to_string);
            info.extensions = cfg
                .get_section("extensions")
                .iter()
                .map(|e| e.name.clone())
                .collect();
        }

        Ok(info)
    }
}

/// The engine's own per-repository configuration (`grit.conf`).
#[derive(Debug, Default)]
pub struct EngineConfig {
    /// Commit author in `"Name <email>"` form.
    pub author: Option<String>,
}

impl EngineConfig {
    /// Read `grit.conf`; an absent file yields the default.
    pub fn read(path: &Path) -> Result<Self, RepoError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let cfg = ConfigFile::open(path)?;
        Ok(Self {
            author: cfg.get("user", "author").map(str::to_string),
        })
    }
}

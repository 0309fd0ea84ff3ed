//! Repository orchestration.
//!
//! A [`Repository`] owns the two-tier object store — loose objects plus
//! indexed packs — together with the caches in front of it: per-kind
//! object caches, a bounded MRU cache of open pack indexes, a bounded
//! cache of open pack files, and per-index Bloom filters that prune
//! negative lookups. Untrusted decoding is delegated to privsep workers
//! over the message bus.

mod gitconfig;
mod import;
mod init;
mod objects;
mod paths;
mod privsep;
mod resolve;
mod search;

pub use gitconfig::{EngineConfig, GitconfigInfo};
pub use init::init;
pub use privsep::WorkerKind;
pub use resolve::{OpenedRef, RefStore, ResolvedRef};
pub use search::SearchStats;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use grit_loose::LooseStore;
use grit_object::ObjectCaches;
use grit_pack::{Bloom, Pack, PackIndex};

/// Upper bound on open pack files / pack indexes; further limited by
/// `rlimit_nofile / 8` at open time.
pub const PACK_CACHE_SIZE: usize = 64;

/// Name of the engine's own per-repository config file.
pub const ENGINE_CONFIG_NAME: &str = "grit.conf";

/// Repository format extensions this engine understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["noop", "preciousObjects", "worktreeConfig"];

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("no git repository found at or above {0}")]
    NotGitRepo(PathBuf),

    #[error("unsupported repository format version: {0}")]
    GitRepoFormat(i64),

    #[error("unsupported repository format extension: {0}")]
    GitRepoExt(String),

    #[error("directory not empty: {0}")]
    DirNotEmpty(PathBuf),

    #[error("bad object id string: {0}")]
    BadObjIdStr(String),

    #[error("no such object: {0}")]
    NoObj(String),

    #[error("ambiguous object id: {0}")]
    AmbiguousId(String),

    #[error("no such reference: {0}")]
    NotRef(String),

    #[error("cannot create tree without any entries")]
    NoTreeEntry,

    #[error("duplicate tree entry: {0}")]
    TreeDupEntry(String),

    #[error("duplicate cache entry: {0}")]
    CacheDupEntry(PathBuf),

    #[error(transparent)]
    Path(#[from] grit_utils::PathError),

    #[error(transparent)]
    Loose(#[from] grit_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] grit_pack::PackError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Config(#[from] grit_config::ConfigError),

    #[error(transparent)]
    Ipc(#[from] grit_ipc::IpcError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An open repository.
pub struct Repository {
    /// Working copy root, or the git dir itself for bare repositories.
    path: PathBuf,
    git_dir: PathBuf,
    loose: LooseStore,
    /// Open pack indexes, most recently hit first.
    packidx_cache: Vec<PackIndex>,
    /// Open pack files, most recently inserted first.
    pack_cache: Vec<Pack>,
    /// One Bloom filter per small pack index, keyed by index path.
    bloom_filters: BTreeMap<PathBuf, Bloom>,
    caches: ObjectCaches,
    /// All known `.idx` paths under `objects/pack/`.
    packidx_paths: Vec<PathBuf>,
    gitconfig: GitconfigInfo,
    engine_config: EngineConfig,
    privsep: privsep::PrivsepChildren,
    pack_cache_size: usize,
    stats: SearchStats,
}

impl Repository {
    /// Open the repository at or above `path`.
    ///
    /// Walks ancestors looking for a bare repository (the directory
    /// itself has `objects/`, `refs/` and `HEAD`) or a working copy
    /// (`.git/` with the same). Reads the engine config and gitconfig,
    /// validates the repository format, and records the pack index paths.
    pub fn open(
        path: impl AsRef<Path>,
        global_gitconfig_path: Option<&Path>,
    ) -> Result<Self, RepoError> {
        let start = path.as_ref();
        let pack_cache_size = PACK_CACHE_SIZE.min(nofile_limit() / 8).max(1);

        let mut candidate = std::fs::canonicalize(start)
            .map_err(|_| RepoError::NotGitRepo(start.to_path_buf()))?;

        let (repo_path, git_dir) = loop {
            if is_repo_dir(&candidate) {
                break (candidate.clone(), candidate);
            }
            let dot_git = candidate.join(".git");
            if is_repo_dir(&dot_git) {
                break (candidate, dot_git);
            }
            match candidate.parent() {
                Some(parent) => candidate = parent.to_path_buf(),
                None => return Err(RepoError::NotGitRepo(start.to_path_buf())),
            }
        };

        let engine_config = EngineConfig::read(&git_dir.join(ENGINE_CONFIG_NAME))?;
        let gitconfig =
            GitconfigInfo::read(&git_dir.join("config"), global_gitconfig_path)?;
        if gitconfig.repository_format_version != 0 {
            return Err(RepoError::GitRepoFormat(gitconfig.repository_format_version));
        }
        for ext in &gitconfig.extensions {
            if !SUPPORTED_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
            {
                return Err(RepoError::GitRepoExt(ext.clone()));
            }
        }

        let packidx_paths = search::list_packidx_paths(&git_dir)?;
        let loose = LooseStore::open(git_dir.join("objects"));

        Ok(Self {
            path: repo_path,
            git_dir,
            loose,
            packidx_cache: Vec::new(),
            pack_cache: Vec::new(),
            bloom_filters: BTreeMap::new(),
            caches: ObjectCaches::new(),
            packidx_paths,
            gitconfig,
            engine_config,
            privsep: privsep::PrivsepChildren::new(),
            pack_cache_size,
            stats: SearchStats::default(),
        })
    }

    /// Shut down privsep children and drop all caches.
    ///
    /// Idempotent; returns the first error observed while stopping
    /// children. Dropping the repository without calling this stops the
    /// children silently.
    pub fn close(&mut self) -> Result<(), RepoError> {
        self.packidx_cache.clear();
        self.pack_cache.clear();
        self.bloom_filters.clear();
        self.privsep.stop_all().map_err(RepoError::from)
    }

    // --- Accessors ---

    /// Working copy root, or the git dir for bare repositories.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The git directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn is_bare(&self) -> bool {
        self.path == self.git_dir
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.git_dir.join("objects")
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.git_dir.join("objects").join("pack")
    }

    pub fn gitconfig(&self) -> &GitconfigInfo {
        &self.gitconfig
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    /// The author to use for new commits: engine config first, then the
    /// repository's gitconfig, then the global gitconfig.
    pub fn author(&self) -> Option<String> {
        if let Some(author) = &self.engine_config.author {
            return Some(author.clone());
        }
        let from_user = |name: &Option<String>, email: &Option<String>| {
            match (name, email) {
                (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
                _ => None,
            }
        };
        from_user(&self.gitconfig.author_name, &self.gitconfig.author_email).or_else(|| {
            from_user(
                &self.gitconfig.global_author_name,
                &self.gitconfig.global_author_email,
            )
        })
    }

    pub fn pack_cache_size(&self) -> usize {
        self.pack_cache_size
    }

    pub fn packidx_paths(&self) -> &[PathBuf] {
        &self.packidx_paths
    }

    /// Cache instrumentation counters.
    pub fn search_stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Where worker binaries are looked up.
    pub fn set_libexec_dir(&mut self, dir: impl Into<PathBuf>) {
        self.privsep.set_libexec_dir(dir.into());
    }

    pub(crate) fn loose(&self) -> &LooseStore {
        &self.loose
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Does this directory hold a repository (bare layout)?
fn is_repo_dir(path: &Path) -> bool {
    path.join("objects").is_dir() && path.join("refs").is_dir() && path.join("HEAD").is_file()
}

fn nofile_limit() -> usize {
    let mut rl = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) } != 0 {
        return PACK_CACHE_SIZE * 8;
    }
    rl.rlim_cur as usize
}

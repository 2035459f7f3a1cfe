//! Content-addressed dependency cache.
//!
//! # Layout
//!
//! ```text
//! <cache root>/
//!   <sha256(normalized manifest)>_<os>-<arch>_slipway/
//!     requirements.txt           normalized manifest handed to the installer
//!     .completed_requirements    written only after a successful install
//!     …installed packages…
//! ```
//!
//! An entry without its completion marker is an interrupted or failed
//! install and is removed before the key is reused. Entry directory mtimes
//! order FIFO eviction; a cache hit touches the entry.
//!
//! The cache assumes a single build process owns the root at a time.

use crate::requirements::{cache_key, current_platform, normalize_requirements};
use filetime::FileTime;
use slipway_core::DependenciesConfig;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const COMPLETION_MARKER: &str = ".completed_requirements";
pub const MANIFEST_FILE: &str = "requirements.txt";
const ENTRY_SUFFIX: &str = "_slipway";
const CACHE_DIR_NAME: &str = "slipway";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub completed: bool,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct DependencyCache {
    root: PathBuf,
    max_versions: usize,
    platform: String,
    no_deploy: Vec<String>,
}

impl DependencyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_versions: 0,
            platform: current_platform(),
            no_deploy: Vec::new(),
        }
    }

    /// Keep at most `max_versions` completed entries; 0 keeps everything.
    pub fn with_max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_no_deploy(mut self, no_deploy: Vec<String>) -> Self {
        self.no_deploy = no_deploy;
        self
    }

    pub fn from_config(config: &DependenciesConfig) -> Result<Self, CacheError> {
        let root = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => Self::default_root().ok_or(CacheError::NoCacheDir)?,
        };
        Ok(Self::new(root)
            .with_max_versions(config.max_versions)
            .with_no_deploy(config.no_deploy.clone()))
    }

    /// `<user cache dir>/slipway`
    pub fn default_root() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join(CACHE_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalized manifest and the entry key it maps to.
    pub fn key_for(&self, manifest: &str) -> (String, String) {
        let normalized = normalize_requirements(manifest, &self.no_deploy);
        let key = cache_key(&normalized, &self.platform);
        (normalized, key)
    }

    /// Return the entry directory for `manifest`, installing into it first
    /// if no completed entry exists.
    ///
    /// `install` receives the fresh entry directory, which already holds the
    /// normalized `requirements.txt`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Io`] for filesystem failures, eviction included
    /// - [`CacheError::InstallFailed`] if `install` fails; the entry is left
    ///   without its marker and is purged on next use
    pub async fn get_or_install<F, Fut, E>(
        &self,
        manifest: &str,
        install: F,
    ) -> Result<PathBuf, CacheError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (normalized, key) = self.key_for(manifest);
        let entry = self.root.join(&key);

        if entry.join(COMPLETION_MARKER).is_file() {
            filetime::set_file_mtime(&entry, FileTime::now()).map_err(|e| CacheError::Io {
                path: entry.clone(),
                source: e,
            })?;
            tracing::info!(key = %key, "dependency cache hit");
            return Ok(entry);
        }

        self.evict()?;

        if entry.exists() {
            tracing::warn!(path = %entry.display(), "removing incomplete cache entry");
        }
        remove_dir_if_exists(&entry)?;
        std::fs::create_dir_all(&entry).map_err(|e| CacheError::Io {
            path: entry.clone(),
            source: e,
        })?;
        let manifest_path = entry.join(MANIFEST_FILE);
        std::fs::write(&manifest_path, &normalized).map_err(|e| CacheError::Io {
            path: manifest_path,
            source: e,
        })?;

        tracing::info!(key = %key, "installing dependencies into cache");
        install(entry.clone())
            .await
            .map_err(|e| CacheError::InstallFailed {
                key: key.clone(),
                source: Box::new(e),
            })?;

        let marker = entry.join(COMPLETION_MARKER);
        std::fs::write(&marker, "").map_err(|e| CacheError::Io {
            path: marker,
            source: e,
        })?;
        Ok(entry)
    }

    /// Every entry directory under the root, completed or not, sorted by key.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let read_dir = match std::fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CacheError::Io {
                    path: self.root.clone(),
                    source: e,
                });
            }
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| CacheError::Io {
                path: self.root.clone(),
                source: e,
            })?;
            let key = dir_entry.file_name().to_string_lossy().into_owned();
            let path = dir_entry.path();
            if !key.ends_with(ENTRY_SUFFIX) || !path.is_dir() {
                continue;
            }
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(|e| CacheError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            entries.push(CacheEntry {
                completed: path.join(COMPLETION_MARKER).is_file(),
                key,
                path,
                modified,
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Make room for one more entry: while the completed entries number at
    /// least `max_versions`, delete the least recently touched.
    pub fn evict(&self) -> Result<Vec<PathBuf>, CacheError> {
        if self.max_versions == 0 {
            return Ok(Vec::new());
        }

        let mut completed: Vec<CacheEntry> = self
            .entries()?
            .into_iter()
            .filter(|e| e.completed)
            .collect();
        if completed.len() < self.max_versions {
            return Ok(Vec::new());
        }

        completed.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));
        let excess = completed.len() - (self.max_versions - 1);

        let mut removed = Vec::with_capacity(excess);
        for entry in completed.into_iter().take(excess) {
            tracing::info!(key = %entry.key, "evicting dependency cache entry");
            remove_dir_if_exists(&entry.path)?;
            removed.push(entry.path);
        }
        Ok(removed)
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clean(&self) -> Result<usize, CacheError> {
        let entries = self.entries()?;
        for entry in &entries {
            remove_dir_if_exists(&entry.path)?;
        }
        Ok(entries.len())
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no user cache directory available; set dependencies.cache_dir")]
    NoCacheDir,

    #[error("dependency cache I/O failed at {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("dependency install failed for cache entry {key}")]
    InstallFailed {
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CacheError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCacheDir | Self::Io { .. } => "CACHE_IO",
            Self::InstallFailed { .. } => "INSTALL_FAILED",
        }
    }
}

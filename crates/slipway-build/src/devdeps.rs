//! Development-dependency exclusion.
//!
//! Every `package.json` outside `node_modules` is a manifest scope. For each
//! scope the dependency manager lists installed package directories twice,
//! once for development and once for production dependencies. Packages only
//! present in the development listing are excluded from the archive together
//! with the executables npm linked for them in the nearest `.bin` directory.
//!
//! Scopes are independent: one whose listing fails is skipped and reported
//! as [`ScopeOutcome::Skipped`], the rest still contribute.

use crate::process::{self, ProcessError};
use crate::resolve::{CompiledPatterns, slash_path};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const MANIFEST: &str = "package.json";
const MODULES_DIR: &str = "node_modules";
const BIN_DIR: &str = ".bin";
/// Scopes analyzed at once; each runs two dependency manager processes.
const DEFAULT_SCOPE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyEnv {
    Development,
    Production,
}

/// Abstraction over the dependency manager for testability.
///
/// Production code uses [`NpmLister`], tests substitute canned listings.
#[allow(async_fn_in_trait)]
pub trait DependencyLister: Send + Sync {
    /// Absolute directories of the packages installed for `env` in the
    /// scope rooted at `scope_dir`.
    async fn list(&self, scope_dir: &Path, env: DependencyEnv)
    -> Result<Vec<PathBuf>, ListerError>;
}

/// `npm ls --parseable` based lister.
#[derive(Debug, Clone)]
pub struct NpmLister {
    program: String,
    timeout: Duration,
}

impl NpmLister {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Default for NpmLister {
    fn default() -> Self {
        Self::new("npm", Duration::from_secs(60))
    }
}

impl DependencyLister for NpmLister {
    async fn list(
        &self,
        scope_dir: &Path,
        env: DependencyEnv,
    ) -> Result<Vec<PathBuf>, ListerError> {
        let env_flag = match env {
            DependencyEnv::Development => "--dev=true",
            DependencyEnv::Production => "--prod=true",
        };
        let args = [
            "ls",
            env_flag,
            "--parseable=true",
            "--long=false",
            "--silent",
            "--all",
        ]
        .map(OsStr::new);

        let output = process::run(&self.program, &args, scope_dir, self.timeout).await?;
        parse_listing(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse newline-delimited absolute package directories.
pub fn parse_listing(stdout: &str) -> Result<Vec<PathBuf>, ListerError> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let path = PathBuf::from(line);
            if path.is_absolute() {
                Ok(path)
            } else {
                Err(ListerError::Malformed {
                    line: line.to_owned(),
                })
            }
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ListerError {
    #[error("dependency manager invocation failed")]
    Process(#[from] ProcessError),

    #[error("unexpected line in dependency listing: {line:?}")]
    Malformed { line: String },
}

// ── package.json `bin` ──

/// The three shapes npm accepts for `bin`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    /// `"bin": "cli.js"`, linked under the package's own name
    Single(String),
    /// `"bin": ["a.js", "b.js"]`, linked under each file stem
    List(Vec<String>),
    /// `"bin": { "name": "path" }`
    Named(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinEntry {
    pub name: String,
    pub path: String,
}

impl BinField {
    /// Normalize into `(name, path)` pairs. A single path needs the package
    /// name; scoped names link under the part after the scope.
    pub fn entries(&self, package_name: Option<&str>) -> Vec<BinEntry> {
        match self {
            Self::Single(path) => {
                let name = package_name
                    .map(|n| n.rsplit('/').next().unwrap_or(n).to_owned())
                    .or_else(|| file_stem(path));
                name.map(|name| BinEntry {
                    name,
                    path: path.clone(),
                })
                .into_iter()
                .collect()
            }
            Self::List(paths) => paths
                .iter()
                .filter_map(|path| {
                    file_stem(path).map(|name| BinEntry {
                        name,
                        path: path.clone(),
                    })
                })
                .collect(),
            Self::Named(map) => map
                .iter()
                .map(|(name, path)| BinEntry {
                    name: name.clone(),
                    path: path.clone(),
                })
                .collect(),
        }
    }
}

fn file_stem(path: &str) -> Option<String> {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    name: Option<String>,
    bin: Option<BinField>,
}

// ── Analysis ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeOutcome {
    Analyzed { scope: PathBuf, dev_only: usize },
    Skipped { scope: PathBuf, reason: String },
}

/// Exclude patterns relative to the analyzed root, plus how each scope fared.
#[derive(Debug, Clone, Default)]
pub struct DevDependencyExclusions {
    pub patterns: Vec<String>,
    pub outcomes: Vec<ScopeOutcome>,
}

impl DevDependencyExclusions {
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScopeOutcome::Skipped { .. }))
            .count()
    }
}

pub struct DevDependencyAnalyzer<L: DependencyLister> {
    lister: L,
    concurrency: usize,
}

impl<L: DependencyLister> DevDependencyAnalyzer<L> {
    pub fn new(lister: L) -> Self {
        Self {
            lister,
            concurrency: DEFAULT_SCOPE_CONCURRENCY,
        }
    }

    pub fn lister(&self) -> &L {
        &self.lister
    }

    /// Limit how many scopes are listed at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Compute dev-dependency exclude patterns for everything under `root`.
    ///
    /// `filter` is the unit's own pattern set; manifests it excludes are not
    /// analyzed. Never fails: broken scopes are skipped.
    pub async fn compute_exclusions(
        &self,
        root: &Path,
        filter: &CompiledPatterns,
    ) -> DevDependencyExclusions {
        let root = root.canonicalize().unwrap_or_else(|e| {
            tracing::debug!(root = %root.display(), error = %e, "using root as given");
            root.to_path_buf()
        });

        let scopes = find_scopes(&root, filter);
        tracing::debug!(root = %root.display(), scopes = scopes.len(), "analyzing manifest scopes");

        let results: Vec<_> = futures::stream::iter(&scopes)
            .map(|scope| self.analyze_scope(&root, scope))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut patterns = BTreeSet::new();
        let mut outcomes = Vec::with_capacity(results.len());
        for (outcome, scope_patterns) in results {
            if let ScopeOutcome::Skipped { scope, reason } = &outcome {
                tracing::warn!(
                    scope = %scope.display(),
                    reason = %reason,
                    "skipping dev dependency exclusion for scope"
                );
            }
            patterns.extend(scope_patterns);
            outcomes.push(outcome);
        }

        DevDependencyExclusions {
            patterns: patterns.into_iter().collect(),
            outcomes,
        }
    }

    async fn analyze_scope(&self, root: &Path, scope: &Path) -> (ScopeOutcome, Vec<String>) {
        let (dev, prod) = tokio::join!(
            self.lister.list(scope, DependencyEnv::Development),
            self.lister.list(scope, DependencyEnv::Production),
        );

        let (dev, prod) = match (dev, prod) {
            (Ok(dev), Ok(prod)) => (dev, prod),
            (Err(e), _) | (_, Err(e)) => {
                return (
                    ScopeOutcome::Skipped {
                        scope: scope.to_path_buf(),
                        reason: error_chain(&e),
                    },
                    Vec::new(),
                );
            }
        };

        // Compare full directories: same-named packages at different
        // locations are different packages.
        let prod: HashSet<PathBuf> = prod.into_iter().collect();
        let dev_only: BTreeSet<PathBuf> = dev
            .into_iter()
            .filter(|dir| dir != scope && !prod.contains(dir))
            .collect();

        let mut patterns = Vec::new();
        for package_dir in &dev_only {
            patterns.push(format!("{}/**", relative_pattern(root, package_dir)));
            patterns.extend(bin_patterns(root, package_dir));
        }

        (
            ScopeOutcome::Analyzed {
                scope: scope.to_path_buf(),
                dev_only: dev_only.len(),
            },
            patterns,
        )
    }
}

/// Directories holding a `package.json` outside any `node_modules`.
fn find_scopes(root: &Path, filter: &CompiledPatterns) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == MODULES_DIR));

    let mut scopes = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable path during scope discovery");
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST {
            continue;
        }
        let relative = match entry.path().strip_prefix(root) {
            Ok(relative) => slash_path(relative),
            Err(err) => {
                tracing::debug!(path = %entry.path().display(), error = %err, "manifest outside root");
                continue;
            }
        };
        if !filter.is_included(&relative) {
            continue;
        }
        if let Some(dir) = entry.path().parent() {
            scopes.push(dir.to_path_buf());
        }
    }
    scopes
}

/// Exclude patterns for the executables a package links into `.bin`.
fn bin_patterns(root: &Path, package_dir: &Path) -> Vec<String> {
    let manifest_path = package_dir.join(MANIFEST);
    let manifest: PackageManifest = match std::fs::read_to_string(&manifest_path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(manifest) => manifest,
        Err(reason) => {
            tracing::warn!(
                path = %manifest_path.display(),
                reason = %reason,
                "unreadable package manifest; excluding directory only"
            );
            return Vec::new();
        }
    };

    let (Some(bin), Some(bin_dir)) = (manifest.bin, nearest_bin_dir(package_dir)) else {
        return Vec::new();
    };
    let bin_dir = relative_pattern(root, &bin_dir);
    bin.entries(manifest.name.as_deref())
        .into_iter()
        .map(|entry| format!("{bin_dir}/{}", entry.name))
        .collect()
}

/// `.bin` inside the `node_modules` holding `package_dir`, stepping over
/// an `@scope` directory.
fn nearest_bin_dir(package_dir: &Path) -> Option<PathBuf> {
    let mut parent = package_dir.parent()?;
    if parent
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('@'))
    {
        parent = parent.parent()?;
    }
    Some(parent.join(BIN_DIR))
}

/// `path` relative to `root` with `/` separators, using `..` for paths
/// outside the root.
pub(crate) fn relative_pattern(root: &Path, path: &Path) -> String {
    let root: Vec<Component> = root.components().collect();
    let target: Vec<Component> = path.components().collect();
    let common = root
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = vec!["..".to_owned(); root.len() - common];
    segments.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    segments.join("/")
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

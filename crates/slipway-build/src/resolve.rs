//! Pattern resolution: turn a root directory and a [`PatternSet`] into the
//! concrete, sorted list of files an archive will contain.

use crate::patterns::{Pattern, PatternSet, Polarity, has_glob_syntax};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Sorted, deduplicated relative file paths (forward slashes, no directories).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFileSet {
    files: Vec<String>,
}

impl ResolvedFileSet {
    /// Build from arbitrary paths; sorts and deduplicates.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files: Vec<String> = paths.into_iter().map(Into::into).collect();
        files.sort();
        files.dedup();
        Self { files }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.binary_search_by(|f| f.as_str().cmp(path)).is_ok()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.files
    }
}

/// A [`PatternSet`] with every glob compiled.
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    rules: Vec<(GlobMatcher, Polarity)>,
    external: Vec<Pattern>,
}

impl CompiledPatterns {
    pub fn compile(set: &PatternSet) -> Result<Self, ResolveError> {
        let mut rules = Vec::with_capacity(set.len());
        let mut external = Vec::new();
        for pattern in set.iter() {
            let matcher = GlobBuilder::new(&pattern.glob)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
                .map_err(|e| ResolveError::InvalidPattern {
                    pattern: pattern.glob.clone(),
                    source: e,
                })?
                .compile_matcher();
            if pattern.polarity == Polarity::Include && pattern.is_external() {
                external.push(pattern.clone());
            }
            rules.push((matcher, pattern.polarity));
        }
        Ok(Self { rules, external })
    }

    /// Final verdict for one relative path: the last matching rule wins,
    /// unmatched paths are included.
    pub fn is_included(&self, path: &str) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|(matcher, _)| matcher.is_match(path))
            .is_none_or(|(_, polarity)| *polarity == Polarity::Include)
    }
}

/// Resolve the file set for `root`.
///
/// Every file below `root` (symlinks followed, dotfiles included) starts out
/// included; patterns then flip paths in order. Include patterns reaching
/// above the root (`../shared/**`) add only the files they match, under
/// their `../` relative path; siblings under the same directory stay out.
///
/// # Errors
///
/// - [`ResolveError::RootNotFound`] if `root` is not a directory
/// - [`ResolveError::InvalidPattern`] if a glob does not compile
/// - [`ResolveError::NoFilesMatched`] if nothing survives the patterns
pub fn resolve(root: &Path, patterns: &PatternSet) -> Result<ResolvedFileSet, ResolveError> {
    let compiled = CompiledPatterns::compile(patterns)?;
    resolve_compiled(root, &compiled)
}

pub fn resolve_compiled(
    root: &Path,
    patterns: &CompiledPatterns,
) -> Result<ResolvedFileSet, ResolveError> {
    if !root.is_dir() {
        return Err(ResolveError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut states: BTreeMap<String, bool> = list_files(root, "")
        .into_iter()
        .map(|path| (path, true))
        .collect();

    // Files above the root are candidates only; a matching include turns
    // them on.
    for pattern in &patterns.external {
        let base = literal_base(&pattern.glob);
        for path in list_files(&root.join(&base), &base) {
            states.entry(path).or_insert(false);
        }
    }

    for (matcher, polarity) in &patterns.rules {
        let include = *polarity == Polarity::Include;
        for (path, state) in states.iter_mut() {
            if matcher.is_match(path.as_str()) {
                *state = include;
            }
        }
    }

    let files: Vec<String> = states
        .into_iter()
        .filter_map(|(path, included)| included.then_some(path))
        .collect();

    if files.is_empty() {
        return Err(ResolveError::NoFilesMatched {
            root: root.to_path_buf(),
        });
    }

    tracing::debug!(root = %root.display(), files = files.len(), "file set resolved");
    Ok(ResolvedFileSet { files })
}

/// Recursively list files below `dir`, rendered as `prefix/relative`.
/// A `dir` that is itself a file yields `prefix` alone.
fn list_files(dir: &Path, prefix: &str) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    if dir.is_file() {
        return vec![prefix.to_owned()];
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(dir) {
            Ok(relative) => slash_path(relative),
            Err(err) => {
                tracing::debug!(path = %entry.path().display(), error = %err, "entry outside walk root");
                continue;
            }
        };
        files.push(if prefix.is_empty() {
            relative
        } else {
            format!("{prefix}/{relative}")
        });
    }
    files
}

/// Leading segments of a glob that contain no glob syntax.
fn literal_base(glob: &str) -> String {
    glob.split('/')
        .take_while(|segment| !has_glob_syntax(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Render a relative path with `/` separators.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("package root {path} is not a directory")]
    RootNotFound { path: PathBuf },

    #[error("invalid pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("no files matched under {root}; check the include/exclude patterns")]
    NoFilesMatched { root: PathBuf },
}

impl ResolveError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RootNotFound { .. } => "ROOT_NOT_FOUND",
            Self::InvalidPattern { .. } => "INVALID_PATTERN",
            Self::NoFilesMatched { .. } => "NO_FILES_MATCHED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_base_stops_at_first_glob_segment() {
        assert_eq!(literal_base("../shared/**"), "../shared");
        assert_eq!(literal_base("../shared/lib/*.js"), "../shared/lib");
        assert_eq!(literal_base("../shared/util.js"), "../shared/util.js");
        assert_eq!(literal_base("**/*.js"), "");
    }

    #[test]
    fn is_included_last_match_wins() {
        let mut set = PatternSet::new();
        set.push(Pattern::exclude("**/*.js"));
        set.push(Pattern::include("lib/**"));
        let compiled = CompiledPatterns::compile(&set).unwrap();

        assert!(!compiled.is_included("a.js"));
        assert!(compiled.is_included("lib/b.js"));
        assert!(compiled.is_included("README.md"));
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let mut set = PatternSet::new();
        set.push(Pattern::exclude("*.js"));
        let compiled = CompiledPatterns::compile(&set).unwrap();

        assert!(!compiled.is_included("a.js"));
        assert!(compiled.is_included("lib/b.js"));
    }

    #[test]
    fn invalid_glob_reports_pattern() {
        let mut set = PatternSet::new();
        set.push(Pattern::exclude("src/[unclosed"));
        let err = CompiledPatterns::compile(&set).unwrap_err();
        assert_eq!(err.code(), "INVALID_PATTERN");
        assert!(err.to_string().contains("src/[unclosed"));
    }

    #[test]
    fn from_paths_sorts_and_dedups() {
        let set = ResolvedFileSet::from_paths(["b.js", "a.js", "b.js"]);
        assert_eq!(set.as_slice(), ["a.js", "b.js"]);
        assert!(set.contains("a.js"));
        assert!(!set.contains("c.js"));
    }
}

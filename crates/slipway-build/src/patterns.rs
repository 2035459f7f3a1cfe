//! Ordered include/exclude pattern lists.
//!
//! A [`PatternSet`] is applied as a sequence of overrides on top of an
//! initial "everything is included" state: the last pattern matching a
//! path decides whether it ships. For a packaging unit the order is
//!
//! ```text
//! default excludes → unit excludes → dev-dependency excludes → unit includes → unit patterns
//! ```

use slipway_core::{CONFIG_FILE_NAME, PackagingUnit};

/// Always excluded, ahead of any user pattern.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/**",
    ".gitignore",
    ".DS_Store",
    "npm-debug.log",
    "yarn-*.log",
    ".slipway/**",
    ".slipway_plugins/**",
];

const NEGATION: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub glob: String,
    pub polarity: Polarity,
}

impl Pattern {
    pub fn include(glob: &str) -> Self {
        Self {
            glob: normalize_glob(glob),
            polarity: Polarity::Include,
        }
    }

    pub fn exclude(glob: &str) -> Self {
        Self {
            glob: normalize_glob(glob),
            polarity: Polarity::Exclude,
        }
    }

    /// Whether the pattern reaches above the root (`../shared/**`).
    pub fn is_external(&self) -> bool {
        self.glob.starts_with("../") || self.glob == ".."
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default excludes plus the config file name.
    pub fn with_defaults() -> Self {
        let mut set = Self::new();
        for glob in DEFAULT_EXCLUDES {
            set.push(Pattern::exclude(glob));
        }
        set.push(Pattern::exclude(CONFIG_FILE_NAME));
        set
    }

    /// Full pattern sequence for a packaging unit.
    ///
    /// `dev_exclusions` comes from the dev-dependency analyzer and lands
    /// between the unit's excludes and includes, so an explicit include can
    /// still pull a development package back in.
    pub fn for_unit(unit: &PackagingUnit, dev_exclusions: &[String]) -> Self {
        let mut set = Self::with_defaults();
        set.extend_excludes(&unit.exclude);
        for glob in dev_exclusions {
            set.push(Pattern::exclude(glob));
        }
        set.extend_includes(&unit.include);
        set.extend_includes(&unit.patterns);
        set
    }

    pub fn push(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    /// Append an exclude list; `!pattern` entries re-include.
    pub fn extend_excludes<S: AsRef<str>>(&mut self, globs: &[S]) {
        for glob in globs {
            let glob = glob.as_ref();
            match glob.strip_prefix(NEGATION) {
                Some(negated) => self.push(Pattern::include(negated)),
                None => self.push(Pattern::exclude(glob)),
            }
        }
    }

    /// Append an include list; `!pattern` entries exclude.
    pub fn extend_includes<S: AsRef<str>>(&mut self, globs: &[S]) {
        for glob in globs {
            let glob = glob.as_ref();
            match glob.strip_prefix(NEGATION) {
                Some(negated) => self.push(Pattern::exclude(negated)),
                None => self.push(Pattern::include(glob)),
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Lexically normalize a glob: drop `.` and empty segments and fold
/// `dir/..` pairs. Leading `..` segments are kept; a `..` following a
/// segment with glob syntax is kept verbatim.
pub fn normalize_glob(glob: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in glob.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(prev) if *prev != ".." && !has_glob_syntax(prev) => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub(crate) fn has_glob_syntax(segment: &str) -> bool {
    segment.contains(['*', '?', '[', ']', '{', '}'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_core::UnitKind;
    use std::path::PathBuf;

    fn unit() -> PackagingUnit {
        PackagingUnit {
            kind: UnitKind::Service,
            name: "svc".to_owned(),
            root: PathBuf::from("/srv"),
            include: vec!["keep/**".to_owned(), "!keep/tmp/**".to_owned()],
            exclude: vec!["keep/**".to_owned(), "!keep/README.md".to_owned()],
            patterns: vec!["!docs/**".to_owned()],
            individually: false,
            artifact: None,
            exclude_dev_dependencies: true,
            output_path: PathBuf::from("/srv/.slipway/svc.zip"),
        }
    }

    #[test]
    fn normalize_folds_dot_segments() {
        assert_eq!(normalize_glob("./src/**"), "src/**");
        assert_eq!(normalize_glob("src//lib/./a.js"), "src/lib/a.js");
        assert_eq!(normalize_glob("src/../lib/*.js"), "lib/*.js");
        assert_eq!(normalize_glob("../other/../shared/**"), "../shared/**");
        assert_eq!(normalize_glob("../../x"), "../../x");
        assert_eq!(normalize_glob("**/../x"), "**/../x");
    }

    #[test]
    fn defaults_end_with_config_file() {
        let set = PatternSet::with_defaults();
        assert_eq!(set.len(), DEFAULT_EXCLUDES.len() + 1);
        let last = set.iter().last().unwrap();
        assert_eq!(last.glob, "slipway.toml");
        assert_eq!(last.polarity, Polarity::Exclude);
    }

    #[test]
    fn unit_order_is_excludes_dev_includes_patterns() {
        let set = PatternSet::for_unit(&unit(), &["node_modules/jest/**".to_owned()]);
        let tail: Vec<(String, Polarity)> = set
            .iter()
            .skip(DEFAULT_EXCLUDES.len() + 1)
            .map(|p| (p.glob.clone(), p.polarity))
            .collect();

        assert_eq!(
            tail,
            vec![
                ("keep/**".to_owned(), Polarity::Exclude),
                ("keep/README.md".to_owned(), Polarity::Include),
                ("node_modules/jest/**".to_owned(), Polarity::Exclude),
                ("keep/**".to_owned(), Polarity::Include),
                ("keep/tmp/**".to_owned(), Polarity::Exclude),
                ("docs/**".to_owned(), Polarity::Exclude),
            ]
        );
    }

    #[test]
    fn external_detection() {
        assert!(Pattern::include("../shared/**").is_external());
        assert!(Pattern::include("lib/../../shared/a.js").is_external());
        assert!(!Pattern::include("lib/../shared/a.js").is_external());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_glob_is_idempotent(glob in "[a-z*./]{0,24}") {
                let once = normalize_glob(&glob);
                prop_assert_eq!(normalize_glob(&once), once);
            }

            #[test]
            fn normalized_glob_has_no_dot_segments(glob in "[a-z./]{0,24}") {
                let normalized = normalize_glob(&glob);
                if !normalized.is_empty() {
                    prop_assert!(normalized.split('/').all(|s| s != "." && !s.is_empty()));
                }
            }
        }
    }
}

//! File-set resolution, deterministic archives, and dependency caching for slipway.
//!
//! # Packaging pipeline
//!
//! ```text
//! slipway package
//!   1. Patterns   ── defaults → excludes → dev-dependency excludes → includes → patterns
//!   2. Dev deps   ── npm ls --dev / --prod per package.json scope (DevDependencyAnalyzer)
//!   3. Resolve    ── walk the unit root, apply patterns in order → ResolvedFileSet
//!   4. Archive    ── sorted entries, fixed timestamps → .slipway/<unit>.zip + sha256
//! ```
//!
//! # Dependency cache
//!
//! Requirements manifests are normalized (comments, blank lines and order
//! do not matter) and hashed into a per-platform cache key. Completed
//! entries are reused across builds; retention is bounded by FIFO eviction.

pub mod archive;
pub mod cache;
pub mod cancel;
pub mod devdeps;
pub mod digest;
pub mod install;
pub mod packager;
pub mod patterns;
pub mod process;
pub mod requirements;
pub mod resolve;

pub use archive::{ArchiveBuilder, ArchiveError, ArchiveHost, Artifact};
pub use cache::{CacheEntry, CacheError, DependencyCache};
pub use cancel::CancelFlag;
pub use devdeps::{
    DependencyEnv, DependencyLister, DevDependencyAnalyzer, DevDependencyExclusions, NpmLister,
    ScopeOutcome,
};
pub use install::PipInstaller;
pub use packager::{PackageError, PackagedUnit, Packager};
pub use patterns::{Pattern, PatternSet, Polarity};
pub use requirements::normalize_requirements;
pub use resolve::{CompiledPatterns, ResolveError, ResolvedFileSet, resolve};

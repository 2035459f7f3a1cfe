//! Per-unit packaging: patterns → file set → archive.
//!
//! Units are independent. [`Packager::package_all`] builds them on a
//! bounded pool and reports one result per unit, so a unit whose patterns
//! match nothing fails alone.

use crate::archive::{ArchiveBuilder, ArchiveError, Artifact};
use crate::cancel::CancelFlag;
use crate::devdeps::{DependencyLister, DevDependencyAnalyzer, NpmLister};
use crate::patterns::PatternSet;
use crate::resolve::{CompiledPatterns, ResolveError, ResolvedFileSet, resolve_compiled};
use futures::StreamExt;
use slipway_core::{DependenciesConfig, PackagingUnit, UnitKind};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedUnit {
    pub kind: UnitKind,
    pub name: String,
    pub artifact: Artifact,
    /// User-supplied artifact; nothing was built.
    pub prebuilt: bool,
    /// Number of files archived (0 when prebuilt)
    pub files: usize,
}

pub struct Packager<L: DependencyLister = NpmLister> {
    analyzer: DevDependencyAnalyzer<L>,
    archiver: ArchiveBuilder,
    cancel: CancelFlag,
    concurrency: usize,
}

impl Packager<NpmLister> {
    pub fn from_config(config: &DependenciesConfig, cancel: CancelFlag) -> Self {
        let lister = NpmLister::new(
            config.manager.clone(),
            Duration::from_secs(config.manager_timeout_secs),
        );
        Self::with_lister(lister, cancel)
    }
}

impl<L: DependencyLister> Packager<L> {
    pub fn with_lister(lister: L, cancel: CancelFlag) -> Self {
        Self {
            analyzer: DevDependencyAnalyzer::new(lister),
            archiver: ArchiveBuilder::new(cancel.clone()),
            cancel,
            concurrency: default_concurrency(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_archiver(mut self, archiver: ArchiveBuilder) -> Self {
        self.archiver = archiver;
        self
    }

    /// The unit's full pattern sequence, dev-dependency exclusions included.
    pub async fn pattern_set(&self, unit: &PackagingUnit) -> Result<PatternSet, PackageError> {
        let base = PatternSet::for_unit(unit, &[]);
        if !unit.exclude_dev_dependencies {
            return Ok(base);
        }

        let filter = CompiledPatterns::compile(&base)?;
        let exclusions = self.analyzer.compute_exclusions(&unit.root, &filter).await;
        tracing::debug!(
            unit = %unit.label(),
            patterns = exclusions.patterns.len(),
            skipped_scopes = exclusions.skipped(),
            "dev dependency exclusions computed"
        );
        Ok(PatternSet::for_unit(unit, &exclusions.patterns))
    }

    pub async fn resolve_files(
        &self,
        unit: &PackagingUnit,
    ) -> Result<ResolvedFileSet, PackageError> {
        let patterns = CompiledPatterns::compile(&self.pattern_set(unit).await?)?;
        let root = unit.root.clone();
        let files = tokio::task::spawn_blocking(move || resolve_compiled(&root, &patterns)).await??;
        Ok(files)
    }

    /// Build (or, for a user-supplied artifact, just hash) one unit.
    pub async fn build_artifact(&self, unit: &PackagingUnit) -> Result<PackagedUnit, PackageError> {
        if self.cancel.is_cancelled() {
            return Err(PackageError::Archive(ArchiveError::Cancelled));
        }

        if let Some(artifact) = &unit.artifact {
            tracing::info!(unit = %unit.label(), path = %artifact.display(), "using supplied artifact");
            let path = artifact.clone();
            let artifact =
                tokio::task::spawn_blocking(move || Artifact::from_existing(&path)).await??;
            return Ok(PackagedUnit {
                kind: unit.kind,
                name: unit.name.clone(),
                artifact,
                prebuilt: true,
                files: 0,
            });
        }

        let files = self.resolve_files(unit).await?;
        let count = files.len();
        let archiver = self.archiver.clone();
        let root = unit.root.clone();
        let output = unit.output_path.clone();
        let artifact =
            tokio::task::spawn_blocking(move || archiver.build(&files, &root, &output)).await??;

        tracing::info!(
            unit = %unit.label(),
            path = %artifact.path.display(),
            files = count,
            "artifact built"
        );
        Ok(PackagedUnit {
            kind: unit.kind,
            name: unit.name.clone(),
            artifact,
            prebuilt: false,
            files: count,
        })
    }

    /// Build every unit, at most `concurrency` at a time. Results keep the
    /// order of `units`.
    pub async fn package_all<'a>(
        &self,
        units: &'a [PackagingUnit],
    ) -> Vec<(&'a PackagingUnit, Result<PackagedUnit, PackageError>)> {
        futures::stream::iter(units)
            .map(|unit| async move { (unit, self.build_artifact(unit).await) })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

fn default_concurrency() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(err) => {
            tracing::debug!(error = %err, "parallelism unknown; packaging one unit at a time");
            1
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("packaging task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl PackageError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolve(e) => e.code(),
            Self::Archive(e) => e.code(),
            Self::Task(_) => "PACKAGING_TASK",
        }
    }
}

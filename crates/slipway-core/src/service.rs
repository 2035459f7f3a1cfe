//! Service model: the resolved set of packaging units for one build.
//!
//! A [`ServiceModel`] is derived once per invocation from a
//! [`SlipwayConfig`] and never mutated afterwards. Each
//! [`PackagingUnit`] carries everything the packager needs: its root,
//! its pattern lists in application order, and where its artifact goes.
//!
//! # Derivation
//!
//! ```text
//! [package].individually ─┐
//! [functions.x.package]  ─┼─> Function unit (own archive)  .slipway/functions/x.zip
//!                         └─> otherwise shares the Service unit .slipway/<service>.zip
//! [layers.y]              ──> Layer unit                    .slipway/layers/y.zip
//! ```

use crate::config::{PackageConfig, SlipwayConfig, UnitPackageConfig};
use std::fmt;
use std::path::{Path, PathBuf};

/// Working directory for build outputs, relative to the service root.
pub const OUTPUT_DIR: &str = ".slipway";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKind {
    Service,
    Function,
    Layer,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Service => "service",
            Self::Function => "function",
            Self::Layer => "layer",
        })
    }
}

/// One deployable bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingUnit {
    pub kind: UnitKind,
    pub name: String,
    /// Absolute directory the unit's patterns are resolved against
    pub root: PathBuf,
    /// Legacy include list, in declaration order
    pub include: Vec<String>,
    /// Legacy exclude list, in declaration order
    pub exclude: Vec<String>,
    /// Ordered pattern list, applied after `include`
    pub patterns: Vec<String>,
    pub individually: bool,
    /// User-supplied artifact; when set nothing is built.
    pub artifact: Option<PathBuf>,
    pub exclude_dev_dependencies: bool,
    /// Where the built archive is written
    pub output_path: PathBuf,
}

impl PackagingUnit {
    /// Artifact the deployment will use: the user-supplied one or the built one.
    pub fn artifact_path(&self) -> &Path {
        self.artifact.as_deref().unwrap_or(&self.output_path)
    }

    pub fn label(&self) -> String {
        format!("{} '{}'", self.kind, self.name)
    }
}

/// Fully resolved service model for one build invocation.
#[derive(Debug, Clone)]
pub struct ServiceModel {
    pub name: String,
    pub stage: String,
    pub region: String,
    pub root: PathBuf,
    pub deployment_bucket: Option<String>,
    deployment_prefix: String,
    functions: Vec<String>,
    units: Vec<PackagingUnit>,
}

impl ServiceModel {
    /// Derive packaging units from configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceDirResolve`](crate::Error::ServiceDirResolve) if `service_dir` cannot be canonicalized
    /// - [`Error::ArtifactNotFound`](crate::Error::ArtifactNotFound) if a declared artifact does not exist
    pub fn from_config(service_dir: &Path, config: &SlipwayConfig) -> crate::Result<Self> {
        let root = service_dir
            .canonicalize()
            .map_err(|e| crate::Error::ServiceDirResolve {
                path: service_dir.to_path_buf(),
                source: e,
            })?;

        let name = config
            .service
            .name
            .clone()
            .or_else(|| {
                root.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "service".to_owned());

        let output_dir = root.join(OUTPUT_DIR);
        let package = &config.package;

        // Layers are packaged on their own, never inside function archives.
        let layer_excludes: Vec<String> = config
            .layers
            .values()
            .map(|layer| format!("{}/**", pattern_path(&layer.path)))
            .collect();

        let mut units = Vec::new();
        let mut shared_service_unit = config.functions.is_empty();

        for (fn_name, function) in &config.functions {
            let fn_package = &function.package;
            let individually =
                package.individually || fn_package.individually || fn_package.artifact.is_some();
            if !individually {
                shared_service_unit = true;
                continue;
            }

            let mut exclude = package.exclude.clone();
            exclude.extend(layer_excludes.iter().cloned());
            exclude.extend(fn_package.exclude.iter().cloned());

            units.push(PackagingUnit {
                kind: UnitKind::Function,
                name: fn_name.clone(),
                root: root.clone(),
                include: concat(&package.include, &fn_package.include),
                exclude,
                patterns: concat(&package.patterns, &fn_package.patterns),
                individually: true,
                artifact: resolve_artifact(&root, fn_package.artifact.as_deref(), fn_name)?,
                exclude_dev_dependencies: package.exclude_dev_dependencies,
                output_path: output_dir.join("functions").join(format!("{fn_name}.zip")),
            });
        }

        if shared_service_unit {
            units.insert(0, service_unit(&root, &name, package, &layer_excludes)?);
        }

        for (layer_name, layer) in &config.layers {
            units.push(layer_unit(
                &root,
                layer_name,
                &layer.path,
                &layer.package,
                package.exclude_dev_dependencies,
            )?);
        }

        tracing::debug!(
            service = %name,
            units = units.len(),
            functions = config.functions.len(),
            "service model derived"
        );

        Ok(Self {
            name,
            stage: config.service.stage.clone(),
            region: config.service.region.clone(),
            root,
            deployment_bucket: config.service.deployment_bucket.clone(),
            deployment_prefix: config.service.deployment_prefix.clone(),
            functions: config.functions.keys().cloned().collect(),
            units,
        })
    }

    pub fn units(&self) -> &[PackagingUnit] {
        &self.units
    }

    pub fn function_names(&self) -> &[String] {
        &self.functions
    }

    /// Deployed compute function name: `<service>-<stage>-<function>`.
    pub fn deployed_function_name(&self, function: &str) -> String {
        format!("{}-{}-{}", self.name, self.stage, function)
    }

    /// Key prefix holding every deployment of this service and stage.
    pub fn deployment_prefix(&self) -> String {
        format!(
            "{}/{}/{}",
            self.deployment_prefix.trim_end_matches('/'),
            self.name,
            self.stage
        )
    }

    pub fn service_unit(&self) -> Option<&PackagingUnit> {
        self.units.iter().find(|u| u.kind == UnitKind::Service)
    }

    /// The unit whose artifact contains `function`.
    pub fn unit_for_function(&self, function: &str) -> crate::Result<&PackagingUnit> {
        if !self.functions.iter().any(|f| f == function) {
            return Err(crate::Error::UnknownFunction {
                name: function.to_owned(),
                available: self.functions.clone(),
            });
        }
        self.units
            .iter()
            .find(|u| u.kind == UnitKind::Function && u.name == function)
            .or_else(|| self.service_unit())
            .ok_or_else(|| crate::Error::UnknownFunction {
                name: function.to_owned(),
                available: self.functions.clone(),
            })
    }

    pub fn layer_unit(&self, layer: &str) -> crate::Result<&PackagingUnit> {
        self.units
            .iter()
            .find(|u| u.kind == UnitKind::Layer && u.name == layer)
            .ok_or_else(|| crate::Error::UnknownLayer {
                name: layer.to_owned(),
                available: self
                    .units
                    .iter()
                    .filter(|u| u.kind == UnitKind::Layer)
                    .map(|u| u.name.clone())
                    .collect(),
            })
    }
}

fn service_unit(
    root: &Path,
    name: &str,
    package: &PackageConfig,
    layer_excludes: &[String],
) -> crate::Result<PackagingUnit> {
    let mut exclude = package.exclude.clone();
    exclude.extend(layer_excludes.iter().cloned());

    Ok(PackagingUnit {
        kind: UnitKind::Service,
        name: name.to_owned(),
        root: root.to_path_buf(),
        include: package.include.clone(),
        exclude,
        patterns: package.patterns.clone(),
        individually: false,
        artifact: resolve_artifact(root, package.artifact.as_deref(), name)?,
        exclude_dev_dependencies: package.exclude_dev_dependencies,
        output_path: root.join(OUTPUT_DIR).join(format!("{name}.zip")),
    })
}

fn layer_unit(
    root: &Path,
    name: &str,
    path: &Path,
    package: &UnitPackageConfig,
    exclude_dev_dependencies: bool,
) -> crate::Result<PackagingUnit> {
    Ok(PackagingUnit {
        kind: UnitKind::Layer,
        name: name.to_owned(),
        root: root.join(path),
        include: package.include.clone(),
        exclude: package.exclude.clone(),
        patterns: package.patterns.clone(),
        individually: true,
        artifact: resolve_artifact(root, package.artifact.as_deref(), name)?,
        exclude_dev_dependencies,
        output_path: root
            .join(OUTPUT_DIR)
            .join("layers")
            .join(format!("{name}.zip")),
    })
}

fn resolve_artifact(
    root: &Path,
    artifact: Option<&Path>,
    unit: &str,
) -> crate::Result<Option<PathBuf>> {
    let Some(artifact) = artifact else {
        return Ok(None);
    };
    let path = root.join(artifact);
    if !path.is_file() {
        return Err(crate::Error::ArtifactNotFound {
            unit: unit.to_owned(),
            path,
        });
    }
    Ok(Some(path))
}

fn concat(base: &[String], extra: &[String]) -> Vec<String> {
    base.iter().chain(extra).cloned().collect()
}

/// Render a config path as a forward-slash pattern prefix.
fn pattern_path(path: &Path) -> String {
    let rendered = path
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    rendered.trim_end_matches('/').to_owned()
}

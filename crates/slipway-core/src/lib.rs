//! Core types and configuration for slipway.
//!
//! This crate defines the `slipway.toml` schema ([`SlipwayConfig`]),
//! the service model that turns configuration into [`PackagingUnit`]s,
//! and shared error types.

pub mod config;
pub mod error;
pub mod service;

pub use config::{
    CONFIG_FILE_NAME, DependenciesConfig, FunctionConfig, LayerConfig, PackageConfig,
    ServiceConfig, SlipwayConfig, UnitPackageConfig,
};
pub use error::{Error, Result};
pub use service::{OUTPUT_DIR, PackagingUnit, ServiceModel, UnitKind};

mod cache;
mod check;
mod deps;
mod files;
mod package;

use slipway_build::{ArchiveError, CacheError, PackageError, ResolveError};
use slipway_cloud::ChangeError;
use slipway_core::{ServiceModel, SlipwayConfig};
use std::path::Path;

pub use cache::{cache_clean, cache_list};
pub use check::check;
pub use deps::deps;
pub use files::files;
pub use package::package;

/// Load slipway.toml and derive the service model.
pub(crate) fn load_service(dir: &Path) -> anyhow::Result<(SlipwayConfig, ServiceModel)> {
    let config = SlipwayConfig::load(dir)?;
    let model = ServiceModel::from_config(dir, &config)?;
    Ok((config, model))
}

/// Stable code of the first typed error in the chain.
pub(crate) fn error_code(err: &anyhow::Error) -> Option<&'static str> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<slipway_core::Error>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<PackageError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<ResolveError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<ArchiveError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<CacheError>() {
            Some(e.code())
        } else {
            cause.downcast_ref::<ChangeError>().map(ChangeError::code)
        }
    })
}

/// `error[CODE]: message` followed by the cause chain.
pub(crate) fn report_error(err: &anyhow::Error) {
    match error_code(err) {
        Some(code) => eprintln!("error[{code}]: {err}"),
        None => eprintln!("error: {err}"),
    }
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

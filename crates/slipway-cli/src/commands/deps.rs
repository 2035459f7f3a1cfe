use anyhow::Context;
use slipway_build::{DependencyCache, PipInstaller};
use slipway_core::SlipwayConfig;
use std::path::Path;

const DEFAULT_REQUIREMENTS: &str = "requirements.txt";

/// Install requirements into the cache (or reuse a completed entry) and
/// print the entry directory.
pub async fn deps(dir: &Path, requirements: Option<&Path>) -> anyhow::Result<()> {
    let config = SlipwayConfig::load(dir)?;

    let manifest_path = match requirements {
        Some(path) => path.to_path_buf(),
        None => dir.join(DEFAULT_REQUIREMENTS),
    };
    let manifest = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;

    let cache = DependencyCache::from_config(&config.dependencies)?;
    let installer = PipInstaller::from_config(&config.dependencies);
    let entry = cache
        .get_or_install(&manifest, |target| installer.install(target))
        .await?;

    println!("{}", entry.display());
    Ok(())
}

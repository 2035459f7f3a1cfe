use slipway_build::DependencyCache;
use slipway_core::SlipwayConfig;
use std::path::Path;

pub fn cache_list(dir: &Path) -> anyhow::Result<()> {
    let cache = cache_for(dir)?;
    let entries = cache.entries()?;
    if entries.is_empty() {
        println!("Dependency cache at {} is empty.", cache.root().display());
        return Ok(());
    }

    println!("Dependency cache at {}:", cache.root().display());
    for entry in entries {
        let state = if entry.completed { "" } else { " (incomplete)" };
        println!("  {}{state}", entry.key);
    }
    Ok(())
}

pub fn cache_clean(dir: &Path) -> anyhow::Result<()> {
    let cache = cache_for(dir)?;
    let removed = cache.clean()?;
    println!(
        "Removed {removed} cache entr{} from {}.",
        if removed == 1 { "y" } else { "ies" },
        cache.root().display()
    );
    Ok(())
}

fn cache_for(dir: &Path) -> anyhow::Result<DependencyCache> {
    let config = SlipwayConfig::load(dir)?;
    Ok(DependencyCache::from_config(&config.dependencies)?)
}

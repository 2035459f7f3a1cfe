use slipway_build::{CancelFlag, Packager};
use slipway_core::PackagingUnit;
use std::path::Path;

/// Print resolved file sets. With no selector every unit is printed under
/// a `# <unit>` header.
pub async fn files(dir: &Path, function: Option<&str>, layer: Option<&str>) -> anyhow::Result<()> {
    let (config, model) = super::load_service(dir)?;
    let packager = Packager::from_config(&config.dependencies, CancelFlag::new());

    let selected: Option<&PackagingUnit> = match (function, layer) {
        (Some(function), _) => Some(model.unit_for_function(function)?),
        (None, Some(layer)) => Some(model.layer_unit(layer)?),
        (None, None) => None,
    };

    if let Some(unit) = selected {
        if let Some(artifact) = &unit.artifact {
            println!("# {} uses supplied artifact {}", unit.label(), artifact.display());
            return Ok(());
        }
        for path in packager.resolve_files(unit).await?.iter() {
            println!("{path}");
        }
        return Ok(());
    }

    for unit in model.units() {
        println!("# {}", unit.label());
        if unit.artifact.is_some() {
            continue;
        }
        for path in packager.resolve_files(unit).await?.iter() {
            println!("{path}");
        }
    }
    Ok(())
}

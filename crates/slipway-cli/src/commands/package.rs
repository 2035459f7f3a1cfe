use slipway_build::{CancelFlag, Packager};
use std::path::Path;

/// Build every unit, or only the one containing `function`.
pub async fn package(dir: &Path, function: Option<&str>, cancel: CancelFlag) -> anyhow::Result<()> {
    let (config, model) = super::load_service(dir)?;

    let units = match function {
        Some(function) => vec![model.unit_for_function(function)?.clone()],
        None => model.units().to_vec(),
    };

    println!("Packaging {} ({} unit(s))...", model.name, units.len());
    let packager = Packager::from_config(&config.dependencies, cancel);
    let results = packager.package_all(&units).await;

    let mut failed = 0;
    for (unit, result) in results {
        match result {
            Ok(packaged) => {
                let origin = if packaged.prebuilt {
                    "supplied".to_owned()
                } else {
                    format!("{} files", packaged.files)
                };
                println!(
                    "  {} -> {} ({origin}, {} bytes)",
                    unit.label(),
                    packaged.artifact.path.display(),
                    packaged.artifact.size
                );
                println!("    sha256 {}", packaged.artifact.sha256);
            }
            Err(err) => {
                failed += 1;
                eprintln!("  {} failed: error[{}]: {err}", unit.label(), err.code());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} unit(s) failed to package", units.len());
    }
    println!("Done.");
    Ok(())
}

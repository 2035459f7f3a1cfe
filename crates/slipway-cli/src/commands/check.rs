use anyhow::Context;
use slipway_cloud::{AwsClient, ChangeDetector, DeployReason, Verdict};
use slipway_core::OUTPUT_DIR;
use std::path::{Path, PathBuf};

const TEMPLATE_FILE: &str = "compiled-template.json";

/// Report whether the built artifacts and template match the latest
/// deployment.
pub async fn check(dir: &Path, template: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let (_, model) = super::load_service(dir)?;

    let storage = AwsClient::new().with_region(model.region.clone());
    let functions = AwsClient::new().with_region(model.region.clone());
    let detector = ChangeDetector::for_service(storage, functions, &model)?.with_force(force);

    let template_path = template
        .map(Path::to_path_buf)
        .unwrap_or_else(|| model.root.join(OUTPUT_DIR).join(TEMPLATE_FILE));
    let content = std::fs::read_to_string(&template_path)
        .with_context(|| format!("failed to read template {}", template_path.display()))?;
    let template: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("invalid template JSON in {}", template_path.display()))?;

    let artifacts: Vec<PathBuf> = model
        .units()
        .iter()
        .map(|unit| unit.artifact_path().to_path_buf())
        .collect();
    let deployed: Vec<String> = model
        .function_names()
        .iter()
        .map(|function| model.deployed_function_name(function))
        .collect();

    match detector.check(&artifacts, &template, &deployed).await? {
        Verdict::Skip { directory } => {
            println!("Deployment unchanged (matches {directory}); skipping.");
        }
        Verdict::Deploy(reason) => {
            println!("Deployment required: {}", describe(&reason));
        }
    }
    Ok(())
}

fn describe(reason: &DeployReason) -> String {
    match reason {
        DeployReason::Forced => "forced".to_owned(),
        DeployReason::NoPreviousDeployment => "no previous deployment".to_owned(),
        DeployReason::HashesDiffer { local, remote } => {
            format!("{local} local file(s) differ from {remote} remote file(s)")
        }
        DeployReason::FunctionOutdated { function } => {
            format!("function {function} predates the latest upload")
        }
    }
}

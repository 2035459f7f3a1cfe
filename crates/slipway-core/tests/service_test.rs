use slipway_core::{ServiceModel, SlipwayConfig, UnitKind};
use std::path::Path;
use tempfile::TempDir;

fn model(dir: &Path, toml: &str) -> slipway_core::Result<ServiceModel> {
    let config = SlipwayConfig::parse(toml).unwrap();
    ServiceModel::from_config(dir, &config)
}

// ── Unit derivation ──

#[test]
fn no_functions_yields_single_service_unit() {
    let tmp = TempDir::new().unwrap();
    let model = model(tmp.path(), "[service]\nname = \"api\"\n").unwrap();

    assert_eq!(model.units().len(), 1);
    let unit = &model.units()[0];
    assert_eq!(unit.kind, UnitKind::Service);
    assert_eq!(unit.name, "api");
    assert!(unit.output_path.ends_with(".slipway/api.zip"));
    assert!(unit.exclude_dev_dependencies);
}

#[test]
fn service_name_defaults_to_directory_name() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("billing");
    std::fs::create_dir(&dir).unwrap();

    let model = model(&dir, "").unwrap();
    assert_eq!(model.name, "billing");
}

#[test]
fn shared_functions_use_service_unit() {
    let tmp = TempDir::new().unwrap();
    let model = model(
        tmp.path(),
        r#"
[service]
name = "api"

[functions.a]
[functions.b]
"#,
    )
    .unwrap();

    assert_eq!(model.units().len(), 1);
    assert_eq!(model.unit_for_function("a").unwrap().kind, UnitKind::Service);
    assert_eq!(model.unit_for_function("b").unwrap().kind, UnitKind::Service);
}

#[test]
fn service_individually_packages_every_function() {
    let tmp = TempDir::new().unwrap();
    let model = model(
        tmp.path(),
        r#"
[service]
name = "api"

[package]
individually = true
patterns = ["!docs/**"]
exclude = ["tmp/**"]

[functions.a.package]
patterns = ["a.js"]
exclude = ["a-tmp/**"]

[functions.b]
"#,
    )
    .unwrap();

    assert!(model.service_unit().is_none());
    assert_eq!(model.units().len(), 2);

    let a = model.unit_for_function("a").unwrap();
    assert_eq!(a.kind, UnitKind::Function);
    assert_eq!(a.patterns, vec!["!docs/**", "a.js"]);
    assert_eq!(a.exclude, vec!["tmp/**", "a-tmp/**"]);
    assert!(a.output_path.ends_with(".slipway/functions/a.zip"));
}

#[test]
fn mixed_functions_build_service_and_individual_units() {
    let tmp = TempDir::new().unwrap();
    let model = model(
        tmp.path(),
        r#"
[service]
name = "api"

[functions.shared]

[functions.solo.package]
individually = true
"#,
    )
    .unwrap();

    let kinds: Vec<UnitKind> = model.units().iter().map(|u| u.kind).collect();
    assert_eq!(kinds, vec![UnitKind::Service, UnitKind::Function]);
    assert_eq!(model.unit_for_function("solo").unwrap().name, "solo");
}

#[test]
fn layers_get_own_units_and_are_excluded_elsewhere() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("layers/deps")).unwrap();
    let model = model(
        tmp.path(),
        r#"
[service]
name = "api"

[layers.deps]
path = "./layers/deps"

[layers.deps.package]
exclude = ["*.md"]
"#,
    )
    .unwrap();

    let service = model.service_unit().unwrap();
    assert!(service.exclude.contains(&"layers/deps/**".to_owned()));

    let layer = model.layer_unit("deps").unwrap();
    assert_eq!(layer.kind, UnitKind::Layer);
    assert!(layer.root.ends_with("layers/deps"));
    assert_eq!(layer.exclude, vec!["*.md"]);
    assert!(layer.output_path.ends_with(".slipway/layers/deps.zip"));
}

// ── Artifacts ──

#[test]
fn declared_artifact_must_exist() {
    let tmp = TempDir::new().unwrap();
    let err = model(
        tmp.path(),
        r#"
[package]
artifact = "missing.zip"
"#,
    )
    .unwrap_err();

    assert_eq!(err.code(), "ARTIFACT_NOT_FOUND");
    assert!(err.to_string().contains("missing.zip"));
}

#[test]
fn declared_function_artifact_implies_individual_packaging() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("prebuilt.zip"), b"PK").unwrap();
    let model = model(
        tmp.path(),
        r#"
[functions.a.package]
artifact = "prebuilt.zip"
"#,
    )
    .unwrap();

    let unit = model.unit_for_function("a").unwrap();
    assert_eq!(unit.kind, UnitKind::Function);
    assert!(unit.artifact_path().ends_with("prebuilt.zip"));
    // Only function declared and it is individual: no service archive.
    assert!(model.service_unit().is_none());
}

// ── Lookups ──

#[test]
fn unknown_function_lists_available_names() {
    let tmp = TempDir::new().unwrap();
    let model = model(tmp.path(), "[functions.a]\n[functions.b]\n").unwrap();

    let err = model.unit_for_function("c").unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_FUNCTION");
    let msg = err.to_string();
    assert!(msg.contains("a, b"), "got: {msg}");
}

#[test]
fn unknown_layer_reports_none_available() {
    let tmp = TempDir::new().unwrap();
    let model = model(tmp.path(), "").unwrap();

    let err = model.layer_unit("x").unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_LAYER");
    assert!(err.to_string().contains("(none)"));
}

#[test]
fn deployment_prefix_and_function_names() {
    let tmp = TempDir::new().unwrap();
    let model = model(
        tmp.path(),
        r#"
[service]
name = "api"
stage = "prod"
deployment_prefix = "deploys/"

[functions.create]
"#,
    )
    .unwrap();

    assert_eq!(model.deployment_prefix(), "deploys/api/prod");
    assert_eq!(model.deployed_function_name("create"), "api-prod-create");
    assert_eq!(model.function_names(), ["create".to_owned()]);
}

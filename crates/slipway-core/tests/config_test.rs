use slipway_core::SlipwayConfig;
use tempfile::TempDir;

#[test]
fn load_returns_defaults_when_no_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = SlipwayConfig::load(tmp.path()).unwrap();

    assert!(config.service.name.is_none());
    assert_eq!(config.service.stage, "dev");
    assert_eq!(config.service.region, "us-east-1");
    assert_eq!(config.service.deployment_prefix, "slipway");
    assert!(config.service.deployment_bucket.is_none());
    assert!(!config.package.individually);
    assert!(config.package.exclude_dev_dependencies);
    assert!(config.package.patterns.is_empty());
    assert!(config.functions.is_empty());
    assert!(config.layers.is_empty());
    assert_eq!(config.dependencies.manager, "npm");
    assert_eq!(config.dependencies.manager_timeout_secs, 60);
    assert_eq!(config.dependencies.installer, "pip");
    assert_eq!(config.dependencies.max_versions, 0);
    assert!(config.dependencies.no_deploy.contains(&"boto3".to_owned()));
}

#[test]
fn load_parses_full_config() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[service]
name = "orders"
stage = "prod"
region = "eu-west-1"
deployment_bucket = "orders-deploys"
deployment_prefix = "releases"

[package]
individually = true
patterns = ["!docs/**", "docs/keep.md"]
exclude = ["tmp/**"]
exclude_dev_dependencies = false

[functions.create]
handler = "handler.create"

[functions.create.package]
patterns = ["handler.js"]

[layers.shared]
path = "layers/shared"

[dependencies]
manager = "pnpm"
manager_timeout_secs = 5
cache_dir = "/var/cache/slipway"
max_versions = 3
no_deploy = []
"#;
    std::fs::write(tmp.path().join("slipway.toml"), toml).unwrap();

    let config = SlipwayConfig::load(tmp.path()).unwrap();

    assert_eq!(config.service.name.as_deref(), Some("orders"));
    assert_eq!(config.service.stage, "prod");
    assert_eq!(config.service.region, "eu-west-1");
    assert_eq!(
        config.service.deployment_bucket.as_deref(),
        Some("orders-deploys")
    );
    assert_eq!(config.service.deployment_prefix, "releases");
    assert!(config.package.individually);
    assert_eq!(config.package.patterns, vec!["!docs/**", "docs/keep.md"]);
    assert_eq!(config.package.exclude, vec!["tmp/**"]);
    assert!(!config.package.exclude_dev_dependencies);
    assert_eq!(
        config.functions["create"].handler.as_deref(),
        Some("handler.create")
    );
    assert_eq!(config.functions["create"].package.patterns, vec!["handler.js"]);
    assert_eq!(
        config.layers["shared"].path,
        std::path::PathBuf::from("layers/shared")
    );
    assert_eq!(config.dependencies.manager, "pnpm");
    assert_eq!(config.dependencies.manager_timeout_secs, 5);
    assert_eq!(config.dependencies.max_versions, 3);
    assert!(config.dependencies.no_deploy.is_empty());
}

#[test]
fn load_partial_config_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[service]
deployment_bucket = "partial-bucket"
"#;
    std::fs::write(tmp.path().join("slipway.toml"), toml).unwrap();

    let config = SlipwayConfig::load(tmp.path()).unwrap();

    assert_eq!(
        config.service.deployment_bucket.as_deref(),
        Some("partial-bucket")
    );
    // Defaults preserved
    assert_eq!(config.service.stage, "dev");
    assert!(config.package.exclude_dev_dependencies);
    assert_eq!(config.dependencies.install_timeout_secs, 600);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("slipway.toml"), "not valid {{{{ toml").unwrap();

    let result = SlipwayConfig::load(tmp.path());
    assert!(result.is_err());

    let err = result.unwrap_err();
    assert_eq!(err.code(), "CONFIG_PARSE");
    assert!(err.to_string().contains("parse"));
}

#[test]
fn load_empty_config_returns_defaults() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("slipway.toml"), "").unwrap();

    let config = SlipwayConfig::load(tmp.path()).unwrap();
    assert_eq!(config.service.region, "us-east-1");
}

#[test]
fn function_without_package_section_gets_empty_lists() {
    let config = SlipwayConfig::parse(
        r#"
[functions.ping]
handler = "ping.handler"
"#,
    )
    .unwrap();

    let package = &config.functions["ping"].package;
    assert!(!package.individually);
    assert!(package.artifact.is_none());
    assert!(package.include.is_empty());
    assert!(package.exclude.is_empty());
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name of the service configuration file, also excluded from every archive.
pub const CONFIG_FILE_NAME: &str = "slipway.toml";

/// slipway.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlipwayConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub package: PackageConfig,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionConfig>,
    #[serde(default)]
    pub layers: BTreeMap<String, LayerConfig>,
    #[serde(default)]
    pub dependencies: DependenciesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name (defaults to the service directory name)
    pub name: Option<String>,
    /// Deployment stage
    #[serde(default = "default_stage")]
    pub stage: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket holding uploaded artifacts and templates
    pub deployment_bucket: Option<String>,
    /// Key prefix under which each deployment is stored:
    /// `<prefix>/<service>/<stage>/<timestamp>/<file>`
    #[serde(default = "default_deployment_prefix")]
    pub deployment_prefix: String,
}

/// Service-wide packaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Package every function into its own artifact.
    #[serde(default)]
    pub individually: bool,
    /// Pre-built artifact; skips building the service archive.
    pub artifact: Option<PathBuf>,
    /// Ordered pattern list: plain entries include, `!`-prefixed entries exclude.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Legacy include list (`!` entries exclude).
    #[serde(default)]
    pub include: Vec<String>,
    /// Legacy exclude list (`!` entries re-include).
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Drop development-only node dependencies from archives.
    #[serde(default = "default_true")]
    pub exclude_dev_dependencies: bool,
}

/// Packaging settings for a single function or layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitPackageConfig {
    #[serde(default)]
    pub individually: bool,
    pub artifact: Option<PathBuf>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub handler: Option<String>,
    #[serde(default)]
    pub package: UnitPackageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Layer root, relative to the service directory
    pub path: PathBuf,
    #[serde(default)]
    pub package: UnitPackageConfig,
}

/// Dependency tooling: the node dependency lister used for dev-dependency
/// exclusion and the python installer behind the dependency cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenciesConfig {
    #[serde(default = "default_manager")]
    pub manager: String,
    #[serde(default = "default_manager_timeout")]
    pub manager_timeout_secs: u64,
    #[serde(default = "default_installer")]
    pub installer: String,
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
    /// Cache root (defaults to the per-user cache directory)
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of cached dependency trees; 0 keeps everything.
    #[serde(default)]
    pub max_versions: usize,
    /// Requirements never shipped because the runtime already provides them.
    #[serde(default = "default_no_deploy")]
    pub no_deploy: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: None,
            stage: default_stage(),
            region: default_region(),
            deployment_bucket: None,
            deployment_prefix: default_deployment_prefix(),
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            individually: false,
            artifact: None,
            patterns: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_dev_dependencies: true,
        }
    }
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            manager: default_manager(),
            manager_timeout_secs: default_manager_timeout(),
            installer: default_installer(),
            install_timeout_secs: default_install_timeout(),
            cache_dir: None,
            max_versions: 0,
            no_deploy: default_no_deploy(),
        }
    }
}

impl SlipwayConfig {
    /// Load from slipway.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &std::path::Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            Self::parse(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

fn default_true() -> bool {
    true
}

fn default_stage() -> String {
    "dev".to_owned()
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_deployment_prefix() -> String {
    "slipway".to_owned()
}

fn default_manager() -> String {
    "npm".to_owned()
}

fn default_manager_timeout() -> u64 {
    60
}

fn default_installer() -> String {
    "pip".to_owned()
}

fn default_install_timeout() -> u64 {
    600
}

fn default_no_deploy() -> Vec<String> {
    [
        "boto3",
        "botocore",
        "docutils",
        "jmespath",
        "pip",
        "python-dateutil",
        "s3transfer",
        "setuptools",
        "six",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to resolve service directory {path}")]
    ServiceDirResolve {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Service model ──
    #[error("artifact for {unit} not found at {path}")]
    ArtifactNotFound { unit: String, path: PathBuf },

    #[error(
        "function '{name}' is not declared; known functions: {}",
        format_names(available)
    )]
    UnknownFunction {
        name: String,
        available: Vec<String>,
    },

    #[error(
        "layer '{name}' is not declared; known layers: {}",
        format_names(available)
    )]
    UnknownLayer {
        name: String,
        available: Vec<String>,
    },
}

impl Error {
    /// Stable machine-readable code, for tooling that branches on error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigLoad { .. } => "CONFIG_LOAD",
            Self::ConfigParse { .. } => "CONFIG_PARSE",
            Self::ServiceDirResolve { .. } => "SERVICE_DIR_RESOLVE",
            Self::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            Self::UnknownFunction { .. } => "UNKNOWN_FUNCTION",
            Self::UnknownLayer { .. } => "UNKNOWN_LAYER",
        }
    }
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_owned()
    } else {
        names.join(", ")
    }
}

//! Python dependency installer backing the dependency cache.

use crate::cache::MANIFEST_FILE;
use crate::process::{self, ProcessError};
use slipway_core::DependenciesConfig;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

/// Runs `pip install -t <dir> -r <dir>/requirements.txt`.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    program: String,
    timeout: Duration,
}

impl PipInstaller {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DependenciesConfig) -> Self {
        Self::new(
            config.installer.clone(),
            Duration::from_secs(config.install_timeout_secs),
        )
    }

    /// Install the manifest already written into `target`.
    pub async fn install(&self, target: PathBuf) -> Result<(), ProcessError> {
        let manifest = target.join(MANIFEST_FILE);
        let args = [
            OsStr::new("install"),
            OsStr::new("-t"),
            target.as_os_str(),
            OsStr::new("-r"),
            manifest.as_os_str(),
        ];
        let output = process::run(&self.program, &args, &target, self.timeout).await?;
        tracing::debug!(
            target = %target.display(),
            stdout_bytes = output.stdout.len(),
            "installer finished"
        );
        Ok(())
    }
}

impl Default for PipInstaller {
    fn default() -> Self {
        Self::from_config(&DependenciesConfig::default())
    }
}

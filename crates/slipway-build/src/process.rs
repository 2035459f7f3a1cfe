//! External tool invocation with a deadline.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{program} not found or could not be started")]
    NotFound {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{program} did not finish within {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Run `program args…` in `cwd`, capturing output.
///
/// The child is killed if the deadline passes. A non-zero exit is an error
/// carrying the trimmed stderr.
pub async fn run(
    program: &str,
    args: &[&std::ffi::OsStr],
    cwd: &Path,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| ProcessError::TimedOut {
            program: program.to_owned(),
            timeout,
        })?
        .map_err(|e| ProcessError::NotFound {
            program: program.to_owned(),
            source: e,
        })?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(ProcessError::Failed {
            program: program.to_owned(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

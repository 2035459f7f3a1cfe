#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("aws CLI not found; install: https://aws.amazon.com/cli/")]
    NotFound { source: std::io::Error },

    #[error("aws command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("aws output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },
}

impl AwsError {
    fn stderr_contains(&self, marker: &str) -> bool {
        matches!(self, Self::CommandFailed { stderr, .. } if stderr.contains(marker))
    }

    pub fn is_no_such_bucket(&self) -> bool {
        self.stderr_contains("NoSuchBucket")
    }

    pub fn is_access_denied(&self) -> bool {
        self.stderr_contains("AccessDenied")
    }

    pub fn is_resource_not_found(&self) -> bool {
        self.stderr_contains("ResourceNotFoundException")
    }
}

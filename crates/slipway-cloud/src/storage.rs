//! Remote state the change detector reads: deployment objects in a bucket
//! and compute-function modification times.

use crate::aws::AwsError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Object metadata key holding the uploaded file's sha256 (base64).
pub const HASH_METADATA_KEY: &str = "filesha256";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl RemoteObject {
    /// The key segment preceding the file name (the deployment directory).
    pub fn directory(&self) -> Option<&str> {
        let mut segments = self.key.rsplit('/');
        segments.next()?;
        segments.next().filter(|s| !s.is_empty())
    }
}

#[allow(async_fn_in_trait)]
pub trait ObjectStorage: Send + Sync {
    /// Every object under `prefix`. An empty prefix listing is `Ok(vec![])`.
    async fn list_objects(&self, bucket: &str, prefix: &str)
    -> Result<Vec<RemoteObject>, StorageError>;

    /// User metadata of one object.
    async fn head_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<BTreeMap<String, String>, StorageError>;

    /// Upload `body`, recording its hash under [`HASH_METADATA_KEY`].
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &Path,
        sha256: &str,
    ) -> Result<(), StorageError>;
}

#[allow(async_fn_in_trait)]
pub trait FunctionRegistry: Send + Sync {
    async fn function_last_modified(&self, name: &str) -> Result<DateTime<Utc>, FunctionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("deployment bucket '{bucket}' does not exist")]
    BucketNotFound { bucket: String },

    #[error("access denied to bucket '{bucket}'")]
    AccessDenied { bucket: String, source: AwsError },

    #[error("storage request failed")]
    Request { source: AwsError },

    #[error("unexpected storage response")]
    Parse { source: serde_json::Error },
}

impl StorageError {
    pub(crate) fn from_aws(bucket: &str, err: AwsError) -> Self {
        if err.is_no_such_bucket() {
            Self::BucketNotFound {
                bucket: bucket.to_owned(),
            }
        } else if err.is_access_denied() {
            Self::AccessDenied {
                bucket: bucket.to_owned(),
                source: err,
            }
        } else {
            Self::Request { source: err }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
    #[error("not authorized to read function '{name}'")]
    AccessDenied { name: String, source: AwsError },

    #[error("function '{name}' does not exist")]
    NotFound { name: String },

    #[error("function request failed")]
    Request { source: AwsError },

    #[error("unexpected function configuration response")]
    Parse { source: serde_json::Error },

    #[error("invalid LastModified timestamp {value:?}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

impl FunctionError {
    pub(crate) fn from_aws(name: &str, err: AwsError) -> Self {
        if err.is_resource_not_found() {
            Self::NotFound {
                name: name.to_owned(),
            }
        } else if err.is_access_denied() {
            Self::AccessDenied {
                name: name.to_owned(),
                source: err,
            }
        } else {
            Self::Request { source: err }
        }
    }
}

//! Deployment change detection.
//!
//! A deployment can be skipped when the most recent remote deployment
//! directory holds exactly the files this build would upload (compared by
//! hash, as multisets) and no function was modified before those files were
//! uploaded. The latter catches a previous upload whose stack update never
//! completed.
//!
//! ```text
//! <prefix>/<service>/<stage>/
//!   1700000000000-2024-01-01T00:00:00.000Z/   older
//!   1700000500000-2024-01-01T00:08:20.000Z/   latest: compared
//!     compiled-template.json    metadata filesha256=…
//!     api.zip                   metadata filesha256=…
//! ```

use crate::storage::{
    FunctionError, FunctionRegistry, HASH_METADATA_KEY, ObjectStorage, RemoteObject,
    StorageError,
};
use crate::template::template_hash;
use chrono::{DateTime, Utc};
use serde_json::Value;
use slipway_build::digest::file_sha256_base64;
use slipway_core::ServiceModel;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Why a deployment must go ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployReason {
    Forced,
    NoPreviousDeployment,
    HashesDiffer { local: usize, remote: usize },
    FunctionOutdated { function: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Skip { directory: String },
    Deploy(DeployReason),
}

impl Verdict {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }
}

/// The latest remote deployment directory and its recorded hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDeployment {
    pub directory: String,
    pub objects: Vec<RemoteObject>,
    pub hashes: Vec<String>,
}

pub struct ChangeDetector<S: ObjectStorage, F: FunctionRegistry> {
    storage: S,
    functions: F,
    bucket: String,
    prefix: String,
    force: bool,
}

impl<S: ObjectStorage, F: FunctionRegistry> ChangeDetector<S, F> {
    pub fn new(
        storage: S,
        functions: F,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            functions,
            bucket: bucket.into(),
            prefix: listing_prefix(&prefix.into()),
            force: false,
        }
    }

    /// Detector for a service's configured deployment bucket and prefix.
    pub fn for_service(
        storage: S,
        functions: F,
        model: &ServiceModel,
    ) -> Result<Self, ChangeError> {
        let bucket = model
            .deployment_bucket
            .clone()
            .ok_or(ChangeError::BucketNotConfigured)?;
        Ok(Self::new(storage, functions, bucket, model.deployment_prefix()))
    }

    /// Always deploy.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub async fn should_skip_deployment(
        &self,
        artifacts: &[PathBuf],
        template: &Value,
        functions: &[String],
    ) -> Result<bool, ChangeError> {
        Ok(self.check(artifacts, template, functions).await?.is_skip())
    }

    /// Compare local state to the latest remote deployment.
    ///
    /// `functions` are deployed function names; artifacts missing on disk
    /// are ignored.
    ///
    /// # Errors
    ///
    /// - [`ChangeError::BucketNotFound`] if the deployment bucket is missing
    /// - [`ChangeError::Storage`] / [`ChangeError::Function`] for other read
    ///   failures (an unauthorized function read is not an error)
    pub async fn check(
        &self,
        artifacts: &[PathBuf],
        template: &Value,
        functions: &[String],
    ) -> Result<Verdict, ChangeError> {
        if self.force {
            tracing::info!("change detection bypassed (force)");
            return Ok(Verdict::Deploy(DeployReason::Forced));
        }

        let mut local = local_hashes(artifacts)?;
        local.push(template_hash(template));

        let Some(remote) = self.latest_deployment().await? else {
            tracing::info!(prefix = %self.prefix, "no previous deployment found");
            return Ok(Verdict::Deploy(DeployReason::NoPreviousDeployment));
        };

        if !same_multiset(&local, &remote.hashes) {
            tracing::info!(
                directory = %remote.directory,
                local = local.len(),
                remote = remote.hashes.len(),
                "artifacts differ from latest deployment"
            );
            return Ok(Verdict::Deploy(DeployReason::HashesDiffer {
                local: local.len(),
                remote: remote.hashes.len(),
            }));
        }

        let earliest = self.earliest_function_modification(functions).await?;
        if let Some((function, modified)) = earliest {
            let uploaded_later = remote
                .objects
                .iter()
                .any(|object| object.last_modified > modified);
            if uploaded_later {
                tracing::info!(
                    function = %function,
                    modified = %modified,
                    "function older than latest upload"
                );
                return Ok(Verdict::Deploy(DeployReason::FunctionOutdated { function }));
            }
        }

        tracing::info!(directory = %remote.directory, "deployment unchanged");
        Ok(Verdict::Skip {
            directory: remote.directory,
        })
    }

    /// Objects of the lexicographically greatest deployment directory, with
    /// their recorded hashes.
    pub async fn latest_deployment(&self) -> Result<Option<RemoteDeployment>, ChangeError> {
        let objects = self
            .storage
            .list_objects(&self.bucket, &self.prefix)
            .await
            .map_err(ChangeError::from_storage)?
            .into_iter()
            .filter(|object| object.key.starts_with(&self.prefix));

        let Some((directory, objects)) = latest_group(objects) else {
            return Ok(None);
        };

        let heads = objects
            .iter()
            .map(|object| self.storage.head_metadata(&self.bucket, &object.key));
        let metadata = futures::future::try_join_all(heads)
            .await
            .map_err(ChangeError::from_storage)?;

        let hashes = objects
            .iter()
            .zip(metadata)
            .filter_map(|(object, mut metadata)| {
                let hash = metadata.remove(HASH_METADATA_KEY);
                if hash.is_none() {
                    tracing::debug!(key = %object.key, "remote object has no hash metadata");
                }
                hash
            })
            .collect();

        Ok(Some(RemoteDeployment {
            directory,
            objects,
            hashes,
        }))
    }

    /// The function with the oldest last-modified time. Unauthorized or
    /// missing functions count as never modified.
    async fn earliest_function_modification(
        &self,
        functions: &[String],
    ) -> Result<Option<(String, DateTime<Utc>)>, ChangeError> {
        let lookups = functions.iter().map(|name| async move {
            let modified = match self.functions.function_last_modified(name).await {
                Ok(modified) => modified,
                Err(FunctionError::AccessDenied { .. }) => {
                    tracing::warn!(
                        function = %name,
                        "not authorized to read function; assuming it needs deployment"
                    );
                    DateTime::<Utc>::UNIX_EPOCH
                }
                Err(FunctionError::NotFound { .. }) => {
                    tracing::debug!(function = %name, "function not deployed yet");
                    DateTime::<Utc>::UNIX_EPOCH
                }
                Err(e) => return Err(ChangeError::Function { source: e }),
            };
            Ok((name.clone(), modified))
        });

        let times = futures::future::try_join_all(lookups).await?;
        Ok(times.into_iter().min_by(|a, b| a.1.cmp(&b.1)))
    }
}

fn local_hashes(artifacts: &[PathBuf]) -> Result<Vec<String>, ChangeError> {
    artifacts
        .iter()
        .filter(|path| path.is_file())
        .map(|path| hash_artifact(path))
        .collect()
}

fn hash_artifact(path: &Path) -> Result<String, ChangeError> {
    file_sha256_base64(path).map_err(|e| ChangeError::LocalRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Group objects by deployment directory and keep the greatest. Objects
/// directly under the bucket root belong to no directory.
fn latest_group(
    objects: impl IntoIterator<Item = RemoteObject>,
) -> Option<(String, Vec<RemoteObject>)> {
    let mut groups: BTreeMap<String, Vec<RemoteObject>> = BTreeMap::new();
    for object in objects {
        if let Some(directory) = object.directory().map(str::to_owned) {
            groups.entry(directory).or_default().push(object);
        }
    }
    groups.pop_last()
}

/// `prefix` as a directory: `a/b` lists `a/b/...` and never a sibling such
/// as `a/b2/...`. An empty prefix stays empty.
fn listing_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

fn same_multiset(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error("service has no deployment bucket configured")]
    BucketNotConfigured,

    #[error("deployment bucket '{bucket}' does not exist")]
    BucketNotFound { bucket: String },

    #[error("failed to read remote deployment state")]
    Storage { source: StorageError },

    #[error("failed to read function state")]
    Function { source: FunctionError },

    #[error("failed to hash local artifact {path}")]
    LocalRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ChangeError {
    fn from_storage(err: StorageError) -> Self {
        match err {
            StorageError::BucketNotFound { bucket } => Self::BucketNotFound { bucket },
            other => Self::Storage { source: other },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BucketNotConfigured => "DEPLOYMENT_BUCKET_NOT_CONFIGURED",
            Self::BucketNotFound { .. } => "DEPLOYMENT_BUCKET_NOT_FOUND",
            Self::Storage { .. } | Self::Function { .. } => "REMOTE_READ_FAILED",
            Self::LocalRead { .. } => "ARCHIVE_IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str) -> RemoteObject {
        RemoteObject {
            key: key.to_owned(),
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn latest_group_picks_greatest_directory() {
        let (directory, objects) = latest_group(vec![
            object("p/2-b/api.zip"),
            object("p/1-a/api.zip"),
            object("p/2-b/template.json"),
            object("stray.txt"),
        ])
        .unwrap();

        assert_eq!(directory, "2-b");
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["p/2-b/api.zip", "p/2-b/template.json"]);
    }

    #[test]
    fn latest_group_of_nothing_is_none() {
        assert!(latest_group(Vec::new()).is_none());
        assert!(latest_group(vec![object("stray.txt")]).is_none());
    }

    #[test]
    fn listing_prefix_ends_with_one_slash() {
        assert_eq!(listing_prefix("slipway/api/dev"), "slipway/api/dev/");
        assert_eq!(listing_prefix("slipway/api/dev//"), "slipway/api/dev/");
        assert_eq!(listing_prefix(""), "");
    }

    #[test]
    fn multiset_comparison_ignores_order_not_counts() {
        let a = vec!["x".to_owned(), "y".to_owned(), "x".to_owned()];
        let b = vec!["x".to_owned(), "x".to_owned(), "y".to_owned()];
        let c = vec!["x".to_owned(), "y".to_owned(), "y".to_owned()];
        assert!(same_multiset(&a, &b));
        assert!(!same_multiset(&a, &c));
    }
}

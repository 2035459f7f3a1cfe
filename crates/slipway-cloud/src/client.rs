use crate::aws::AwsError;
use crate::executor::{AwsExecutor, RealExecutor};
use crate::storage::{
    FunctionError, FunctionRegistry, HASH_METADATA_KEY, ObjectStorage, RemoteObject,
    StorageError,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Lambda reports `2024-01-05T10:20:30.123+0000`, which is not RFC 3339.
const LAMBDA_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// AWS operations client, parameterized over the executor for testability.
pub struct AwsClient<E: AwsExecutor = RealExecutor> {
    executor: E,
    region: Option<String>,
}

impl AwsClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
            region: None,
        }
    }
}

impl Default for AwsClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: AwsExecutor> AwsClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    async fn exec(&self, mut command: Vec<String>) -> Result<String, AwsError> {
        if let Some(region) = &self.region {
            command.push("--region".to_owned());
            command.push(region.clone());
        }
        self.executor.exec(&command).await
    }
}

// ── Object storage ──

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsOutput {
    #[serde(default)]
    contents: Vec<ObjectSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectSummary {
    key: String,
    last_modified: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HeadObjectOutput {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl<E: AwsExecutor> ObjectStorage for AwsClient<E> {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<RemoteObject>, StorageError> {
        let output = self
            .exec(args([
                "s3api",
                "list-objects-v2",
                "--bucket",
                bucket,
                "--prefix",
                prefix,
                "--output",
                "json",
            ]))
            .await
            .map_err(|e| StorageError::from_aws(bucket, e))?;

        // An empty listing prints nothing at all.
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: ListObjectsOutput =
            serde_json::from_str(&output).map_err(|e| StorageError::Parse { source: e })?;
        Ok(parsed
            .contents
            .into_iter()
            .map(|o| RemoteObject {
                key: o.key,
                last_modified: o.last_modified,
            })
            .collect())
    }

    async fn head_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<BTreeMap<String, String>, StorageError> {
        let output = self
            .exec(args([
                "s3api",
                "head-object",
                "--bucket",
                bucket,
                "--key",
                key,
                "--output",
                "json",
            ]))
            .await
            .map_err(|e| StorageError::from_aws(bucket, e))?;

        let parsed: HeadObjectOutput =
            serde_json::from_str(&output).map_err(|e| StorageError::Parse { source: e })?;
        Ok(parsed.metadata)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &Path,
        sha256: &str,
    ) -> Result<(), StorageError> {
        let body = body.to_string_lossy();
        let metadata = format!("{HASH_METADATA_KEY}={sha256}");
        self.exec(args([
            "s3api",
            "put-object",
            "--bucket",
            bucket,
            "--key",
            key,
            "--body",
            &body,
            "--metadata",
            &metadata,
        ]))
        .await
        .map_err(|e| StorageError::from_aws(bucket, e))?;

        tracing::debug!(bucket, key, "object uploaded");
        Ok(())
    }
}

// ── Functions ──

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionConfiguration {
    last_modified: String,
}

impl<E: AwsExecutor> FunctionRegistry for AwsClient<E> {
    async fn function_last_modified(&self, name: &str) -> Result<DateTime<Utc>, FunctionError> {
        let output = self
            .exec(args([
                "lambda",
                "get-function-configuration",
                "--function-name",
                name,
                "--output",
                "json",
            ]))
            .await
            .map_err(|e| FunctionError::from_aws(name, e))?;

        let parsed: FunctionConfiguration =
            serde_json::from_str(&output).map_err(|e| FunctionError::Parse { source: e })?;
        parse_lambda_timestamp(&parsed.last_modified)
    }
}

fn parse_lambda_timestamp(value: &str) -> Result<DateTime<Utc>, FunctionError> {
    DateTime::parse_from_str(value, LAMBDA_TIMESTAMP_FORMAT)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FunctionError::Timestamp {
            value: value.to_owned(),
            source: e,
        })
}

// ── Helper ──

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

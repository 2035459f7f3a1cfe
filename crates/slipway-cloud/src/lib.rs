//! AWS storage and function lookups plus deployment change detection.
//!
//! # Change detection
//!
//! ```text
//! slipway check
//!   1. Template  ── normalize build noise → sha256
//!   2. Artifacts ── sha256 of every local archive
//!   3. Remote    ── aws s3api list-objects-v2 → latest directory → head-object (filesha256)
//!   4. Functions ── aws lambda get-function-configuration → LastModified
//!   5. Verdict   ── skip iff hashes match and no function predates the upload
//! ```

pub mod aws;
pub mod changes;
pub mod client;
pub mod executor;
pub mod storage;
pub mod template;

pub use aws::AwsError;
pub use changes::{ChangeDetector, ChangeError, DeployReason, RemoteDeployment, Verdict};
pub use client::AwsClient;
pub use executor::{AwsExecutor, RealExecutor};
pub use storage::{
    FunctionError, FunctionRegistry, HASH_METADATA_KEY, ObjectStorage, RemoteObject,
    StorageError,
};
pub use template::{normalize_template, template_hash};

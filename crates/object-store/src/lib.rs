//! Object storage side of a distribution run.
//!
//! This crate keeps a remote object store in sync with a locally
//! materialized distribution tree:
//!
//! - [`Publisher`] lists the remote state, uploads whatever is missing or
//!   changed, and orders uploads so index files never reference objects
//!   that are not there yet. It never deletes.
//! - [`RetentionPolicy`] is a separate pass that purges dated artifacts
//!   older than the retention horizon.
//!
//! Backends (S3/MinIO, local filesystem, memory) are reached through the
//! [`ObjectStoreClient`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tekdist_object_store::{LocalTree, ObjectStoreConfig, PublishConfig, Publisher, Storage};
//!
//! # async fn example() -> Result<(), tekdist_object_store::StoreError> {
//! let storage = Storage::new(ObjectStoreConfig::Memory).await?;
//! let tree = LocalTree::scan("/tmp/out".as_ref(), "", "index")?;
//! let summary = Publisher::new(Arc::new(storage), PublishConfig::default())
//!     .publish(&tree)
//!     .await?;
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod local;
mod publisher;
mod retention;
mod retry;
mod storage;

pub use client::{ObjectStoreClient, RemoteObject};
pub use error::{Result, StoreError};
pub use local::{content_hash, LocalFile, LocalTree};
pub use publisher::{
    FailureReason, PartialPublishWarning, PublishConfig, PublishFailure, PublishSummary, Publisher,
};
pub use retention::{RetentionConfig, RetentionPolicy, RetentionSummary};
pub use storage::{HashSource, ObjectStoreConfig, Storage};

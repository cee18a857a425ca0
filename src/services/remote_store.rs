//! src/services/remote_store.rs
//!
//! The object-store contract the transfer engine drives. Implementations
//! only need HEAD, ranged GET, PUT and the multipart primitives; signing and
//! wire format are theirs to choose.

use crate::models::transfer::{ByteRange, CompletedPart, StorageTier};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{namespace}/{bucket}` not found")]
    BucketNotFound { namespace: String, bucket: String },
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("range {range} is outside an object of {size} bytes")]
    InvalidRange { range: ByteRange, size: u64 },
    #[error("multipart upload `{0}` not found")]
    UploadNotFound(String),
    #[error("part {part_number} of upload `{upload_id}` is missing or has a different etag")]
    PartMismatch { upload_id: String, part_number: u32 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Answer to a HEAD probe on an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Declared content length; authoritative for downloads.
    pub content_length: u64,
    pub etag: Option<String>,
}

/// Object-store operations required by the engine.
///
/// `head` returns `Ok(None)` when the object does not exist; `Err` is reserved
/// for the store failing to answer at all.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn head(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
    ) -> StoreResult<Option<ObjectHead>>;

    /// Fetch the inclusive byte range of an object.
    async fn get_range(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        range: ByteRange,
    ) -> StoreResult<Bytes>;

    /// Store a whole object in one call. Either all bytes land or none do.
    async fn put(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        data: Bytes,
        tier: StorageTier,
    ) -> StoreResult<()>;

    /// Open a multipart session and return its upload id.
    async fn create_multipart_upload(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        tier: StorageTier,
    ) -> StoreResult<String>;

    /// Upload one part and return its integrity tag.
    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<String>;

    /// Stitch the listed parts, in the given order, into the final object.
    async fn commit_multipart_upload(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()>;

    /// Discard an uncommitted session and its staged parts.
    async fn abort_multipart_upload(&self, upload_id: &str) -> StoreResult<()>;
}

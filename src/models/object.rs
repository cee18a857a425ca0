//! Represents an object (blob) committed to the local object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a committed object. The payload lives on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object name within the bucket.
    pub key: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, or `md5(part md5s)-N` for multipart objects.
    pub etag: String,

    /// Storage tier the object was written with (e.g. STANDARD, ARCHIVE).
    pub storage_class: String,

    /// Timestamp when object was last written.
    pub last_modified: DateTime<Utc>,
}

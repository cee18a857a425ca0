//! Represents multipart upload sessions and their staged parts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A multipart upload session, opened before uploading a file in parts.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MultipartUpload {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Parent bucket ID.
    pub bucket_id: Uuid,

    /// Object name being uploaded.
    pub key: String,

    /// Unique upload ID (returned to client).
    pub upload_id: String,

    /// Storage tier requested when the session was opened.
    pub storage_class: String,

    /// Timestamp when upload was initiated.
    pub initiated_at: DateTime<Utc>,
}

/// A single staged part of a multipart upload session.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MultipartPart {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Reference to parent upload session.
    pub upload_id: Uuid,

    /// Part number (1-based).
    pub part_number: i64,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the part payload.
    pub etag: String,

    /// Timestamp when this part was uploaded.
    pub uploaded_at: DateTime<Utc>,
}

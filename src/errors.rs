//! Error types surfaced by the transfer engine, the multipart coordinator,
//! the manifest store and the orchestrator.
//!
//! Every failure path yields a `TransferError`; callers that only care about
//! the broad category match on [`TransferError::kind`].

use crate::{models::transfer::ByteRange, services::remote_store::StoreError};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Broad failure category used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Object, local file or manifest entry is absent.
    NotFound,
    /// Something is already tracked or already present.
    Conflict,
    /// A chunk, PUT or part ran out of attempts.
    TransferExhausted,
    /// Every part landed but the session could not be finalized.
    CommitFailed,
    /// The remote store refused to open an upload session or to say
    /// whether an object exists.
    Rejected,
    /// Local filesystem or manifest I/O failed.
    LocalIo,
    /// The job was stopped through its cancellation token.
    Cancelled,
    /// A caller-supplied parameter was out of range.
    InvalidArgument,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("object `{object}` not found in {namespace}/{bucket}")]
    ObjectNotFound {
        namespace: String,
        bucket: String,
        object: String,
    },
    #[error("local file `{}` not found", .0.display())]
    LocalFileNotFound(PathBuf),
    #[error("`{0}` is not tracked")]
    NotTracked(String),
    #[error("`{0}` is already tracked")]
    AlreadyTracked(String),
    #[error("object `{object}` already exists in {namespace}/{bucket}")]
    AlreadyExists {
        namespace: String,
        bucket: String,
        object: String,
    },
    #[error("local file `{}` already exists", .0.display())]
    LocalFileExists(PathBuf),
    #[error("range {range} of `{object}` failed after {attempts} attempts")]
    ChunkExhausted {
        object: String,
        range: ByteRange,
        attempts: u32,
    },
    #[error("upload of `{object}` failed after {attempts} attempts")]
    UploadExhausted { object: String, attempts: u32 },
    #[error("multipart upload of `{object}` left {remaining} parts unsent after spending a budget of {budget}")]
    PartUploadExhausted {
        object: String,
        remaining: usize,
        budget: u64,
    },
    #[error("could not open a multipart upload for `{object}`: {source}")]
    UploadInitFailed {
        object: String,
        #[source]
        source: StoreError,
    },
    #[error("could not check whether `{object}` exists in {namespace}/{bucket}: {source}")]
    ExistenceCheckFailed {
        namespace: String,
        bucket: String,
        object: String,
        #[source]
        source: StoreError,
    },
    #[error("commit of upload `{upload_id}` failed after {attempts} attempts")]
    CommitFailed { upload_id: String, attempts: u32 },
    #[error("transfer of `{0}` was cancelled")]
    Cancelled(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("I/O error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest `{}` is malformed: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type TransferResult<T> = Result<T, TransferError>;

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::ObjectNotFound { .. }
            | TransferError::LocalFileNotFound(_)
            | TransferError::NotTracked(_) => ErrorKind::NotFound,
            TransferError::AlreadyTracked(_)
            | TransferError::AlreadyExists { .. }
            | TransferError::LocalFileExists(_) => ErrorKind::Conflict,
            TransferError::ChunkExhausted { .. }
            | TransferError::UploadExhausted { .. }
            | TransferError::PartUploadExhausted { .. } => ErrorKind::TransferExhausted,
            TransferError::UploadInitFailed { .. }
            | TransferError::ExistenceCheckFailed { .. } => ErrorKind::Rejected,
            TransferError::CommitFailed { .. } => ErrorKind::CommitFailed,
            TransferError::Cancelled(_) => ErrorKind::Cancelled,
            TransferError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            TransferError::Io { .. } | TransferError::Manifest { .. } => ErrorKind::LocalIo,
        }
    }

    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn object_not_found(namespace: &str, bucket: &str, object: &str) -> Self {
        TransferError::ObjectNotFound {
            namespace: namespace.to_string(),
            bucket: bucket.to_string(),
            object: object.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            TransferError::object_not_found("ns", "b", "o").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            TransferError::AlreadyTracked("/w/a".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            TransferError::ChunkExhausted {
                object: "o".into(),
                range: ByteRange::new(0, 9),
                attempts: 3,
            }
            .kind(),
            ErrorKind::TransferExhausted
        );
        assert_eq!(
            TransferError::CommitFailed {
                upload_id: "u".into(),
                attempts: 3
            }
            .kind(),
            ErrorKind::CommitFailed
        );
        assert_eq!(
            TransferError::io("/tmp/x", io::Error::other("boom")).kind(),
            ErrorKind::LocalIo
        );
    }

    #[test]
    fn chunk_error_names_the_range() {
        let err = TransferError::ChunkExhausted {
            object: "big.bin".into(),
            range: ByteRange::new(8192, 16383),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "range 8192-16383 of `big.bin` failed after 3 attempts"
        );
    }
}

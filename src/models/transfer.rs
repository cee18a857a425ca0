//! Ephemeral per-call transfer state: jobs, byte ranges and upload parts.
//!
//! Nothing in here is persisted; every value is created when a download or
//! upload starts and dropped when the call returns.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Chunk size used when the caller does not pick one.
pub const DEFAULT_CHUNK_SIZE: u64 = 8192;

/// Attempt ceiling used when the caller does not pick one.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// An inclusive byte range `[start, end]`, rendered as `"start-end"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Split `[0, object_size)` into ascending ranges of at most `chunk_size`
    /// bytes, produced lazily. An empty object yields no ranges.
    pub fn partition(object_size: u64, chunk_size: u64) -> ByteRanges {
        ByteRanges {
            next_start: 0,
            object_size,
            chunk_size,
        }
    }
}

/// Lazy sequence of chunk ranges returned by [`ByteRange::partition`].
#[derive(Debug, Clone)]
pub struct ByteRanges {
    next_start: u64,
    object_size: u64,
    chunk_size: u64,
}

impl Iterator for ByteRanges {
    type Item = ByteRange;

    fn next(&mut self) -> Option<ByteRange> {
        if self.chunk_size == 0 || self.next_start >= self.object_size {
            return None;
        }
        let start = self.next_start;
        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(self.object_size - 1);
        self.next_start = end + 1;
        Some(ByteRange::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.chunk_size == 0 {
            return (0, Some(0));
        }
        let left = self.object_size.saturating_sub(self.next_start);
        let count = usize::try_from(left.div_ceil(self.chunk_size)).unwrap_or(usize::MAX);
        (count, Some(count))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Lifecycle of a single download or upload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Which way a job moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
    MultipartUpload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
            Direction::MultipartUpload => "multipart upload",
        };
        f.write_str(label)
    }
}

/// Book-keeping for one transfer call.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub direction: Direction,
    pub object_name: String,
    /// Size as declared by HEAD (downloads) or the local file (uploads).
    pub object_size: u64,
    pub chunk_size: u64,
    pub attempts_per_chunk: u32,
    pub state: JobState,
    /// Bytes confirmed written or uploaded so far.
    pub bytes_done: u64,
    /// Every remote call issued for payload transfer, successful or not.
    pub attempts_used: u64,
    pub failed_attempts: u64,
}

impl TransferJob {
    pub fn new(
        direction: Direction,
        object_name: impl Into<String>,
        object_size: u64,
        chunk_size: u64,
        attempts_per_chunk: u32,
    ) -> Self {
        Self {
            direction,
            object_name: object_name.into(),
            object_size,
            chunk_size,
            attempts_per_chunk,
            state: JobState::Pending,
            bytes_done: 0,
            attempts_used: 0,
            failed_attempts: 0,
        }
    }

    pub fn start(&mut self) {
        if self.state == JobState::Pending {
            self.state = JobState::InProgress;
        }
    }

    pub fn complete(&mut self) {
        self.state = JobState::Completed;
    }

    pub fn fail(&mut self) {
        self.state = JobState::Failed;
    }

    pub fn record_attempt(&mut self, succeeded: bool) {
        self.attempts_used += 1;
        if !succeeded {
            self.failed_attempts += 1;
        }
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            direction: self.direction,
            object_name: self.object_name.clone(),
            bytes_done: self.bytes_done,
            total_bytes: self.object_size,
            state: self.state,
        }
    }
}

/// Snapshot handed to a `TransferObserver`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub direction: Direction,
    pub object_name: String,
    pub bytes_done: u64,
    pub total_bytes: u64,
    pub state: JobState,
}

impl TransferProgress {
    /// Completion ratio in `[0.0, 1.0]`; an empty object counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_done as f64 / self.total_bytes as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartState {
    Queued,
    Uploaded { etag: String },
}

/// One slice of a local file in a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    /// 1-based part number.
    pub part_number: u32,
    pub byte_offset: u64,
    pub len: u64,
    pub state: PartState,
}

impl UploadPart {
    /// Partition a file of `file_size` bytes into parts of `chunk_size`.
    ///
    /// A zero-byte file still produces a single empty part so that the
    /// session has something to commit.
    pub fn partition(file_size: u64, chunk_size: u64) -> Vec<UploadPart> {
        if file_size == 0 {
            return vec![UploadPart {
                part_number: 1,
                byte_offset: 0,
                len: 0,
                state: PartState::Queued,
            }];
        }
        ByteRange::partition(file_size, chunk_size)
            .enumerate()
            .map(|(idx, range)| UploadPart {
                part_number: idx as u32 + 1,
                byte_offset: range.start,
                len: range.len(),
                state: PartState::Queued,
            })
            .collect()
    }

    pub fn etag(&self) -> Option<&str> {
        match &self.state {
            PartState::Uploaded { etag } => Some(etag),
            PartState::Queued => None,
        }
    }
}

/// A `(partNumber, eTag)` pair listed in a commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Storage tier requested for an uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageTier {
    #[default]
    Standard,
    InfrequentAccess,
    Archive,
}

impl StorageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Standard => "STANDARD",
            StorageTier::InfrequentAccess => "INFREQUENT_ACCESS",
            StorageTier::Archive => "ARCHIVE",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "standard" => Ok(StorageTier::Standard),
            "infrequentaccess" => Ok(StorageTier::InfrequentAccess),
            "archive" => Ok(StorageTier::Archive),
            other => Err(format!("unknown storage tier `{}`", other)),
        }
    }
}

/// What a successful upload reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub object_name: String,
    pub bytes: u64,
    /// Remote calls issued for payload transfer (PUTs or part uploads).
    pub attempts: u64,
    pub failed_attempts: u64,
    /// Committed parts in part-number order; empty for single-shot uploads.
    pub parts: Vec<CompletedPart>,
}

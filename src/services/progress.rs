//! Progress reporting for transfers.
//!
//! Components receive an observer at construction instead of writing to a
//! process-wide sink. The binary wires in [`TracingObserver`]; unit tests
//! record events with `RecordingObserver`.

use crate::models::transfer::{ByteRange, TransferProgress};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Receives transfer events. All methods default to doing nothing.
pub trait TransferObserver: Send + Sync {
    /// Called after every chunk or part lands, and once at the end.
    fn on_progress(&self, _progress: &TransferProgress) {}

    /// Called after a failed attempt on a chunk, PUT, part or commit.
    fn on_retry(&self, _object: &str, _what: RetryTarget, _attempt: u64, _reason: &str) {}
}

/// What a failed attempt was trying to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTarget {
    Chunk(ByteRange),
    Put,
    Part(u32),
    Commit,
}

pub type SharedObserver = Arc<dyn TransferObserver>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn on_progress(&self, progress: &TransferProgress) {
        debug!(
            "{} `{}`: {}/{} bytes ({:.1}%)",
            progress.direction,
            progress.object_name,
            progress.bytes_done,
            progress.total_bytes,
            progress.fraction() * 100.0
        );
        if progress.bytes_done == progress.total_bytes {
            info!(
                "{} `{}` reached {} bytes",
                progress.direction, progress.object_name, progress.total_bytes
            );
        }
    }

    fn on_retry(&self, object: &str, what: RetryTarget, attempt: u64, reason: &str) {
        warn!("`{}` {:?} attempt {} failed: {}", object, what, attempt, reason);
    }
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    progress: Arc<Mutex<Vec<TransferProgress>>>,
    retries: Arc<Mutex<Vec<(RetryTarget, u64)>>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> Vec<TransferProgress> {
        self.progress
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Failed attempts as `(target, attempt number for that target)`.
    pub fn retries(&self) -> Vec<(RetryTarget, u64)> {
        self.retries
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl TransferObserver for RecordingObserver {
    fn on_progress(&self, progress: &TransferProgress) {
        if let Ok(mut events) = self.progress.lock() {
            events.push(progress.clone());
        }
    }

    fn on_retry(&self, _object: &str, what: RetryTarget, attempt: u64, _reason: &str) {
        if let Ok(mut events) = self.retries.lock() {
            events.push((what, attempt));
        }
    }
}

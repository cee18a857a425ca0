//! src/services/multipart.rs
//!
//! MultipartUploadCoordinator — splits a local file into fixed-size parts and
//! drains them through the store's multipart API under one shared retry
//! budget. The session is committed only when every part holds an etag;
//! otherwise it is aborted.

use crate::{
    errors::{TransferError, TransferResult},
    models::transfer::{
        CompletedPart, Direction, PartState, StorageTier, TransferJob, UploadPart, UploadSummary,
    },
    services::{
        progress::{RetryTarget, SharedObserver},
        remote_store::RemoteStore,
        transfer_engine::{check_upload_target, local_read_error, validate_params},
    },
};
use bytes::Bytes;
use std::{
    collections::VecDeque,
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct MultipartUploadCoordinator {
    store: Arc<dyn RemoteStore>,
    observer: SharedObserver,
    working_dir: PathBuf,
    cancel: CancellationToken,
}

impl MultipartUploadCoordinator {
    pub fn new(store: Arc<dyn RemoteStore>, observer: SharedObserver) -> Self {
        Self {
            store,
            observer,
            working_dir: PathBuf::from("."),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = dir.into();
    }

    fn resolve_local(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Upload `local_file` as `object` in parts of `chunk_size` bytes.
    ///
    /// The budget is `attempts_per_chunk * part_count` failed part uploads,
    /// shared by all parts. A part that fails goes to the back of the queue.
    /// The commit call itself gets `attempts_per_chunk` attempts.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload_multipart(
        &self,
        namespace: &str,
        bucket: &str,
        local_file: impl AsRef<Path>,
        object: &str,
        chunk_size: u64,
        attempts_per_chunk: u32,
        tier: Option<StorageTier>,
        replace_existing: bool,
    ) -> TransferResult<UploadSummary> {
        validate_params(chunk_size, attempts_per_chunk)?;

        check_upload_target(self.store.as_ref(), namespace, bucket, object, replace_existing)
            .await?;

        let path = self.resolve_local(local_file.as_ref());
        let mut file = File::open(&path)
            .await
            .map_err(|err| local_read_error(&path, err))?;
        let file_size = file
            .metadata()
            .await
            .map_err(|err| TransferError::io(&path, err))?
            .len();

        let tier = tier.unwrap_or_default();
        let upload_id = self
            .store
            .create_multipart_upload(namespace, bucket, object, tier)
            .await
            .map_err(|source| TransferError::UploadInitFailed {
                object: object.to_string(),
                source,
            })?;

        let mut parts = UploadPart::partition(file_size, chunk_size);
        let budget = attempts_per_chunk as u64 * parts.len() as u64;
        let mut job = TransferJob::new(
            Direction::MultipartUpload,
            object,
            file_size,
            chunk_size,
            attempts_per_chunk,
        );
        job.start();
        info!(
            "multipart upload `{}` ({} bytes, {} parts, budget {}) as session {}",
            object,
            file_size,
            parts.len(),
            budget,
            upload_id
        );

        let drained = self
            .drain_parts(&mut file, &path, &upload_id, &mut parts, &mut job, budget)
            .await;
        let remaining = match drained {
            Ok(remaining) => remaining,
            Err(err) => {
                job.fail();
                self.abort(&upload_id).await;
                return Err(err);
            }
        };

        let completed: Option<Vec<CompletedPart>> = parts
            .iter()
            .map(|part| {
                part.etag().map(|etag| CompletedPart {
                    part_number: part.part_number,
                    etag: etag.to_string(),
                })
            })
            .collect();
        let completed = match completed {
            Some(completed) if remaining == 0 => completed,
            _ => {
                job.fail();
                self.observer.on_progress(&job.progress());
                warn!(
                    "multipart upload `{}` gave up with {} parts unsent",
                    object, remaining
                );
                self.abort(&upload_id).await;
                return Err(TransferError::PartUploadExhausted {
                    object: object.to_string(),
                    remaining,
                    budget,
                });
            }
        };

        if let Err(err) = self
            .commit(&upload_id, &completed, object, attempts_per_chunk)
            .await
        {
            job.fail();
            self.observer.on_progress(&job.progress());
            self.abort(&upload_id).await;
            return Err(err);
        }

        job.complete();
        self.observer.on_progress(&job.progress());
        info!(
            "committed `{}`: {} parts, {} attempts ({} failed)",
            object,
            completed.len(),
            job.attempts_used,
            job.failed_attempts
        );
        Ok(UploadSummary {
            object_name: object.to_string(),
            bytes: file_size,
            attempts: job.attempts_used,
            failed_attempts: job.failed_attempts,
            parts: completed,
        })
    }

    /// Work the FIFO queue until it is empty or the failure budget is spent.
    /// Returns the number of parts still queued.
    async fn drain_parts(
        &self,
        file: &mut File,
        path: &Path,
        upload_id: &str,
        parts: &mut [UploadPart],
        job: &mut TransferJob,
        budget: u64,
    ) -> TransferResult<usize> {
        let mut queue: VecDeque<usize> = (0..parts.len()).collect();
        let mut tries = vec![0u64; parts.len()];
        let mut budget_left = budget;

        while let Some(idx) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled(job.object_name.clone()));
            }
            let part_number = parts[idx].part_number;
            let data = read_part(file, path, &parts[idx]).await?;
            let len = data.len() as u64;
            tries[idx] += 1;

            match self.store.upload_part(upload_id, part_number, data).await {
                Ok(etag) => {
                    job.record_attempt(true);
                    job.bytes_done += len;
                    debug!("part {} of `{}` stored as {}", part_number, job.object_name, etag);
                    parts[idx].state = PartState::Uploaded { etag };
                    self.observer.on_progress(&job.progress());
                }
                Err(err) => {
                    job.record_attempt(false);
                    self.observer.on_retry(
                        &job.object_name,
                        RetryTarget::Part(part_number),
                        tries[idx],
                        &err.to_string(),
                    );
                    if budget_left == 0 {
                        queue.push_front(idx);
                        break;
                    }
                    budget_left -= 1;
                    queue.push_back(idx);
                }
            }
        }

        Ok(queue.len())
    }

    async fn commit(
        &self,
        upload_id: &str,
        completed: &[CompletedPart],
        object: &str,
        attempts: u32,
    ) -> TransferResult<()> {
        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled(object.to_string()));
            }
            match self
                .store
                .commit_multipart_upload(upload_id, completed)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => self.observer.on_retry(
                    object,
                    RetryTarget::Commit,
                    attempt as u64,
                    &err.to_string(),
                ),
            }
        }
        Err(TransferError::CommitFailed {
            upload_id: upload_id.to_string(),
            attempts,
        })
    }

    /// Abort a session we are walking away from. Failure is only logged.
    async fn abort(&self, upload_id: &str) {
        match self.store.abort_multipart_upload(upload_id).await {
            Ok(()) => debug!("aborted multipart session {}", upload_id),
            Err(err) => warn!("could not abort multipart session {}: {}", upload_id, err),
        }
    }
}

async fn read_part(file: &mut File, path: &Path, part: &UploadPart) -> TransferResult<Bytes> {
    let mut buf = vec![0u8; part.len as usize];
    file.seek(SeekFrom::Start(part.byte_offset))
        .await
        .map_err(|err| TransferError::io(path, err))?;
    file.read_exact(&mut buf)
        .await
        .map_err(|err| TransferError::io(path, err))?;
    Ok(Bytes::from(buf))
}

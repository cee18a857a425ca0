//! src/services/transfer_engine.rs
//!
//! TransferEngine — chunked ranged download and single-shot upload against a
//! `RemoteStore`, each with a bounded number of attempts.
//!
//! Downloads stream into an exclusively created temp file next to the
//! target and are renamed into place only once every chunk has landed, so
//! the target path never holds a partial object.

use crate::{
    errors::{TransferError, TransferResult},
    models::transfer::{ByteRange, Direction, StorageTier, TransferJob, UploadSummary},
    services::{
        progress::{RetryTarget, SharedObserver},
        remote_store::{ObjectHead, RemoteStore},
    },
};
use bytes::Bytes;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest object accepted by a single PUT. Bigger files go multipart.
pub const SINGLE_PUT_LIMIT: u64 = 50 * 1024 * 1024 * 1024;

/// Reject zero chunk sizes and zero attempt ceilings up front.
pub(crate) fn validate_params(chunk_size: u64, attempts: u32) -> TransferResult<()> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidArgument(
            "chunk size must be positive".into(),
        ));
    }
    if attempts == 0 {
        return Err(TransferError::InvalidArgument(
            "attempt count must be positive".into(),
        ));
    }
    Ok(())
}

/// HEAD an object, folding "store did not answer" into "not there".
///
/// The store error is logged rather than returned. Only reads use this;
/// uploads go through [`check_upload_target`].
pub(crate) async fn probe_object(
    store: &dyn RemoteStore,
    namespace: &str,
    bucket: &str,
    object: &str,
) -> Option<ObjectHead> {
    match store.head(namespace, bucket, object).await {
        Ok(head) => head,
        Err(err) => {
            warn!(
                "HEAD {}/{}/{} did not succeed: {}",
                namespace, bucket, object, err
            );
            None
        }
    }
}

/// HEAD an object ahead of an upload.
///
/// A present object is a conflict unless `replace_existing`. A HEAD that
/// fails is fatal too, since the object may exist; with `replace_existing`
/// it is only logged.
pub(crate) async fn check_upload_target(
    store: &dyn RemoteStore,
    namespace: &str,
    bucket: &str,
    object: &str,
    replace_existing: bool,
) -> TransferResult<()> {
    match store.head(namespace, bucket, object).await {
        Ok(Some(_)) if !replace_existing => Err(TransferError::AlreadyExists {
            namespace: namespace.to_string(),
            bucket: bucket.to_string(),
            object: object.to_string(),
        }),
        Ok(_) => Ok(()),
        Err(err) if replace_existing => {
            warn!(
                "HEAD {}/{}/{} did not succeed, replacing anyway: {}",
                namespace, bucket, object, err
            );
            Ok(())
        }
        Err(source) => Err(TransferError::ExistenceCheckFailed {
            namespace: namespace.to_string(),
            bucket: bucket.to_string(),
            object: object.to_string(),
            source,
        }),
    }
}

/// Map a read error on a local source file.
pub(crate) fn local_read_error(path: &Path, err: std::io::Error) -> TransferError {
    if err.kind() == ErrorKind::NotFound {
        TransferError::LocalFileNotFound(path.to_path_buf())
    } else {
        TransferError::io(path, err)
    }
}

#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn RemoteStore>,
    observer: SharedObserver,
    working_dir: PathBuf,
    cancel: CancellationToken,
}

impl TransferEngine {
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

    /// Share a token that stops the engine between chunks.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Affects only calls made after this one.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = dir.into();
    }

    pub fn resolve_local(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Download `object` into `local_target` in `chunk_size` ranges.
    ///
    /// Each range gets up to `max_attempts` GETs. Returns the resolved target
    /// path on success.
    pub async fn download(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        local_target: impl AsRef<Path>,
        chunk_size: u64,
        max_attempts: u32,
    ) -> TransferResult<PathBuf> {
        validate_params(chunk_size, max_attempts)?;

        let head = probe_object(self.store.as_ref(), namespace, bucket, object)
            .await
            .ok_or_else(|| TransferError::object_not_found(namespace, bucket, object))?;

        let target = self.resolve_local(local_target.as_ref());
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => self.working_dir.clone(),
        };
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .await
            .map_err(|err| TransferError::io(&tmp_path, err))?;

        let mut job = TransferJob::new(
            Direction::Download,
            object,
            head.content_length,
            chunk_size,
            max_attempts,
        );
        job.start();
        info!(
            "downloading {}/{}/{} ({} bytes) to {}",
            namespace,
            bucket,
            object,
            head.content_length,
            target.display()
        );

        let written = match self
            .fetch_chunks(&mut file, &tmp_path, &mut job, namespace, bucket)
            .await
        {
            Ok(()) => finish_file(file, &tmp_path).await,
            Err(err) => {
                drop(file);
                Err(err)
            }
        };

        let result = match written {
            Ok(()) => replace_file(&tmp_path, &target).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                job.complete();
                self.observer.on_progress(&job.progress());
                info!(
                    "downloaded `{}` in {} attempts ({} retried)",
                    object, job.attempts_used, job.failed_attempts
                );
                Ok(target)
            }
            Err(err) => {
                job.fail();
                self.observer.on_progress(&job.progress());
                remove_partial(&tmp_path).await;
                warn!("download of `{}` failed: {}", object, err);
                Err(err)
            }
        }
    }

    async fn fetch_chunks(
        &self,
        file: &mut File,
        path: &Path,
        job: &mut TransferJob,
        namespace: &str,
        bucket: &str,
    ) -> TransferResult<()> {
        for range in ByteRange::partition(job.object_size, job.chunk_size) {
            let chunk = self.fetch_chunk(job, namespace, bucket, range).await?;
            file.write_all(&chunk)
                .await
                .map_err(|err| TransferError::io(path, err))?;
            job.bytes_done += chunk.len() as u64;
            self.observer.on_progress(&job.progress());
        }
        Ok(())
    }

    async fn fetch_chunk(
        &self,
        job: &mut TransferJob,
        namespace: &str,
        bucket: &str,
        range: ByteRange,
    ) -> TransferResult<Bytes> {
        let object = job.object_name.clone();
        for attempt in 1..=job.attempts_per_chunk {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled(object));
            }
            let reason = match self.store.get_range(namespace, bucket, &object, range).await {
                Ok(chunk) if chunk.len() as u64 == range.len() => {
                    job.record_attempt(true);
                    return Ok(chunk);
                }
                Ok(chunk) => format!("short read: {} of {} bytes", chunk.len(), range.len()),
                Err(err) => err.to_string(),
            };
            job.record_attempt(false);
            self.observer
                .on_retry(&object, RetryTarget::Chunk(range), attempt as u64, &reason);
        }
        Err(TransferError::ChunkExhausted {
            object,
            range,
            attempts: job.attempts_per_chunk,
        })
    }

    /// Upload a whole local file with one PUT, retried up to `max_attempts`.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        &self,
        namespace: &str,
        bucket: &str,
        local_file: impl AsRef<Path>,
        object: &str,
        max_attempts: u32,
        tier: Option<StorageTier>,
        replace_existing: bool,
    ) -> TransferResult<UploadSummary> {
        validate_params(1, max_attempts)?;
        check_upload_target(self.store.as_ref(), namespace, bucket, object, replace_existing)
            .await?;

        let path = self.resolve_local(local_file.as_ref());
        let size = fs::metadata(&path)
            .await
            .map_err(|err| local_read_error(&path, err))?
            .len();
        if size > SINGLE_PUT_LIMIT {
            return Err(TransferError::InvalidArgument(format!(
                "{} bytes exceeds the single upload limit of {}; use a multipart upload",
                size, SINGLE_PUT_LIMIT
            )));
        }
        let data = Bytes::from(
            fs::read(&path)
                .await
                .map_err(|err| local_read_error(&path, err))?,
        );

        let tier = tier.unwrap_or_default();
        let mut job = TransferJob::new(
            Direction::Upload,
            object,
            data.len() as u64,
            data.len() as u64,
            max_attempts,
        );
        job.start();
        debug!(
            "uploading {} ({} bytes) to {}/{}/{} as {}",
            path.display(),
            data.len(),
            namespace,
            bucket,
            object,
            tier
        );

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                job.fail();
                return Err(TransferError::Cancelled(object.to_string()));
            }
            match self
                .store
                .put(namespace, bucket, object, data.clone(), tier)
                .await
            {
                Ok(()) => {
                    job.record_attempt(true);
                    job.bytes_done = job.object_size;
                    job.complete();
                    self.observer.on_progress(&job.progress());
                    info!("uploaded `{}` on attempt {}", object, attempt);
                    return Ok(UploadSummary {
                        object_name: object.to_string(),
                        bytes: job.object_size,
                        attempts: job.attempts_used,
                        failed_attempts: job.failed_attempts,
                        parts: Vec::new(),
                    });
                }
                Err(err) => {
                    job.record_attempt(false);
                    self.observer.on_retry(
                        object,
                        RetryTarget::Put,
                        attempt as u64,
                        &err.to_string(),
                    );
                }
            }
        }

        job.fail();
        self.observer.on_progress(&job.progress());
        warn!("upload of `{}` exhausted {} attempts", object, max_attempts);
        Err(TransferError::UploadExhausted {
            object: object.to_string(),
            attempts: max_attempts,
        })
    }
}

/// Flush and fsync the temp file, then close it.
async fn finish_file(mut file: File, path: &Path) -> TransferResult<()> {
    file.flush()
        .await
        .map_err(|err| TransferError::io(path, err))?;
    file.sync_all()
        .await
        .map_err(|err| TransferError::io(path, err))?;
    Ok(())
}

/// Move the finished temp file over the target.
async fn replace_file(tmp_path: &Path, target: &Path) -> TransferResult<()> {
    match fs::rename(tmp_path, target).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(target)
                .await
                .map_err(|err| TransferError::io(target, err))?;
            fs::rename(tmp_path, target)
                .await
                .map_err(|err| TransferError::io(target, err))
        }
        Err(err) => Err(TransferError::io(target, err)),
    }
}

/// Best-effort removal of a partial download; a missing file is fine.
async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("removed partial download {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(
            "could not remove partial download {}: {}",
            path.display(),
            err
        ),
    }
}

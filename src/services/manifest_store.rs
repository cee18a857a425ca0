//! src/services/manifest_store.rs
//!
//! ManifestStore — the JSON document recording which files are tracked and
//! where copies are known to live.
//!
//! Every mutation is a whole-document read-modify-write performed under one
//! async mutex, so writers inside a process never lose each other's updates.
//! The document is replaced through a temp file and a rename; readers see
//! either the old or the new version. Nothing guards against a second
//! process writing the same file.

use crate::{
    errors::{TransferError, TransferResult},
    models::tracked_file::{ManifestDocument, ManifestStats, TrackedFile},
    services::{remote_store::RemoteStore, transfer_engine::probe_object},
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Keys are built from the working directory, so it is pinned to an
/// absolute path when set.
fn absolute_dir(dir: PathBuf) -> PathBuf {
    std::path::absolute(&dir).unwrap_or(dir)
}

pub struct ManifestStore {
    path: PathBuf,
    working_dir: PathBuf,
    store: Arc<dyn RemoteStore>,
    writer: Mutex<()>,
}

impl ManifestStore {
    pub fn new(
        path: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            path: path.into(),
            working_dir: absolute_dir(working_dir.into()),
            store,
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Later track calls resolve against `dir`; existing entries keep their keys.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = absolute_dir(dir.into());
    }

    /// Canonical manifest key of `file_name` under the working directory.
    pub fn key_for(&self, file_name: &str) -> String {
        self.working_dir.join(file_name).to_string_lossy().into_owned()
    }

    /// Create an empty document if none exists. Safe to call on every start.
    pub async fn initialize(&self) -> TransferResult<()> {
        let _guard = self.writer.lock().await;
        match fs::metadata(&self.path).await {
            Ok(_) => {
                debug!("manifest {} already present", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)
                            .await
                            .map_err(|err| TransferError::io(parent, err))?;
                    }
                }
                self.write_document(&mut ManifestDocument::default()).await?;
                info!("created manifest {}", self.path.display());
                Ok(())
            }
            Err(err) => Err(TransferError::io(&self.path, err)),
        }
    }

    /// Read the whole document. A missing file reads as empty.
    pub async fn load(&self) -> TransferResult<ManifestDocument> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => ManifestDocument::from_json(&raw).map_err(|source| {
                TransferError::Manifest {
                    path: self.path.clone(),
                    source,
                }
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ManifestDocument::default()),
            Err(err) => Err(TransferError::io(&self.path, err)),
        }
    }

    /// Overwrite the whole document, recomputing its counters first.
    pub async fn save(&self, doc: &mut ManifestDocument) -> TransferResult<()> {
        let _guard = self.writer.lock().await;
        self.write_document(doc).await
    }

    async fn write_document(&self, doc: &mut ManifestDocument) -> TransferResult<()> {
        doc.recompute();
        let raw = doc.to_json().map_err(|source| TransferError::Manifest {
            path: self.path.clone(),
            source,
        })?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(raw.as_bytes()).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &self.path).await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(TransferError::io(&self.path, err));
        }
        debug!(
            "wrote manifest {} ({} files)",
            self.path.display(),
            doc.files.len()
        );
        Ok(())
    }

    /// Read-modify-write under the writer lock.
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut ManifestDocument) -> TransferResult<T>,
    ) -> TransferResult<T> {
        let _guard = self.writer.lock().await;
        let mut doc = self.load().await?;
        let out = apply(&mut doc)?;
        self.write_document(&mut doc).await?;
        Ok(out)
    }

    pub async fn exists(&self, key: &str) -> TransferResult<bool> {
        Ok(self.load().await?.files.contains_key(key))
    }

    pub async fn resolve(&self, key: &str) -> TransferResult<TrackedFile> {
        self.load()
            .await?
            .files
            .remove(key)
            .ok_or_else(|| TransferError::NotTracked(key.to_string()))
    }

    pub async fn list(&self) -> TransferResult<Vec<TrackedFile>> {
        Ok(self.load().await?.files.into_values().collect())
    }

    /// Counters derived from the current entries.
    pub async fn stats(&self) -> TransferResult<ManifestStats> {
        Ok(self.load().await?.stats)
    }

    /// Track a file that exists in the working directory.
    ///
    /// The size is read from disk now and never refreshed.
    pub async fn track_local(
        &self,
        namespace: &str,
        bucket: &str,
        file_name: &str,
        multipart: bool,
    ) -> TransferResult<TrackedFile> {
        let local = self.working_dir.join(file_name);
        let meta = match fs::metadata(&local).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(TransferError::LocalFileNotFound(local)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TransferError::LocalFileNotFound(local));
            }
            Err(err) => return Err(TransferError::io(&local, err)),
        };

        let record = self.record(namespace, bucket, file_name, meta.len(), multipart, true, false);
        self.insert(record).await
    }

    /// Track an object that exists in the remote store.
    pub async fn track_cloud(
        &self,
        namespace: &str,
        bucket: &str,
        file_name: &str,
        multipart: bool,
    ) -> TransferResult<TrackedFile> {
        let head = probe_object(self.store.as_ref(), namespace, bucket, file_name)
            .await
            .ok_or_else(|| TransferError::object_not_found(namespace, bucket, file_name))?;

        let record = self.record(
            namespace,
            bucket,
            file_name,
            head.content_length,
            multipart,
            false,
            true,
        );
        self.insert(record).await
    }

    /// Stop tracking `key` and return the removed record.
    pub async fn untrack(&self, key: &str) -> TransferResult<TrackedFile> {
        let removed = self
            .mutate(|doc| {
                doc.files
                    .remove(key)
                    .ok_or_else(|| TransferError::NotTracked(key.to_string()))
            })
            .await?;
        info!("untracked {}", key);
        Ok(removed)
    }

    /// Record that a copy of `key` now exists locally.
    pub async fn mark_on_disk(&self, key: &str) -> TransferResult<TrackedFile> {
        self.update_flags(key, |file| file.on_disk = true).await
    }

    /// Record that a copy of `key` now exists in the remote store.
    pub async fn mark_in_cloud(&self, key: &str) -> TransferResult<TrackedFile> {
        self.update_flags(key, |file| file.in_cloud = true).await
    }

    async fn update_flags(
        &self,
        key: &str,
        apply: impl FnOnce(&mut TrackedFile),
    ) -> TransferResult<TrackedFile> {
        self.mutate(|doc| {
            let file = doc
                .files
                .get_mut(key)
                .ok_or_else(|| TransferError::NotTracked(key.to_string()))?;
            apply(file);
            Ok(file.clone())
        })
        .await
    }

    async fn insert(&self, record: TrackedFile) -> TransferResult<TrackedFile> {
        let key = record.key.clone();
        let inserted = self
            .mutate(|doc| {
                if doc.files.contains_key(&record.key) {
                    return Err(TransferError::AlreadyTracked(record.key.clone()));
                }
                doc.files.insert(record.key.clone(), record.clone());
                Ok(record)
            })
            .await?;
        info!(
            "tracking {} -> {}/{} ({} bytes)",
            key, inserted.namespace, inserted.bucket, inserted.size_bytes
        );
        Ok(inserted)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        namespace: &str,
        bucket: &str,
        file_name: &str,
        size_bytes: u64,
        multipart: bool,
        on_disk: bool,
        in_cloud: bool,
    ) -> TrackedFile {
        TrackedFile {
            key: self.key_for(file_name),
            name: file_name.to_string(),
            directory: self.working_dir.to_string_lossy().into_owned(),
            size_bytes,
            namespace: namespace.to_string(),
            bucket: bucket.to_string(),
            is_multipart: multipart,
            on_disk,
            in_cloud,
        }
    }
}

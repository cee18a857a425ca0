//! src/services/orchestrator.rs
//!
//! TransferOrchestrator — resolves manifest keys to remote coordinates,
//! checks for local/remote conflicts, dispatches to the engine or the
//! multipart coordinator, and records the new location on success.

use crate::{
    errors::{TransferError, TransferResult},
    models::transfer::{StorageTier, UploadSummary},
    services::{
        manifest_store::ManifestStore, multipart::MultipartUploadCoordinator,
        remote_store::RemoteStore,
        transfer_engine::{TransferEngine, probe_object},
    },
};
use std::{path::PathBuf, sync::Arc};
use tokio::fs;
use tracing::{info, warn};

pub struct TransferOrchestrator {
    manifest: ManifestStore,
    store: Arc<dyn RemoteStore>,
    engine: TransferEngine,
    multipart: MultipartUploadCoordinator,
}

impl TransferOrchestrator {
    pub fn new(
        manifest: ManifestStore,
        store: Arc<dyn RemoteStore>,
        engine: TransferEngine,
        multipart: MultipartUploadCoordinator,
    ) -> Self {
        Self {
            manifest,
            store,
            engine,
            multipart,
        }
    }

    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    /// Point the manifest, engine and coordinator at a new working directory.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.manifest.set_working_dir(dir.clone());
        self.engine.set_working_dir(dir.clone());
        self.multipart.set_working_dir(dir);
    }

    /// Download the tracked file `file_key` to its local path.
    pub async fn download(
        &self,
        file_key: &str,
        overwrite: bool,
        chunk_size: u64,
        attempts: u32,
    ) -> TransferResult<PathBuf> {
        let result = self
            .try_download(file_key, overwrite, chunk_size, attempts)
            .await;
        if let Err(err) = &result {
            warn!("download of {} not performed: {}", file_key, err);
        }
        result
    }

    async fn try_download(
        &self,
        file_key: &str,
        overwrite: bool,
        chunk_size: u64,
        attempts: u32,
    ) -> TransferResult<PathBuf> {
        let file = self.manifest.resolve(file_key).await?;
        let target = PathBuf::from(&file.key);

        let present = fs::try_exists(&target)
            .await
            .map_err(|err| TransferError::io(&target, err))?;
        if present && !overwrite {
            return Err(TransferError::LocalFileExists(target));
        }
        if probe_object(self.store.as_ref(), &file.namespace, &file.bucket, &file.name)
            .await
            .is_none()
        {
            return Err(TransferError::object_not_found(
                &file.namespace,
                &file.bucket,
                &file.name,
            ));
        }

        let path = self
            .engine
            .download(
                &file.namespace,
                &file.bucket,
                &file.name,
                &target,
                chunk_size,
                attempts,
            )
            .await?;
        self.manifest.mark_on_disk(file_key).await?;
        info!("{} is now on disk", file_key);
        Ok(path)
    }

    /// Upload the tracked file `file_key`, multipart if its record says so.
    pub async fn upload(
        &self,
        file_key: &str,
        replace_existing: bool,
        chunk_size: u64,
        attempts: u32,
        tier: Option<StorageTier>,
    ) -> TransferResult<UploadSummary> {
        let result = self
            .try_upload(file_key, replace_existing, chunk_size, attempts, tier)
            .await;
        if let Err(err) = &result {
            warn!("upload of {} not performed: {}", file_key, err);
        }
        result
    }

    async fn try_upload(
        &self,
        file_key: &str,
        replace_existing: bool,
        chunk_size: u64,
        attempts: u32,
        tier: Option<StorageTier>,
    ) -> TransferResult<UploadSummary> {
        let file = self.manifest.resolve(file_key).await?;
        let source = PathBuf::from(&file.key);

        let summary = if file.is_multipart {
            self.multipart
                .upload_multipart(
                    &file.namespace,
                    &file.bucket,
                    &source,
                    &file.name,
                    chunk_size,
                    attempts,
                    tier,
                    replace_existing,
                )
                .await?
        } else {
            self.engine
                .upload(
                    &file.namespace,
                    &file.bucket,
                    &source,
                    &file.name,
                    attempts,
                    tier,
                    replace_existing,
                )
                .await?
        };
        self.manifest.mark_in_cloud(file_key).await?;
        info!("{} is now in {}/{}", file_key, file.namespace, file.bucket);
        Ok(summary)
    }
}

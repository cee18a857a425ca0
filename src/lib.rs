//! Chunked object transfers against a bucket-style object store, with a JSON
//! manifest of tracked files.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use errors::{ErrorKind, TransferError, TransferResult};
pub use models::transfer::{ByteRange, DEFAULT_ATTEMPTS, DEFAULT_CHUNK_SIZE, StorageTier, UploadSummary};
pub use services::{
    local_store::LocalObjectStore,
    manifest_store::ManifestStore,
    multipart::MultipartUploadCoordinator,
    orchestrator::TransferOrchestrator,
    progress::{NoopObserver, TracingObserver, TransferObserver},
    remote_store::{ObjectHead, RemoteStore, StoreError},
    transfer_engine::TransferEngine,
};

use anyhow::{Context, Result};
use object_transfer::{
    LocalObjectStore, ManifestStore, MultipartUploadCoordinator, RemoteStore, TracingObserver,
    TransferEngine, TransferOrchestrator,
    config::{AppConfig, Command},
    services::progress::SharedObserver,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + subcommand ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::info!("Starting object-transfer with config: {:?}", cfg);

    // --- Initialize local store (SQLite metadata + payload directory) ---
    let local = LocalObjectStore::connect(&cfg.database_url, &cfg.store_dir)
        .await
        .with_context(|| format!("opening store at {}", cfg.database_url))?;
    let store: Arc<dyn RemoteStore> = Arc::new(local.clone());

    // --- Ctrl-C stops transfers between chunks ---
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling transfers");
            on_signal.cancel();
        }
    });

    // --- Wire services ---
    let observer: SharedObserver = Arc::new(TracingObserver);
    let manifest = ManifestStore::new(&cfg.manifest_path, &cfg.working_dir, store.clone());
    manifest
        .initialize()
        .await
        .with_context(|| format!("initializing manifest {}", cfg.manifest_path.display()))?;
    let engine = TransferEngine::new(store.clone(), observer.clone())
        .with_working_dir(&cfg.working_dir)
        .with_cancellation(cancel.clone());
    let multipart = MultipartUploadCoordinator::new(store.clone(), observer)
        .with_working_dir(&cfg.working_dir)
        .with_cancellation(cancel);
    let orchestrator = TransferOrchestrator::new(manifest, store, engine.clone(), multipart.clone());

    match command {
        Command::Init => {
            tracing::info!("manifest and store ready");
        }
        Command::CreateBucket { namespace, bucket } => {
            local.create_bucket(&namespace, &bucket).await?;
            println!("created {}/{}", namespace, bucket);
        }
        Command::TrackLocal {
            namespace,
            bucket,
            file,
            multipart,
        } => {
            let record = orchestrator
                .manifest()
                .track_local(&namespace, &bucket, &file, multipart)
                .await?;
            println!("tracking {}", record.key);
        }
        Command::TrackCloud {
            namespace,
            bucket,
            object,
            multipart,
        } => {
            let record = orchestrator
                .manifest()
                .track_cloud(&namespace, &bucket, &object, multipart)
                .await?;
            println!("tracking {} ({} bytes)", record.key, record.size_bytes);
        }
        Command::Untrack { key } => {
            let record = orchestrator.manifest().untrack(&key).await?;
            println!("untracked {}", record.key);
        }
        Command::Status => {
            let stats = orchestrator.manifest().stats().await?;
            println!(
                "on disk: {} files, {} bytes",
                stats.count_on_disk, stats.bytes_on_disk
            );
            println!(
                "in cloud: {} files, {} bytes",
                stats.count_in_cloud, stats.bytes_in_cloud
            );
            for file in orchestrator.manifest().list().await? {
                println!(
                    "{}\t{}/{}/{}\t{}\tdisk={} cloud={}{}",
                    file.key,
                    file.namespace,
                    file.bucket,
                    file.name,
                    file.size_bytes,
                    file.on_disk,
                    file.in_cloud,
                    if file.is_multipart { " multipart" } else { "" }
                );
            }
        }
        Command::Download { key, overwrite } => {
            let path = orchestrator
                .download(&key, overwrite, cfg.chunk_size, cfg.attempts)
                .await?;
            println!("downloaded {}", path.display());
        }
        Command::Upload { key, replace, tier } => {
            let summary = orchestrator
                .upload(&key, replace, cfg.chunk_size, cfg.attempts, tier)
                .await?;
            println!(
                "uploaded {} ({} bytes, {} calls, {} failed)",
                summary.object_name, summary.bytes, summary.attempts, summary.failed_attempts
            );
        }
        Command::Get {
            namespace,
            bucket,
            object,
            output,
        } => {
            let target = output.unwrap_or_else(|| object.clone().into());
            let path = engine
                .download(
                    &namespace,
                    &bucket,
                    &object,
                    target,
                    cfg.chunk_size,
                    cfg.attempts,
                )
                .await?;
            println!("downloaded {}", path.display());
        }
        Command::Put {
            namespace,
            bucket,
            file,
            object,
            replace,
            multipart: use_multipart,
            tier,
        } => {
            let object = match object {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .with_context(|| format!("{} has no file name", file.display()))?,
            };
            let summary = if use_multipart {
                multipart
                    .upload_multipart(
                        &namespace,
                        &bucket,
                        &file,
                        &object,
                        cfg.chunk_size,
                        cfg.attempts,
                        tier,
                        replace,
                    )
                    .await?
            } else {
                engine
                    .upload(&namespace, &bucket, &file, &object, cfg.attempts, tier, replace)
                    .await?
            };
            println!(
                "uploaded {} ({} bytes, {} parts)",
                summary.object_name,
                summary.bytes,
                summary.parts.len()
            );
        }
    }

    Ok(())
}

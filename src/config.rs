use crate::models::transfer::{DEFAULT_ATTEMPTS, DEFAULT_CHUNK_SIZE, StorageTier};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, fmt::Display, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub working_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub store_dir: PathBuf,
    pub database_url: String,
    pub chunk_size: u64,
    pub attempts: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked object transfers with a tracked-file manifest")]
pub struct Args {
    /// Directory local files resolve against (overrides OBJECT_TRANSFER_WORKING_DIR)
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Manifest document path (overrides OBJECT_TRANSFER_MANIFEST)
    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Directory where the local store keeps payloads (overrides OBJECT_TRANSFER_STORE_DIR)
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    /// Database URL (overrides OBJECT_TRANSFER_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Bytes per chunk or part (overrides OBJECT_TRANSFER_CHUNK_SIZE)
    #[arg(long, global = true)]
    pub chunk_size: Option<u64>,

    /// Attempts per chunk, PUT or commit (overrides OBJECT_TRANSFER_ATTEMPTS)
    #[arg(long, global = true)]
    pub attempts: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the manifest and store metadata if missing
    Init,

    /// Create a bucket in the local store
    CreateBucket { namespace: String, bucket: String },

    /// Track a file that exists in the working directory
    TrackLocal {
        namespace: String,
        bucket: String,
        file: String,
        #[arg(long)]
        multipart: bool,
    },

    /// Track an object that exists in the store
    TrackCloud {
        namespace: String,
        bucket: String,
        object: String,
        #[arg(long)]
        multipart: bool,
    },

    /// Stop tracking a manifest key
    Untrack { key: String },

    /// Print manifest counters and tracked files
    Status,

    /// Download a tracked file to its recorded location
    Download {
        key: String,
        #[arg(long)]
        overwrite: bool,
    },

    /// Upload a tracked file
    Upload {
        key: String,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        tier: Option<StorageTier>,
    },

    /// Download an object without touching the manifest
    Get {
        namespace: String,
        bucket: String,
        object: String,
        /// Local file name; defaults to the object name
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Upload a file without touching the manifest
    Put {
        namespace: String,
        bucket: String,
        file: PathBuf,
        /// Object name; defaults to the file name
        #[arg(long)]
        object: Option<String>,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        multipart: bool,
        #[arg(long)]
        tier: Option<StorageTier>,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the subcommand.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        Self::merge(Args::parse(), |name| env::var(name).ok())
    }

    /// Flags win over `lookup`, which wins over defaults.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, Command)> {
        let env_path = |name: &str, default: &str| {
            PathBuf::from(lookup(name).unwrap_or_else(|| default.to_string()))
        };

        let env_working = env_path("OBJECT_TRANSFER_WORKING_DIR", ".");
        let env_manifest = env_path("OBJECT_TRANSFER_MANIFEST", "./data/manifest.json");
        let env_store = env_path("OBJECT_TRANSFER_STORE_DIR", "./data/objects");
        let env_db = lookup("OBJECT_TRANSFER_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/objects.db".into());
        let env_chunk = parse_var(&lookup, "OBJECT_TRANSFER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_attempts = parse_var(&lookup, "OBJECT_TRANSFER_ATTEMPTS", DEFAULT_ATTEMPTS)?;

        let cfg = Self {
            working_dir: args.working_dir.unwrap_or(env_working),
            manifest_path: args.manifest.unwrap_or(env_manifest),
            store_dir: args.store_dir.unwrap_or(env_store),
            database_url: args.database_url.unwrap_or(env_db),
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
            attempts: args.attempts.unwrap_or(env_attempts),
        };

        Ok((cfg, args.command))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

//! src/services/local_store.rs
//!
//! LocalObjectStore — a `RemoteStore` backed by SQLite for metadata and local
//! disk for payloads. Objects live beneath
//! `base_path/{namespace}/{bucket}/{shard}/{shard}/{key}`; multipart parts are
//! staged under `base_path/.uploads/{upload_id}/` until commit.

use crate::{
    models::{
        bucket::Bucket,
        multipart::{MultipartPart, MultipartUpload},
        object::StoredObject,
        transfer::{ByteRange, CompletedPart, StorageTier},
    },
    services::remote_store::{ObjectHead, RemoteStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    collections::HashMap,
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const UPLOADS_DIR: &str = ".uploads";

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Open (creating if needed) the SQLite database at `database_url`, apply
    /// the schema and make sure `base_path` exists.
    pub async fn connect(database_url: &str, base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                info!("Created missing directory {:?}", parent);
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::new(Arc::new(pool), base_path);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Running {} migration statements...", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.split('/').any(|seg| seg == ".." || seg == ".") {
            return Err(StoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate a bucket or namespace name.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| -> StoreResult<()> {
            Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return invalid("must be between 3 and 63 characters");
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return invalid("allowed characters are lowercase letters, digits, dots, and hyphens");
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return invalid("must start and end with a lowercase letter or digit");
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return invalid("cannot contain consecutive dots or dot-hyphen combinations");
        }
        if is_ipv4_like(name) {
            return invalid("must not be formatted like an IP address");
        }
        Ok(())
    }

    fn bucket_root(&self, bucket: &Bucket) -> PathBuf {
        self.base_path.join(&bucket.namespace).join(&bucket.name)
    }

    /// Two-level shard identifiers from MD5(namespace/bucket/key).
    fn object_shards(bucket: &Bucket, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}/{}", bucket.namespace, bucket.name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket: &Bucket, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        self.bucket_root(bucket).join(shard_a).join(shard_b).join(key)
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(UPLOADS_DIR).join(upload_id)
    }

    /// Create a bucket and its directory.
    pub async fn create_bucket(&self, namespace: &str, name: &str) -> StoreResult<Bucket> {
        self.ensure_bucket_name_safe(namespace)?;
        self.ensure_bucket_name_safe(name)?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO buckets (id, namespace, name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(bucket.id)
        .bind(&bucket.namespace)
        .bind(&bucket.name)
        .bind(bucket.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => {
                fs::create_dir_all(self.bucket_root(&bucket)).await?;
                info!("created bucket {}/{}", namespace, name);
                Ok(bucket)
            }
            Err(err) if is_unique_violation(&err) => Err(StoreError::BucketAlreadyExists(
                format!("{}/{}", namespace, name),
            )),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    async fn fetch_bucket(&self, namespace: &str, name: &str) -> StoreResult<Bucket> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, namespace, name, created_at FROM buckets WHERE namespace = ? AND name = ?",
        )
        .bind(namespace)
        .bind(name)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::BucketNotFound {
            namespace: namespace.to_string(),
            bucket: name.to_string(),
        })
    }

    async fn fetch_bucket_by_id(&self, id: Uuid) -> StoreResult<Bucket> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, namespace, name, created_at FROM buckets WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(StoreError::from)
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StoreResult<Option<StoredObject>> {
        let object = sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket_id, key, size_bytes, etag, storage_class, last_modified
             FROM objects WHERE bucket_id = ? AND key = ?",
        )
        .bind(bucket.id)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(object)
    }

    async fn fetch_upload(&self, upload_id: &str) -> StoreResult<MultipartUpload> {
        sqlx::query_as::<_, MultipartUpload>(
            "SELECT id, bucket_id, key, upload_id, storage_class, initiated_at
             FROM multipart_uploads WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::UploadNotFound(upload_id.to_string()))
    }

    async fn upsert_object(
        &self,
        bucket: &Bucket,
        key: &str,
        size_bytes: i64,
        etag: &str,
        storage_class: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, size_bytes, etag, storage_class, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                storage_class = excluded.storage_class,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket.id)
        .bind(key)
        .bind(size_bytes)
        .bind(etag)
        .bind(storage_class)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}

/// Fresh temp path beside `path`, creating the parent directory.
async fn temp_sibling(path: &Path) -> StoreResult<PathBuf> {
    let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
        StoreError::Io(io::Error::other("object path missing parent directory"))
    })?;
    fs::create_dir_all(&parent).await?;
    Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
}

/// Write `data` to a temp file beside `path`, fsync, then rename into place.
async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let tmp_path = temp_sibling(path).await?;
    let written = async {
        let mut file = File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        rename_over(&tmp_path, path).await
    }
    .await;
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StoreError::Io(err));
    }
    Ok(())
}

/// Stream `sources` in order into a temp file beside `path`, fsync, then
/// rename into place. Returns the number of bytes written.
async fn concat_atomic(path: &Path, sources: &[PathBuf]) -> StoreResult<u64> {
    let tmp_path = temp_sibling(path).await?;
    let written = async {
        let mut file = File::create(&tmp_path).await?;
        let mut total = 0u64;
        for source in sources {
            let mut part = File::open(source).await?;
            total += tokio::io::copy(&mut part, &mut file).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        rename_over(&tmp_path, path).await?;
        Ok::<u64, io::Error>(total)
    }
    .await;
    match written {
        Ok(total) => Ok(total),
        Err(err) => {
            let _ = fs::remove_file(&tmp_path).await;
            Err(StoreError::Io(err))
        }
    }
}

async fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(to).await?;
            fs::rename(from, to).await
        }
        other => other,
    }
}

fn etag_of(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[async_trait]
impl RemoteStore for LocalObjectStore {
    async fn head(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
    ) -> StoreResult<Option<ObjectHead>> {
        self.ensure_key_safe(object)?;
        let bucket_rec = match self.fetch_bucket(namespace, bucket).await {
            Ok(rec) => rec,
            Err(StoreError::BucketNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(self
            .fetch_object(&bucket_rec, object)
            .await?
            .map(|obj| ObjectHead {
                content_length: obj.size_bytes.max(0) as u64,
                etag: Some(obj.etag),
            }))
    }

    async fn get_range(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        range: ByteRange,
    ) -> StoreResult<Bytes> {
        self.ensure_key_safe(object)?;
        let bucket_rec = self.fetch_bucket(namespace, bucket).await?;
        let meta = self
            .fetch_object(&bucket_rec, object)
            .await?
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: object.to_string(),
            })?;
        let size = meta.size_bytes.max(0) as u64;
        if range.end >= size || range.start > range.end {
            return Err(StoreError::InvalidRange { range, size });
        }

        let path = self.object_path(&bucket_rec, object);
        let mut file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: object.to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; range.len() as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn put(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        data: Bytes,
        tier: StorageTier,
    ) -> StoreResult<()> {
        self.ensure_key_safe(object)?;
        let bucket_rec = self.fetch_bucket(namespace, bucket).await?;
        let path = self.object_path(&bucket_rec, object);

        write_atomic(&path, &data).await?;
        let etag = etag_of(&data);
        if let Err(err) = self
            .upsert_object(&bucket_rec, object, data.len() as i64, &etag, tier.as_str())
            .await
        {
            let _ = fs::remove_file(&path).await;
            return Err(err);
        }
        debug!("stored {} bytes at {}", data.len(), path.display());
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        tier: StorageTier,
    ) -> StoreResult<String> {
        self.ensure_key_safe(object)?;
        let bucket_rec = self.fetch_bucket(namespace, bucket).await?;
        let upload_id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO multipart_uploads (id, bucket_id, key, upload_id, storage_class, initiated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(object)
        .bind(&upload_id)
        .bind(tier.as_str())
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        fs::create_dir_all(self.staging_dir(&upload_id)).await?;
        debug!("opened multipart session {} for {}", upload_id, object);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<String> {
        let upload = self.fetch_upload(upload_id).await?;
        let path = self.staging_dir(upload_id).join(part_number.to_string());
        write_atomic(&path, &data).await?;

        let etag = etag_of(&data);
        sqlx::query(
            r#"
            INSERT INTO multipart_parts (id, upload_id, part_number, size_bytes, etag, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(upload_id, part_number) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(upload.id)
        .bind(part_number as i64)
        .bind(data.len() as i64)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(etag)
    }

    async fn commit_multipart_upload(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let upload = self.fetch_upload(upload_id).await?;
        let staged: HashMap<i64, MultipartPart> = sqlx::query_as::<_, MultipartPart>(
            "SELECT id, upload_id, part_number, size_bytes, etag, uploaded_at
             FROM multipart_parts WHERE upload_id = ?",
        )
        .bind(upload.id)
        .fetch_all(&*self.db)
        .await?
        .into_iter()
        .map(|part| (part.part_number, part))
        .collect();

        let mismatch = |part_number: u32| StoreError::PartMismatch {
            upload_id: upload_id.to_string(),
            part_number,
        };
        let mut previous = 0u32;
        for part in parts {
            if part.part_number <= previous {
                return Err(mismatch(part.part_number));
            }
            previous = part.part_number;
            match staged.get(&(part.part_number as i64)) {
                Some(rec) if rec.etag == part.etag => {}
                _ => return Err(mismatch(part.part_number)),
            }
        }

        let bucket = self.fetch_bucket_by_id(upload.bucket_id).await?;
        let staging = self.staging_dir(upload_id);
        let sources: Vec<PathBuf> = parts
            .iter()
            .map(|part| staging.join(part.part_number.to_string()))
            .collect();
        let digests: String = parts.iter().map(|part| part.etag.as_str()).collect();
        let etag = format!("{}-{}", etag_of(digests.as_bytes()), parts.len());

        let path = self.object_path(&bucket, &upload.key);
        let size = concat_atomic(&path, &sources).await?;
        self.upsert_object(
            &bucket,
            &upload.key,
            size as i64,
            &etag,
            &upload.storage_class,
        )
        .await?;

        sqlx::query("DELETE FROM multipart_uploads WHERE id = ?")
            .bind(upload.id)
            .execute(&*self.db)
            .await?;
        remove_staging(&staging).await;
        info!(
            "committed {} parts into {}/{}/{}",
            parts.len(),
            bucket.namespace,
            bucket.name,
            upload.key
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, upload_id: &str) -> StoreResult<()> {
        let upload = self.fetch_upload(upload_id).await?;
        sqlx::query("DELETE FROM multipart_uploads WHERE id = ?")
            .bind(upload.id)
            .execute(&*self.db)
            .await?;
        remove_staging(&self.staging_dir(upload_id)).await;
        debug!("aborted multipart session {}", upload_id);
        Ok(())
    }
}

async fn remove_staging(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir).await {
        if err.kind() != ErrorKind::NotFound {
            debug!("failed to remove staging directory {}: {}", dir.display(), err);
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> LocalObjectStore {
        let url = format!("sqlite://{}", dir.path().join("meta/objects.db").display());
        let store = LocalObjectStore::connect(&url, dir.path().join("objects"))
            .await
            .unwrap();
        store.create_bucket("tenant", "photos").await.unwrap();
        store
    }

    #[tokio::test]
    async fn put_head_and_ranged_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let data = Bytes::from_static(b"0123456789");

        store
            .put("tenant", "photos", "2025/img.raw", data.clone(), StorageTier::Standard)
            .await
            .unwrap();

        let head = store
            .head("tenant", "photos", "2025/img.raw")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.content_length, 10);
        assert_eq!(head.etag.as_deref(), Some(etag_of(&data).as_str()));

        let middle = store
            .get_range("tenant", "photos", "2025/img.raw", ByteRange::new(3, 6))
            .await
            .unwrap();
        assert_eq!(&middle[..], b"3456");

        let err = store
            .get_range("tenant", "photos", "2025/img.raw", ByteRange::new(8, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRange { size: 10, .. }));
    }

    #[tokio::test]
    async fn head_of_unknown_object_or_bucket_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert!(store.head("tenant", "photos", "nope").await.unwrap().is_none());
        assert!(store.head("tenant", "videos", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_existing_object() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        for payload in [&b"first version"[..], &b"second"[..]] {
            store
                .put(
                    "tenant",
                    "photos",
                    "a",
                    Bytes::copy_from_slice(payload),
                    StorageTier::Standard,
                )
                .await
                .unwrap();
        }
        let head = store.head("tenant", "photos", "a").await.unwrap().unwrap();
        assert_eq!(head.content_length, 6);
    }

    #[tokio::test]
    async fn multipart_commit_assembles_parts_in_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let id = store
            .create_multipart_upload("tenant", "photos", "big", StorageTier::Archive)
            .await
            .unwrap();

        let second = store
            .upload_part(&id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let first = store
            .upload_part(&id, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();
        store
            .commit_multipart_upload(
                &id,
                &[
                    CompletedPart {
                        part_number: 1,
                        etag: first,
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: second,
                    },
                ],
            )
            .await
            .unwrap();

        let head = store.head("tenant", "photos", "big").await.unwrap().unwrap();
        assert_eq!(head.content_length, 11);
        assert!(head.etag.unwrap().ends_with("-2"));
        let all = store
            .get_range("tenant", "photos", "big", ByteRange::new(0, 10))
            .await
            .unwrap();
        assert_eq!(&all[..], b"hello world");
        assert!(!store.staging_dir(&id).exists());
        assert!(matches!(
            store.abort_multipart_upload(&id).await,
            Err(StoreError::UploadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn commit_streams_large_parts_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let id = store
            .create_multipart_upload("tenant", "photos", "video.raw", StorageTier::Standard)
            .await
            .unwrap();

        let mut expected = Vec::new();
        let mut completed = Vec::new();
        for part_number in 1..=3u32 {
            let chunk = vec![part_number as u8; 256 * 1024];
            expected.extend_from_slice(&chunk);
            let etag = store
                .upload_part(&id, part_number, Bytes::from(chunk))
                .await
                .unwrap();
            completed.push(CompletedPart { part_number, etag });
        }
        store.commit_multipart_upload(&id, &completed).await.unwrap();

        let head = store
            .head("tenant", "photos", "video.raw")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.content_length, expected.len() as u64);

        let bucket = store.fetch_bucket("tenant", "photos").await.unwrap();
        let path = store.object_path(&bucket, "video.raw");
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn commit_rejects_wrong_etag_or_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let id = store
            .create_multipart_upload("tenant", "photos", "big", StorageTier::Standard)
            .await
            .unwrap();
        let e1 = store.upload_part(&id, 1, Bytes::from_static(b"a")).await.unwrap();
        let e2 = store.upload_part(&id, 2, Bytes::from_static(b"b")).await.unwrap();

        let bad_tag = [CompletedPart {
            part_number: 1,
            etag: "nope".into(),
        }];
        assert!(matches!(
            store.commit_multipart_upload(&id, &bad_tag).await,
            Err(StoreError::PartMismatch { part_number: 1, .. })
        ));

        let out_of_order = [
            CompletedPart {
                part_number: 2,
                etag: e2,
            },
            CompletedPart {
                part_number: 1,
                etag: e1,
            },
        ];
        assert!(store.commit_multipart_upload(&id, &out_of_order).await.is_err());
        assert!(store.head("tenant", "photos", "big").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn abort_discards_staged_parts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let id = store
            .create_multipart_upload("tenant", "photos", "big", StorageTier::Standard)
            .await
            .unwrap();
        store.upload_part(&id, 1, Bytes::from_static(b"a")).await.unwrap();

        store.abort_multipart_upload(&id).await.unwrap();
        assert!(!store.staging_dir(&id).exists());
        assert!(matches!(
            store.upload_part(&id, 2, Bytes::from_static(b"b")).await,
            Err(StoreError::UploadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn names_and_keys_are_validated() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        for bad in ["ab", "Upper", "-dash", "a..b", "192.168.0.1"] {
            assert!(
                matches!(
                    store.create_bucket("tenant", bad).await,
                    Err(StoreError::InvalidBucketName { .. })
                ),
                "{bad} should be rejected"
            );
        }
        assert!(matches!(
            store.create_bucket("tenant", "photos").await,
            Err(StoreError::BucketAlreadyExists(_))
        ));
        for bad in ["", "/abs", "../escape", "a/../b", "back\\slash"] {
            assert!(matches!(
                store.head("tenant", "photos", bad).await,
                Err(StoreError::InvalidObjectKey)
            ));
        }
    }

    #[tokio::test]
    async fn missing_bucket_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let err = store
            .put("tenant", "videos", "a", Bytes::new(), StorageTier::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound { .. }));
    }
}

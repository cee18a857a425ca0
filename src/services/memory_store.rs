//! An in-memory `RemoteStore` with scripted failures.
//!
//! Every call is appended to a log so callers can assert exactly which
//! ranges were fetched or which parts were committed. Faults are consumed in
//! the order they were injected.

use crate::{
    models::transfer::{ByteRange, CompletedPart, StorageTier},
    services::remote_store::{ObjectHead, RemoteStore, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

/// A call as observed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Head { object: String },
    GetRange { object: String, range: ByteRange, ok: bool },
    Put { object: String, len: usize, ok: bool },
    CreateUpload { object: String, ok: bool },
    UploadPart { part_number: u32, ok: bool },
    Commit { parts: Vec<u32>, ok: bool },
    Abort { upload_id: String },
}

/// A failure to inject. `None` filters match any chunk or part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// HEAD errors out instead of answering.
    Head,
    /// Range GET starting at the given offset errors out.
    GetRange(Option<u64>),
    /// Range GET succeeds but returns one byte less than asked.
    ShortRead(Option<u64>),
    Put,
    CreateUpload,
    UploadPart(Option<u32>),
    Commit,
}

impl Fault {
    fn matches(&self, call: &Fault) -> bool {
        match (self, call) {
            (Fault::GetRange(None), Fault::GetRange(_)) => true,
            (Fault::ShortRead(None), Fault::ShortRead(_)) => true,
            (Fault::UploadPart(None), Fault::UploadPart(_)) => true,
            (a, b) => a == b,
        }
    }
}

type ObjectKey = (String, String, String);

struct PendingUpload {
    key: ObjectKey,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<ObjectKey, Bytes>,
    uploads: HashMap<String, PendingUpload>,
    faults: Vec<(Fault, usize)>,
    calls: Vec<StoreCall>,
}

impl Inner {
    /// Consume one unit of the first injected fault matching `call`.
    fn trip(&mut self, call: Fault) -> bool {
        let hit = self
            .faults
            .iter_mut()
            .find(|(fault, remaining)| *remaining > 0 && fault.matches(&call));
        match hit {
            Some((_, remaining)) => {
                *remaining -= 1;
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn object_key(namespace: &str, bucket: &str, object: &str) -> ObjectKey {
    (namespace.to_string(), bucket.to_string(), object.to_string())
}

fn etag_of(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {} failure", what))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_object(&self, namespace: &str, bucket: &str, object: &str, data: impl Into<Bytes>) {
        self.lock()
            .objects
            .insert(object_key(namespace, bucket, object), data.into());
    }

    pub fn object(&self, namespace: &str, bucket: &str, object: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&object_key(namespace, bucket, object))
            .cloned()
    }

    /// Make the next `times` calls matching `fault` fail.
    pub fn inject(&self, fault: Fault, times: usize) {
        self.lock().faults.push((fault, times));
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Sessions opened but neither committed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.lock().uploads.len()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn head(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
    ) -> StoreResult<Option<ObjectHead>> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Head {
            object: object.to_string(),
        });
        if inner.trip(Fault::Head) {
            return Err(injected("head"));
        }
        Ok(inner
            .objects
            .get(&object_key(namespace, bucket, object))
            .map(|data| ObjectHead {
                content_length: data.len() as u64,
                etag: Some(etag_of(data)),
            }))
    }

    async fn get_range(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        range: ByteRange,
    ) -> StoreResult<Bytes> {
        let mut inner = self.lock();
        if inner.trip(Fault::GetRange(Some(range.start))) {
            inner.calls.push(StoreCall::GetRange {
                object: object.to_string(),
                range,
                ok: false,
            });
            return Err(injected("get"));
        }
        let short = inner.trip(Fault::ShortRead(Some(range.start)));
        let data = inner
            .objects
            .get(&object_key(namespace, bucket, object))
            .cloned();
        let result = match data {
            None => Err(StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: object.to_string(),
            }),
            Some(data) if range.end >= data.len() as u64 => Err(StoreError::InvalidRange {
                range,
                size: data.len() as u64,
            }),
            Some(data) => {
                let end = if short { range.end } else { range.end + 1 };
                Ok(data.slice(range.start as usize..end as usize))
            }
        };
        inner.calls.push(StoreCall::GetRange {
            object: object.to_string(),
            range,
            ok: result.is_ok(),
        });
        result
    }

    async fn put(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        data: Bytes,
        _tier: StorageTier,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let failed = inner.trip(Fault::Put);
        inner.calls.push(StoreCall::Put {
            object: object.to_string(),
            len: data.len(),
            ok: !failed,
        });
        if failed {
            return Err(injected("put"));
        }
        inner
            .objects
            .insert(object_key(namespace, bucket, object), data);
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        namespace: &str,
        bucket: &str,
        object: &str,
        _tier: StorageTier,
    ) -> StoreResult<String> {
        let mut inner = self.lock();
        let failed = inner.trip(Fault::CreateUpload);
        inner.calls.push(StoreCall::CreateUpload {
            object: object.to_string(),
            ok: !failed,
        });
        if failed {
            return Err(injected("create upload"));
        }
        let upload_id = Uuid::new_v4().to_string();
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: object_key(namespace, bucket, object),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<String> {
        let mut inner = self.lock();
        let failed = inner.trip(Fault::UploadPart(Some(part_number)));
        inner.calls.push(StoreCall::UploadPart {
            part_number,
            ok: !failed,
        });
        if failed {
            return Err(injected("part upload"));
        }
        let upload = inner
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::UploadNotFound(upload_id.to_string()))?;
        let etag = etag_of(&data);
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn commit_multipart_upload(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let failed = inner.trip(Fault::Commit);
        inner.calls.push(StoreCall::Commit {
            parts: parts.iter().map(|p| p.part_number).collect(),
            ok: !failed,
        });
        if failed {
            return Err(injected("commit"));
        }
        let upload = inner
            .uploads
            .get(upload_id)
            .ok_or_else(|| StoreError::UploadNotFound(upload_id.to_string()))?;

        let mut assembled = Vec::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.etag => assembled.extend_from_slice(data),
                _ => {
                    return Err(StoreError::PartMismatch {
                        upload_id: upload_id.to_string(),
                        part_number: part.part_number,
                    });
                }
            }
        }

        if let Some(upload) = inner.uploads.remove(upload_id) {
            inner.objects.insert(upload.key, Bytes::from(assembled));
        }
        Ok(())
    }

    async fn abort_multipart_upload(&self, upload_id: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::Abort {
            upload_id: upload_id.to_string(),
        });
        inner
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UploadNotFound(upload_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn faults_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.insert_object("ns", "b", "o", vec![1u8, 2, 3, 4]);
        store.inject(Fault::GetRange(Some(2)), 1);

        let range = ByteRange::new(2, 3);
        assert!(store.get_range("ns", "b", "o", range).await.is_err());
        let bytes = store.get_range("ns", "b", "o", range).await.unwrap();
        assert_eq!(&bytes[..], &[3, 4]);
    }

    #[tokio::test]
    async fn commit_rejects_unknown_etag() {
        let store = MemoryStore::new();
        let id = store
            .create_multipart_upload("ns", "b", "o", StorageTier::Standard)
            .await
            .unwrap();
        store
            .upload_part(&id, 1, Bytes::from_static(b"abc"))
            .await
            .unwrap();
        let err = store
            .commit_multipart_upload(
                &id,
                &[CompletedPart {
                    part_number: 1,
                    etag: "bogus".into(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PartMismatch { part_number: 1, .. }));
        assert!(store.object("ns", "b", "o").is_none());
    }
}

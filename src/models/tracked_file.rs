//! The persisted manifest document and its per-file records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of the manifest, keyed by the joined local path.
///
/// The record is a snapshot taken when the file was tracked. Only the
/// location flags change afterwards, when a transfer lands a copy on disk or
/// in the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TrackedFile {
    /// Canonical join of directory and name; the map key in the document.
    #[serde(skip)]
    pub key: String,

    pub name: String,

    #[serde(rename = "dir")]
    pub directory: String,

    #[serde(rename = "size")]
    pub size_bytes: u64,

    pub namespace: String,

    pub bucket: String,

    #[serde(rename = "multipart")]
    pub is_multipart: bool,

    /// A copy is known to exist in the working directory.
    #[serde(rename = "ondisk", default)]
    pub on_disk: bool,

    /// A copy is known to exist in the remote store.
    #[serde(rename = "incloud", default)]
    pub in_cloud: bool,
}

/// Aggregate counters, always derived from `files`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ManifestStats {
    #[serde(rename = "ondisk")]
    pub count_on_disk: u64,
    #[serde(rename = "incloud")]
    pub count_in_cloud: u64,
    #[serde(rename = "diskspace")]
    pub bytes_on_disk: u64,
    #[serde(rename = "cloudspace")]
    pub bytes_in_cloud: u64,
}

impl ManifestStats {
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a TrackedFile>) -> Self {
        files
            .into_iter()
            .fold(ManifestStats::default(), |mut stats, file| {
                if file.on_disk {
                    stats.count_on_disk += 1;
                    stats.bytes_on_disk += file.size_bytes;
                }
                if file.in_cloud {
                    stats.count_in_cloud += 1;
                    stats.bytes_in_cloud += file.size_bytes;
                }
                stats
            })
    }
}

/// Whole manifest as stored on disk.
///
/// Counters are written for readers of the JSON file but never trusted on
/// load; `recompute` rebuilds them from `files`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestDocument {
    #[serde(flatten)]
    pub stats: ManifestStats,

    #[serde(default)]
    pub files: BTreeMap<String, TrackedFile>,
}

impl ManifestDocument {
    /// Parse a document and restore each record's `key` from the map.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let mut doc: ManifestDocument = serde_json::from_str(raw)?;
        for (key, file) in doc.files.iter_mut() {
            file.key = key.clone();
        }
        doc.recompute();
        Ok(doc)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn recompute(&mut self) {
        self.stats = ManifestStats::from_files(self.files.values());
    }
}

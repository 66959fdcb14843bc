use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("key already exists: {0}")]
    AlreadyExists(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// One entry under a listed prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobEntry {
    /// Name directly under the listed prefix, not a full key.
    pub name: String,
    pub is_folder: bool,
}

/// The blob-store read/write contract the editor core consumes.
///
/// `signed_read_url` doubles as the existence probe: `Ok(None)` means the
/// key does not resolve. Methods return `Send` futures so sessions can run
/// saves on a spawned task.
pub trait BlobStore: Send + Sync {
    fn signed_read_url(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, BlobError>> + Send;

    fn download(&self, key: &str)
        -> impl Future<Output = Result<Option<Vec<u8>>, BlobError>> + Send;

    fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> impl Future<Output = Result<(), BlobError>> + Send;

    fn list(&self, prefix: &str) -> impl Future<Output = Result<Vec<BlobEntry>, BlobError>> + Send;
}

/// In-memory [`BlobStore`] for tests and local development.
///
/// Failure and latency injection cover the save-pipeline error paths:
/// a store that rejects uploads, and one that exceeds the save budget.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
    fail_uploads: AtomicBool,
    upload_delay: Mutex<Option<Duration>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through `upload`.
    pub fn put(&self, key: &str, bytes: impl Into<Vec<u8>>, content_type: &str) {
        self.objects.lock().expect("blob mutex poisoned").insert(
            key.to_string(),
            (bytes.into(), content_type.to_string()),
        );
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .get(key)
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .contains_key(key)
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_upload_delay(&self, delay: Option<Duration>) {
        *self.upload_delay.lock().expect("blob mutex poisoned") = delay;
    }
}

impl BlobStore for MemoryBlobStore {
    async fn signed_read_url(&self, key: &str) -> Result<Option<String>, BlobError> {
        Ok(self
            .contains(key)
            .then(|| format!("memory://signed/{key}")))
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        Ok(self.get(key))
    }

    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<(), BlobError> {
        let delay = *self.upload_delay.lock().expect("blob mutex poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("injected upload failure".to_string()));
        }

        let mut objects = self.objects.lock().expect("blob mutex poisoned");
        if !upsert && objects.contains_key(key) {
            return Err(BlobError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError> {
        let objects = self.objects.lock().expect("blob mutex poisoned");
        let normalized = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        let mut out: Vec<BlobEntry> = Vec::new();
        for key in objects.keys() {
            let Some(rest) = key.strip_prefix(&normalized) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let entry = match rest.split_once('/') {
                Some((folder, _)) => BlobEntry {
                    name: folder.to_string(),
                    is_folder: true,
                },
                None => BlobEntry {
                    name: rest.to_string(),
                    is_folder: false,
                },
            };
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn upload_respects_the_upsert_flag() {
        let store = MemoryBlobStore::new();
        store
            .upload("a/b.csv", b"one", "text/csv", false)
            .await
            .expect("first upload");
        let err = store
            .upload("a/b.csv", b"two", "text/csv", false)
            .await
            .expect_err("conflict");
        assert!(matches!(err, BlobError::AlreadyExists(_)));

        store
            .upload("a/b.csv", b"two", "text/csv", true)
            .await
            .expect("upsert");
        assert_eq!(store.get("a/b.csv").unwrap(), b"two");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn list_reports_files_and_folders_one_level_deep() {
        let store = MemoryBlobStore::new();
        store.put("jobs/12/file.csv", b"x", "text/csv");
        store.put("jobs/12/sub/deep.csv", b"y", "text/csv");
        store.put("other/file.csv", b"z", "text/csv");

        let entries = store.list("jobs/12").await.expect("list");
        assert_eq!(
            entries,
            vec![
                BlobEntry {
                    name: "file.csv".to_string(),
                    is_folder: false
                },
                BlobEntry {
                    name: "sub".to_string(),
                    is_folder: true
                },
            ]
        );
    }
}

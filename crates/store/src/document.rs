//! The document store: one JSON file, one writer at a time.
//!
//! Every mutating accessor runs through [`DocumentStore::mutate`], which holds
//! the write lock across clone → mutate → persist → publish. The lock is a
//! `tokio::sync::Mutex`, which hands out access in FIFO order. Readers never
//! take the write lock; they clone the published `Arc<Document>` and so see
//! either the state before a writer or after it, never a partial write.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Instant,
};

use {
    tokio::{fs, sync::Mutex},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use fontbot_metrics::{counter, histogram, store as store_metrics};

use crate::{
    error::{Error, Result},
    types::Document,
};

/// Size bounds applied by the accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Entries kept per user in each of `downloads` and `uploads`.
    pub activity_cap: usize,
    /// Maximum message queue length.
    pub queue_capacity: usize,
    /// Queued message text is truncated to this many characters.
    pub max_text_len: usize,
    /// Maximum entries in a broadcast record's error list.
    pub broadcast_error_cap: usize,
    /// Broadcast error messages are truncated to this many characters.
    pub error_max_len: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            activity_cap: 20,
            queue_capacity: 1000,
            max_text_len: 4096,
            broadcast_error_cap: 50,
            error_max_len: 200,
        }
    }
}

/// Whether a mutation changed the document and must be written.
pub(crate) enum Change<T> {
    Commit(T),
    Unchanged(T),
}

pub struct DocumentStore {
    path: PathBuf,
    limits: StoreLimits,
    write_lock: Mutex<()>,
    current: RwLock<Arc<Document>>,
}

impl DocumentStore {
    /// Load the document at `path`, creating it when missing.
    ///
    /// The loaded document is written back once so that missing collections
    /// are filled in and the location is known to be writable. Any failure
    /// here is a startup error.
    pub async fn open(path: impl Into<PathBuf>, limits: StoreLimits) -> Result<Self> {
        let path = path.into();
        let document = load_document(&path)
            .await
            .map_err(|e| Error::open(&path, e))?;
        write_document(&path, &document)
            .await
            .map_err(|e| Error::open(&path, e))?;

        info!(
            path = %path.display(),
            users = document.users.len(),
            banned = document.banned_users.len(),
            queued = document.message_queue.len(),
            "document store opened"
        );

        Ok(Self {
            path,
            limits,
            write_lock: Mutex::new(()),
            current: RwLock::new(Arc::new(document)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// A clone of the whole document.
    ///
    /// A `get_raw` followed by [`set_raw`](Self::set_raw) is not atomic:
    /// writers may run in between and their changes are overwritten.
    pub fn get_raw(&self) -> Document {
        Document::clone(&self.snapshot())
    }

    /// Replace the whole document.
    pub async fn set_raw(&self, document: Document) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist("set_raw", &document).await?;
        self.publish(document);
        info!("document replaced");
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Arc<Document> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> T {
        f(&self.snapshot())
    }

    /// Apply one mutation under the write lock and persist it.
    ///
    /// The mutation runs on a copy that is published only after the write
    /// succeeded; on error the in-memory document is unchanged.
    pub(crate) async fn mutate<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Document) -> Change<T>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.get_raw();
        match f(&mut next) {
            Change::Unchanged(out) => Ok(out),
            Change::Commit(out) => {
                self.persist(op, &next).await?;
                self.publish(next);
                Ok(out)
            },
        }
    }

    fn publish(&self, document: Document) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(document);
    }

    async fn persist(&self, op: &'static str, document: &Document) -> Result<()> {
        let started = Instant::now();
        let result = write_document(&self.path, document).await;

        #[cfg(feature = "metrics")]
        {
            histogram!(store_metrics::WRITE_DURATION_SECONDS, "op" => op)
                .record(started.elapsed().as_secs_f64());
            if result.is_ok() {
                counter!(store_metrics::WRITES_TOTAL, "op" => op).increment(1);
            } else {
                counter!(store_metrics::WRITE_ERRORS_TOTAL, "op" => op).increment(1);
            }
        }

        match &result {
            Ok(()) => debug!(
                op,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "document persisted"
            ),
            Err(e) => warn!(op, error = %e, "failed to persist document"),
        }
        result
    }
}

async fn load_document(path: &Path) -> Result<Document> {
    if !fs::try_exists(path).await? {
        info!(path = %path.display(), "no document found, creating an empty one");
        return Ok(Document::default());
    }
    let data = fs::read_to_string(path).await?;
    if data.trim().is_empty() {
        warn!(path = %path.display(), "document file is empty, starting fresh");
        return Ok(Document::default());
    }
    Ok(serde_json::from_str(&data)?)
}

/// Write to a temp file, keep a `.bak` copy of the previous file, then rename
/// the temp file over the target. The target path always holds a complete
/// document.
async fn write_document(path: &Path, document: &Document) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(document)?;
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, json.as_bytes()).await?;

    if fs::try_exists(path).await.unwrap_or(false)
        && let Err(e) = fs::copy(path, sibling(path, ".bak")).await
    {
        warn!(error = %e, "failed to refresh document backup");
    }

    fs::rename(&tmp, path).await?;
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::UserProfile, tempfile::TempDir};

    async fn open_in(dir: &TempDir) -> DocumentStore {
        DocumentStore::open(dir.path().join("db.json"), StoreLimits::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_creates_file_with_all_collections() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(&tmp).await;

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in [
            "users",
            "bannedUsers",
            "messageQueue",
            "fileIdCache",
            "broadcastResults",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn open_fills_missing_collections_and_keeps_existing_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.json");
        std::fs::write(
            &path,
            r#"{"users":{"1":{"id":"1","firstSeen":"2024-01-01T00:00:00Z","lastSeen":"2024-01-02T00:00:00Z"}}}"#,
        )
        .unwrap();

        let store = DocumentStore::open(&path, StoreLimits::default())
            .await
            .unwrap();
        assert!(store.find_user("1").is_some());

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.get("messageQueue").is_some());
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let first = open_in(&tmp).await;
        first
            .add_or_update_user(UserProfile::new("5"))
            .await
            .unwrap();
        drop(first);

        let second = open_in(&tmp).await;
        let third = open_in(&tmp).await;
        assert_eq!(second.get_raw(), third.get_raw());
        assert!(third.find_user("5").is_some());
    }

    #[tokio::test]
    async fn open_rejects_corrupt_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = DocumentStore::open(&path, StoreLimits::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[tokio::test]
    async fn writes_keep_a_backup() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(&tmp).await;
        store
            .add_or_update_user(UserProfile::new("1"))
            .await
            .unwrap();

        assert!(tmp.path().join("db.json.bak").exists());
        assert!(!tmp.path().join("db.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(&tmp).await;

        // A directory where the temp file should go makes the write fail.
        std::fs::create_dir(tmp.path().join("db.json.tmp")).unwrap();

        let result = store.add_or_update_user(UserProfile::new("9")).await;
        assert!(result.is_err());
        assert!(store.find_user("9").is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_never_lose_updates() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(open_in(&tmp).await);

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut profile = UserProfile::new(i.to_string());
                profile.first_name = Some(format!("user-{i}"));
                store.add_or_update_user(profile).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.all_users().len(), 32);
        drop(store);

        let reopened = open_in(&tmp).await;
        let users = reopened.all_users();
        assert_eq!(users.len(), 32);
        for i in 0..32 {
            let user = reopened.find_user(&i.to_string()).unwrap();
            assert_eq!(user.first_name.as_deref(), Some(format!("user-{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn raw_roundtrip_replaces_document() {
        let tmp = TempDir::new().unwrap();
        let store = open_in(&tmp).await;

        let mut doc = store.get_raw();
        doc.file_id_cache.insert("Inter".into(), "file-1".into());
        store.set_raw(doc).await.unwrap();

        assert_eq!(store.cached_file_id("Inter").as_deref(), Some("file-1"));
        let reopened = open_in(&tmp).await;
        assert_eq!(reopened.cached_file_id("Inter").as_deref(), Some("file-1"));
    }
}

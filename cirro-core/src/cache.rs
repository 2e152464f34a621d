use crate::error::{CirroError, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::OwnedMutexGuard;

/// CacheStore maps request paths onto files below `cache_root`. A path is a
/// hit iff its file exists: no size, timestamp or checksum metadata is kept.
/// Entries become visible only through an atomic rename, so an interrupted
/// fill can never satisfy the hit check.
pub struct CacheStore {
    cache_root: PathBuf,
    fills: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheStore {
    pub fn new(cache_root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_root)?;
        Ok(Self {
            cache_root,
            fills: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Absolute path of the cache entry for `request_path`.
    pub fn entry_path(&self, request_path: &str) -> Result<PathBuf> {
        let normalized = normalize_request_path(request_path)?;
        if normalized.is_empty() {
            return Err(CirroError::InvalidRequest(
                "request path cannot be empty".to_string(),
            ));
        }

        let mut path = self.cache_root.clone();
        for component in normalized.split('/') {
            path.push(component);
        }
        Ok(path)
    }

    pub fn contains(&self, request_path: &str) -> bool {
        self.entry_path(request_path)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    pub async fn read(&self, request_path: &str) -> Result<Bytes> {
        let path = self.entry_path(request_path)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(CirroError::NotFound(request_path.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Store a fetched body for `request_path`. The body lands in a temp
    /// file next to the destination and is renamed into place only after a
    /// complete, synced write.
    pub async fn insert(&self, request_path: &str, body: &[u8]) -> Result<()> {
        let entry_path = self.entry_path(request_path)?;
        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = entry_path.with_extension(format!("{}.tmp", ulid::Ulid::new()));
        let mut file = fs::File::create(&tmp_path).await?;
        if let Err(error) = write_and_sync(&mut file, body).await {
            drop(file);
            let _ = fs::remove_file(&tmp_path).await;
            return Err(error);
        }
        drop(file);

        fs::rename(&tmp_path, &entry_path).await?;
        Ok(())
    }

    /// Take the fill lock for `request_path`. At most one holder runs the
    /// fetch-and-store sequence for a path at a time; a waiter must re-check
    /// `contains` once it acquires the lock, since the previous holder
    /// usually filled the entry already.
    pub async fn lock_fill(&self, request_path: &str) -> FillGuard<'_> {
        let lock = {
            let mut fills = match self.fills.lock() {
                Ok(fills) => fills,
                Err(poisoned) => poisoned.into_inner(),
            };
            fills
                .entry(request_path.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        FillGuard {
            store: self,
            request_path: request_path.to_string(),
            _guard: guard,
        }
    }
}

/// Holder of an in-flight fill for one request path. Dropping the guard
/// releases the path and prunes its lock entry once no other request waits
/// on it.
pub struct FillGuard<'a> {
    store: &'a CacheStore,
    request_path: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        let mut fills = match self.store.fills.lock() {
            Ok(fills) => fills,
            Err(poisoned) => poisoned.into_inner(),
        };
        // the map and this guard hold the remaining references
        let unused = fills
            .get(&self.request_path)
            .map(|lock| Arc::strong_count(lock) <= 2)
            .unwrap_or(false);
        if unused {
            fills.remove(&self.request_path);
        }
    }
}

async fn write_and_sync(file: &mut fs::File, body: &[u8]) -> Result<()> {
    file.write_all(body).await?;
    file.sync_all().await?;
    Ok(())
}

/// Normalize a request path into cache-relative form. Rejects empty, `.`
/// and `..` components; the root path normalizes to an empty string.
pub fn normalize_request_path(input: &str) -> Result<String> {
    let trimmed = input.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let mut components = Vec::new();
    for component in trimmed.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(CirroError::InvalidRequest(format!(
                "invalid request path component: {}",
                component
            )));
        }
        components.push(component);
    }

    Ok(components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_fill_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        assert!(!store.contains("/images/logo.png"));
        store.insert("/images/logo.png", b"png-bytes").await.unwrap();
        assert!(store.contains("/images/logo.png"));
        assert_eq!(
            store.read("/images/logo.png").await.unwrap(),
            Bytes::from_static(b"png-bytes")
        );
    }

    #[tokio::test]
    async fn test_read_miss_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        match store.read("/absent.css").await {
            Err(CirroError::NotFound(path)) => assert_eq!(path, "/absent.css"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.entry_path("/../etc/passwd").is_err());
        assert!(store.entry_path("/a/../b").is_err());
        assert!(store.entry_path("/a//b").is_err());
        assert!(store.entry_path("/").is_err());
    }

    #[tokio::test]
    async fn test_partial_write_is_not_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        // an interrupted fill leaves only a temp file behind
        let entry = store.entry_path("/big.bin").unwrap();
        fs::create_dir_all(entry.parent().unwrap()).await.unwrap();
        let tmp = entry.with_extension(format!("{}.tmp", ulid::Ulid::new()));
        fs::write(&tmp, b"part").await.unwrap();

        assert!(!store.contains("/big.bin"));
        assert!(store.read("/big.bin").await.is_err());

        store.insert("/big.bin", b"complete").await.unwrap();
        assert_eq!(
            store.read("/big.bin").await.unwrap(),
            Bytes::from_static(b"complete")
        );
    }

    #[tokio::test]
    async fn test_fill_lock_serializes_fillers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CacheStore::new(dir.path().to_path_buf()).unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = store.lock_fill("/shared.bin").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_normalize_request_path() {
        assert_eq!(normalize_request_path("/a/b.png").unwrap(), "a/b.png");
        assert_eq!(normalize_request_path("/").unwrap(), "");
        assert_eq!(normalize_request_path("").unwrap(), "");
        assert!(normalize_request_path("/..").is_err());
        assert!(normalize_request_path("/a/./b").is_err());
    }
}

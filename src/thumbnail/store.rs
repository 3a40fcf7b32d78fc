/// Persistent blob storage for the slow cache tier.
///
/// The store is a flat directory-like capability: read, write and delete a
/// blob by file name, or wipe everything. Missing blobs are `Ok(None)`, not
/// errors.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Distinguishes temp files of concurrent writes, even across stores
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory-like persistent storage, keyed by file name
pub trait BlobStore: Send + Sync + 'static {
    fn read(&self, name: &str) -> impl Future<Output = io::Result<Option<Vec<u8>>>> + Send;

    fn write(&self, name: &str, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Delete one blob; deleting a missing blob succeeds
    fn remove(&self, name: &str) -> impl Future<Output = io::Result<()>> + Send;

    /// Delete every blob, leaving an empty store
    fn clear(&self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Blob store backed by one directory on the local filesystem
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// Open (creating if needed) the directory backing this store
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "opened blob store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a blob with this name lives at
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl BlobStore for DirectoryStore {
    async fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        // Write then rename so readers never see a partial blob
        let path = self.path_for(name);
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!("{}.{}.tmp", name, seq));
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, &path).await
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn clear(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        tokio::fs::create_dir_all(&self.dir).await
    }
}

/// Two-tier thumbnail cache
///
/// - Memory tier: fixed-capacity LRU of blobs, each bound to a derived URL
///   that is released whenever the blob leaves the tier
/// - Persistent tier: optional `BlobStore`, consulted on memory miss and
///   written back in a detached task on every `set`
///
/// Store mutations are serialised and each write-back carries a per-asset
/// ticket, so a late write can never resurrect a deleted or replaced blob.
///
/// Persistent-tier failures are logged and otherwise behave as a miss or a
/// dropped write. Without a persistent tier the cache is memory-only.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::store::{BlobStore, DirectoryStore};
use crate::state::data::AssetId;

/// Allocates and releases URLs through which a presentation layer loads blobs
pub trait UrlRegistry: Send + Sync {
    fn allocate(&self, asset_id: &AssetId, blob: &Arc<Vec<u8>>) -> String;
    fn release(&self, url: &str);
}

/// In-process `blob:` URL registry
#[derive(Debug, Default)]
pub struct BlobUrls {
    next: AtomicU64,
    live: Mutex<HashSet<String>>,
}

impl BlobUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs allocated and not yet released
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }
}

impl UrlRegistry for BlobUrls {
    fn allocate(&self, _asset_id: &AssetId, _blob: &Arc<Vec<u8>>) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let url = format!("blob:photo-pipeline/{}", n);
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone());
        url
    }

    fn release(&self, url: &str) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }
}

/// A cached blob and the URL currently bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub blob: Arc<Vec<u8>>,
    pub url: String,
}

/// Fixed-capacity LRU keyed by asset
pub struct MemoryCache {
    capacity: usize,
    entries: HashMap<AssetId, CacheEntry>,
    /// Least recently used at the front
    order: VecDeque<AssetId>,
    urls: Arc<dyn UrlRegistry>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl MemoryCache {
    pub fn new(capacity: usize, urls: Arc<dyn UrlRegistry>) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            urls,
        }
    }

    /// Look up and mark as most recently used
    pub fn get(&mut self, asset_id: &AssetId) -> Option<CacheEntry> {
        let entry = self.entries.get(asset_id)?.clone();
        self.touch(asset_id);
        Some(entry)
    }

    pub fn contains(&self, asset_id: &AssetId) -> bool {
        self.entries.contains_key(asset_id)
    }

    /// Insert or replace, releasing the replaced URL, then evict down to capacity
    pub fn set(&mut self, asset_id: &AssetId, blob: Arc<Vec<u8>>) -> CacheEntry {
        if let Some(old) = self.entries.remove(asset_id) {
            self.urls.release(&old.url);
        }
        let url = self.urls.allocate(asset_id, &blob);
        let entry = CacheEntry { blob, url };
        self.entries.insert(asset_id.clone(), entry.clone());
        self.touch(asset_id);

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.urls.release(&evicted.url);
                debug!(asset_id = %oldest, "evicted from memory cache");
            }
        }
        entry
    }

    pub fn remove(&mut self, asset_id: &AssetId) -> bool {
        match self.entries.remove(asset_id) {
            Some(entry) => {
                self.urls.release(&entry.url);
                self.order.retain(|id| id != asset_id);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            self.urls.release(&entry.url);
        }
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn touch(&mut self, asset_id: &AssetId) {
        if let Some(pos) = self.order.iter().position(|id| id == asset_id) {
            self.order.remove(pos);
        }
        self.order.push_back(asset_id.clone());
    }
}

/// Memory tier plus bookkeeping for write-backs still owed to the store
struct Tiers {
    memory: MemoryCache,
    /// Latest write ticket per asset; a write-back whose ticket is gone or
    /// replaced has been superseded and must not touch the store
    writes: HashMap<AssetId, u64>,
    next_write: u64,
    /// Bumped by every mutation; a persistent read promotes only if unchanged
    version: u64,
}

impl Tiers {
    fn is_current(&self, asset_id: &AssetId, ticket: u64) -> bool {
        self.writes.get(asset_id) == Some(&ticket)
    }
}

/// Memory LRU in front of an optional persistent store
pub struct ThumbnailCache<S: BlobStore = DirectoryStore> {
    tiers: Arc<Mutex<Tiers>>,
    store: Option<Arc<S>>,
    /// Serialises store mutations so they land in the order they were issued
    persist: Arc<tokio::sync::Mutex<()>>,
}

impl<S: BlobStore> std::fmt::Debug for ThumbnailCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tiers = self.tiers();
        f.debug_struct("ThumbnailCache")
            .field("memory", &tiers.memory)
            .field("pending_writes", &tiers.writes.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

fn lock_tiers(tiers: &Mutex<Tiers>) -> MutexGuard<'_, Tiers> {
    tiers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: BlobStore> ThumbnailCache<S> {
    pub fn new(capacity: usize, urls: Arc<dyn UrlRegistry>, store: Option<S>) -> Self {
        Self {
            tiers: Arc::new(Mutex::new(Tiers {
                memory: MemoryCache::new(capacity, urls),
                writes: HashMap::new(),
                next_write: 0,
                version: 0,
            })),
            store: store.map(Arc::new),
            persist: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn memory_only(capacity: usize, urls: Arc<dyn UrlRegistry>) -> Self {
        Self::new(capacity, urls, None)
    }

    /// Whether a persistent tier backs this cache
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    fn tiers(&self) -> MutexGuard<'_, Tiers> {
        lock_tiers(&self.tiers)
    }

    /// Memory tier only; never touches storage
    pub fn get_cached(&self, asset_id: &AssetId) -> Option<CacheEntry> {
        self.tiers().memory.get(asset_id)
    }

    /// Memory first, then the persistent tier; a persistent hit is promoted.
    ///
    /// If the asset was set, deleted or cleared while the store was being
    /// read, the stale bytes are dropped and the memory tier answers.
    pub async fn get(&self, asset_id: &AssetId) -> Option<CacheEntry> {
        let version = {
            let mut tiers = self.tiers();
            if let Some(entry) = tiers.memory.get(asset_id) {
                return Some(entry);
            }
            tiers.version
        };
        let store = self.store.as_ref()?;
        match store.read(&asset_id.cache_file_name()).await {
            Ok(Some(bytes)) => {
                let mut tiers = self.tiers();
                if tiers.version != version {
                    debug!(asset_id = %asset_id, "cache changed during read, not promoting");
                    return tiers.memory.get(asset_id);
                }
                debug!(asset_id = %asset_id, "persistent cache hit");
                Some(tiers.memory.set(asset_id, Arc::new(bytes)))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(asset_id = %asset_id, error = %e, "persistent cache read failed");
                None
            }
        }
    }

    /// Store in memory now and write back to the persistent tier in the
    /// background. Returns as soon as the memory write is done.
    ///
    /// Write-backs land in issue order; one overtaken by a later `set`,
    /// `delete` or `clear` of the same asset is skipped.
    pub fn set(&self, asset_id: &AssetId, blob: Vec<u8>) -> CacheEntry {
        let blob = Arc::new(blob);
        let (entry, ticket) = {
            let mut tiers = self.tiers();
            tiers.version += 1;
            let entry = tiers.memory.set(asset_id, blob.clone());
            let ticket = tiers.next_write;
            tiers.next_write += 1;
            if self.store.is_some() {
                tiers.writes.insert(asset_id.clone(), ticket);
            }
            (entry, ticket)
        };

        if let Some(store) = &self.store {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let store = store.clone();
                    let tiers = self.tiers.clone();
                    let persist = self.persist.clone();
                    let asset_id = asset_id.clone();
                    handle.spawn(async move {
                        let _order = persist.lock().await;
                        if !lock_tiers(&tiers).is_current(&asset_id, ticket) {
                            debug!(asset_id = %asset_id, "write-back superseded");
                            return;
                        }
                        if let Err(e) = store.write(&asset_id.cache_file_name(), &blob).await {
                            warn!(asset_id = %asset_id, error = %e, "persistent cache write failed");
                        }
                        let mut tiers = lock_tiers(&tiers);
                        if tiers.is_current(&asset_id, ticket) {
                            tiers.writes.remove(&asset_id);
                        }
                    });
                }
                Err(_) => {
                    self.tiers().writes.remove(asset_id);
                    warn!(asset_id = %asset_id, "no async runtime, persistent write skipped");
                }
            }
        }
        entry
    }

    /// Drop from both tiers
    pub async fn delete(&self, asset_id: &AssetId) {
        {
            let mut tiers = self.tiers();
            tiers.version += 1;
            tiers.memory.remove(asset_id);
            tiers.writes.remove(asset_id);
        }
        if let Some(store) = &self.store {
            let _order = self.persist.lock().await;
            if let Err(e) = store.remove(&asset_id.cache_file_name()).await {
                warn!(asset_id = %asset_id, error = %e, "persistent cache delete failed");
            }
        }
    }

    /// Empty both tiers
    pub async fn clear(&self) {
        {
            let mut tiers = self.tiers();
            tiers.version += 1;
            tiers.memory.clear();
            tiers.writes.clear();
        }
        if let Some(store) = &self.store {
            let _order = self.persist.lock().await;
            if let Err(e) = store.clear().await {
                warn!(error = %e, "persistent cache clear failed");
            }
        }
    }

    /// Empty the memory tier, leaving persistent blobs in place
    pub fn clear_memory(&self) {
        self.tiers().memory.clear();
    }

    pub fn memory_len(&self) -> usize {
        self.tiers().memory.len()
    }

    /// Write-backs issued and not yet finished or superseded
    pub fn pending_writes(&self) -> usize {
        self.tiers().writes.len()
    }
}

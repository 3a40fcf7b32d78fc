/// Thumbnail/preview generation worker
///
/// One service per `GenerationKind`. Requests land in the priority queue;
/// `run` drains it one item at a time: fetch source bytes, decode, shrink to
/// the kind's size, apply any stored edits, encode JPEG, write through the
/// two-tier cache and publish an event. Pixel work happens on the blocking
/// pool so the async runtime stays responsive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::cache::{BlobUrls, ThumbnailCache};
use super::events::ThumbnailEvents;
use super::queue::{ByteSource, Priority, PriorityQueue, QueueItem};
use super::store::{BlobStore, DirectoryStore};
use super::GenerationKind;
use crate::buffer::ImageBuffer;
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{RenderExecutor, RenderQuality, RenderSource};
use crate::state::data::AssetId;
use crate::state::edit::EditState;

/// The request currently being generated
struct ActiveJob {
    asset_id: AssetId,
    /// Result is discarded
    cancelled: bool,
    /// Edits or cache changed mid-flight; result is discarded and the
    /// request goes back on the queue
    stale: bool,
}

pub struct ThumbnailService<S: BlobStore = DirectoryStore> {
    kind: GenerationKind,
    max_edge: u32,
    jpeg_quality: u8,
    queue: Mutex<PriorityQueue>,
    wake: Notify,
    cache: Arc<ThumbnailCache<S>>,
    executor: Arc<RenderExecutor>,
    edits: Mutex<HashMap<AssetId, EditState>>,
    events: Arc<dyn ThumbnailEvents>,
    active: Mutex<Option<ActiveJob>>,
    stopped: AtomicBool,
}

impl<S: BlobStore> std::fmt::Debug for ThumbnailService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailService")
            .field("kind", &self.kind)
            .field("max_edge", &self.max_edge)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl ThumbnailService<DirectoryStore> {
    /// Service with its persistent tier under the configured cache root.
    /// Falls back to a memory-only cache when the directory is unusable.
    pub fn open(
        kind: GenerationKind,
        config: &Config,
        executor: Arc<RenderExecutor>,
        events: Arc<dyn ThumbnailEvents>,
    ) -> Self {
        let store = match config.cache_root() {
            Some(root) => match DirectoryStore::open(root.join(kind.tier_dir())) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!(%kind, error = %e, "persistent cache unavailable, using memory only");
                    None
                }
            },
            None => {
                warn!(%kind, "no cache directory, using memory only");
                None
            }
        };
        let cache = ThumbnailCache::new(
            kind.cache_capacity(config),
            Arc::new(BlobUrls::new()),
            store,
        );
        Self::new(kind, config, Arc::new(cache), executor, events)
    }
}

impl<S: BlobStore> ThumbnailService<S> {
    /// `executor` should be dedicated to this service: each generation
    /// supersedes whatever that executor was rendering.
    pub fn new(
        kind: GenerationKind,
        config: &Config,
        cache: Arc<ThumbnailCache<S>>,
        executor: Arc<RenderExecutor>,
        events: Arc<dyn ThumbnailEvents>,
    ) -> Self {
        Self {
            kind,
            max_edge: kind.max_edge(config),
            jpeg_quality: config.jpeg_quality,
            queue: Mutex::new(PriorityQueue::new(config.queue_capacity)),
            wake: Notify::new(),
            cache,
            executor,
            edits: Mutex::new(HashMap::new()),
            events,
            active: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> GenerationKind {
        self.kind
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache<S>> {
        &self.cache
    }

    /// Requests waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    fn queue(&self) -> MutexGuard<'_, PriorityQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edits(&self) -> MutexGuard<'_, HashMap<AssetId, EditState>> {
        self.edits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for a blob. A memory-tier hit is reported immediately; anything
    /// else is queued (or re-prioritised if already queued).
    pub fn request(&self, asset_id: AssetId, priority: Priority, source: ByteSource) {
        if let Some(entry) = self.cache.get_cached(&asset_id) {
            self.events.on_thumbnail_ready(self.kind, &asset_id, &entry.url);
            return;
        }
        let evicted = self.queue().enqueue(asset_id, priority, source);
        if let Some(item) = evicted {
            debug!(kind = %self.kind, asset_id = %item.asset_id, "queue full, request evicted");
            self.events.on_request_evicted(self.kind, &item.asset_id);
        }
        self.wake.notify_one();
    }

    pub fn update_priority(&self, asset_id: &AssetId, priority: Priority) -> bool {
        self.queue().update_priority(asset_id, priority)
    }

    /// Drop a pending request, or stop the one in flight and discard its result
    pub fn cancel(&self, asset_id: &AssetId) -> bool {
        let removed = self.queue().remove(asset_id).is_some();
        let in_flight = self.mark_active(asset_id, |job| job.cancelled = true);
        in_flight || removed
    }

    /// Edits applied to future generations of this asset. An in-flight
    /// generation of the asset is restarted with the new edits.
    pub fn set_edits(&self, asset_id: AssetId, edits: EditState) {
        self.mark_active(&asset_id, |job| job.stale = true);
        let mut all = self.edits();
        if edits.is_unedited() {
            all.remove(&asset_id);
        } else {
            all.insert(asset_id, edits);
        }
    }

    /// Forget the cached blob in both tiers so the next request regenerates.
    /// An in-flight generation of the asset is restarted rather than cached.
    pub async fn invalidate(&self, asset_id: &AssetId) {
        self.mark_active(asset_id, |job| job.stale = true);
        self.cache.delete(asset_id).await;
        debug!(kind = %self.kind, asset_id = %asset_id, "invalidated");
    }

    /// Flag the active job if it is for `asset_id`, and stop its render at
    /// the next stage boundary
    fn mark_active(&self, asset_id: &AssetId, mark: impl FnOnce(&mut ActiveJob)) -> bool {
        let mut active = self.active();
        match active.as_mut() {
            Some(job) if &job.asset_id == asset_id => {
                mark(job);
                self.executor.cancel();
                true
            }
            _ => false,
        }
    }

    /// Clear the active job, returning its (cancelled, stale) flags
    fn take_active(&self) -> (bool, bool) {
        self.active()
            .take()
            .map_or((false, false), |job| (job.cancelled, job.stale))
    }

    /// Put a restarted job back in line unless a newer request already did
    fn requeue(&self, asset_id: AssetId, priority: Priority, source: ByteSource) {
        let evicted = {
            let mut queue = self.queue();
            if queue.has(&asset_id) {
                return;
            }
            queue.enqueue(asset_id, priority, source)
        };
        if let Some(item) = evicted {
            self.events.on_request_evicted(self.kind, &item.asset_id);
        }
    }

    /// Stop `run` after the current item
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Worker loop: one active generation at a time until `shutdown`
    pub async fn run(self: Arc<Self>) {
        info!(kind = %self.kind, max_edge = self.max_edge, "generation worker started");
        loop {
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            let next = self.queue().dequeue();
            if let Some(item) = &next {
                // Visible to cancel/invalidate from the moment it leaves the queue
                *self.active() = Some(ActiveJob {
                    asset_id: item.asset_id.clone(),
                    cancelled: false,
                    stale: false,
                });
            }
            match next {
                Some(item) => self.generate(item).await,
                None => self.wake.notified().await,
            }
        }
        info!(kind = %self.kind, "generation worker stopped");
    }

    /// Generate the active job. `run` has already registered it in `active`.
    async fn generate(&self, item: QueueItem) {
        let QueueItem {
            asset_id,
            priority,
            source,
            ..
        } = item;

        // Persistent hit: promote instead of regenerating
        if let Some(entry) = self.cache.get(&asset_id).await {
            let (cancelled, stale) = self.take_active();
            if stale {
                self.requeue(asset_id, priority, source);
            } else if !cancelled {
                self.events.on_thumbnail_ready(self.kind, &asset_id, &entry.url);
            }
            return;
        }

        let edits = self.edits().get(&asset_id).cloned();
        let executor = self.executor.clone();
        let (max_edge, quality) = (self.max_edge, self.jpeg_quality);
        let render_source = source.clone();
        let result = tokio::task::spawn_blocking(move || {
            render_blob(&render_source, edits.as_ref(), &executor, max_edge, quality)
        })
        .await;
        let (cancelled, stale) = self.take_active();

        if cancelled {
            debug!(kind = %self.kind, asset_id = %asset_id, "generation cancelled");
            return;
        }
        if stale {
            debug!(kind = %self.kind, asset_id = %asset_id, "edits changed mid-flight, requeued");
            self.requeue(asset_id, priority, source);
            return;
        }
        match result {
            Ok(Ok(Some(blob))) => {
                let size = blob.len();
                let entry = self.cache.set(&asset_id, blob);
                debug!(kind = %self.kind, asset_id = %asset_id, bytes = size, "generated");
                self.events.on_thumbnail_ready(self.kind, &asset_id, &entry.url);
            }
            Ok(Ok(None)) => {
                debug!(kind = %self.kind, asset_id = %asset_id, "render superseded");
            }
            Ok(Err(e)) => {
                warn!(kind = %self.kind, asset_id = %asset_id, error = %e, "generation failed");
                self.events.on_thumbnail_error(self.kind, &asset_id, &e.to_string());
            }
            Err(e) => {
                warn!(kind = %self.kind, asset_id = %asset_id, error = %e, "generation task panicked");
                self.events.on_thumbnail_error(self.kind, &asset_id, &e.to_string());
            }
        }
    }
}

/// Fetch, decode, shrink, edit and encode one asset
fn render_blob(
    source: &ByteSource,
    edits: Option<&EditState>,
    executor: &RenderExecutor,
    max_edge: u32,
    quality: u8,
) -> Result<Option<Vec<u8>>> {
    let bytes = source()?;
    let mut image = ImageBuffer::decode(&bytes)?.resize_to_fit(max_edge)?;
    if let Some(edits) = edits {
        let rendered = executor.render(
            RenderSource::Decoded(Arc::new(image)),
            edits,
            RenderQuality::Full,
        )?;
        match rendered {
            Some(out) => image = out.image,
            None => return Ok(None),
        }
    }
    image.encode_jpeg(quality).map(Some)
}

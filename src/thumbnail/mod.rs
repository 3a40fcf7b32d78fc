/// Thumbnail and preview generation
///
/// Architecture:
/// - `queue.rs` - bounded priority queue of pending requests
/// - `cache.rs` - memory LRU in front of a persistent blob store
/// - `store.rs` - persistent blob store capability and directory backend
/// - `service.rs` - worker that drains the queue through the pipeline
/// - `events.rs` - callbacks for whoever displays the results
///
/// Thumbnails and previews are two independent instances of the same
/// machinery, distinguished by `GenerationKind`.

pub mod cache;
pub mod events;
pub mod queue;
pub mod service;
pub mod store;

use std::fmt;

use crate::config::Config;

pub use cache::{BlobUrls, CacheEntry, MemoryCache, ThumbnailCache, UrlRegistry};
pub use events::{ChannelEvents, NoopEvents, ThumbnailEvent, ThumbnailEvents};
pub use queue::{ByteSource, Priority, PriorityQueue, QueueItem};
pub use service::ThumbnailService;
pub use store::{BlobStore, DirectoryStore};

/// What a generation service produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationKind {
    /// Small grid thumbnail
    Thumbnail,
    /// Large loupe preview
    Preview,
}

impl GenerationKind {
    /// Persistent tier subdirectory under the cache root
    pub fn tier_dir(&self) -> &'static str {
        match self {
            GenerationKind::Thumbnail => "thumbnails",
            GenerationKind::Preview => "previews",
        }
    }

    /// Longest output edge in pixels
    pub fn max_edge(&self, config: &Config) -> u32 {
        match self {
            GenerationKind::Thumbnail => config.thumbnail_size,
            GenerationKind::Preview => config.preview_size,
        }
    }

    /// Memory tier capacity
    pub fn cache_capacity(&self, config: &Config) -> usize {
        match self {
            GenerationKind::Thumbnail => config.thumbnail_cache_capacity,
            GenerationKind::Preview => config.preview_cache_capacity,
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationKind::Thumbnail => write!(f, "thumbnail"),
            GenerationKind::Preview => write!(f, "preview"),
        }
    }
}

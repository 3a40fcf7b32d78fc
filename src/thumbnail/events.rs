/// Callbacks published by the generation service.

use tokio::sync::mpsc::UnboundedSender;

use super::GenerationKind;
use crate::state::data::AssetId;

/// Subscriber interface for generation results. Every method defaults to a
/// no-op so implementors only handle what they display.
pub trait ThumbnailEvents: Send + Sync {
    /// A blob is cached and reachable at `url`
    fn on_thumbnail_ready(&self, _kind: GenerationKind, _asset_id: &AssetId, _url: &str) {}

    /// Generation failed; the asset stays uncached
    fn on_thumbnail_error(&self, _kind: GenerationKind, _asset_id: &AssetId, _error: &str) {}

    /// A pending request was dropped to make room in a full queue
    fn on_request_evicted(&self, _kind: GenerationKind, _asset_id: &AssetId) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl ThumbnailEvents for NoopEvents {}

/// Owned form of an event, for channel delivery
#[derive(Debug, Clone, PartialEq)]
pub enum ThumbnailEvent {
    Ready {
        kind: GenerationKind,
        asset_id: AssetId,
        url: String,
    },
    Error {
        kind: GenerationKind,
        asset_id: AssetId,
        error: String,
    },
    Evicted {
        kind: GenerationKind,
        asset_id: AssetId,
    },
}

/// Forwards events into an unbounded channel; a closed receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: UnboundedSender<ThumbnailEvent>,
}

impl ChannelEvents {
    pub fn new(tx: UnboundedSender<ThumbnailEvent>) -> Self {
        Self { tx }
    }
}

impl ThumbnailEvents for ChannelEvents {
    fn on_thumbnail_ready(&self, kind: GenerationKind, asset_id: &AssetId, url: &str) {
        let _ = self.tx.send(ThumbnailEvent::Ready {
            kind,
            asset_id: asset_id.clone(),
            url: url.to_string(),
        });
    }

    fn on_thumbnail_error(&self, kind: GenerationKind, asset_id: &AssetId, error: &str) {
        let _ = self.tx.send(ThumbnailEvent::Error {
            kind,
            asset_id: asset_id.clone(),
            error: error.to_string(),
        });
    }

    fn on_request_evicted(&self, kind: GenerationKind, asset_id: &AssetId) {
        let _ = self.tx.send(ThumbnailEvent::Evicted {
            kind,
            asset_id: asset_id.clone(),
        });
    }
}

/// End-to-end generation through the queue, pipeline and two-tier cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use photo_pipeline::thumbnail::{
    ByteSource, ChannelEvents, GenerationKind, Priority, ThumbnailEvent, ThumbnailService,
};
use photo_pipeline::{AssetId, Config, ImageBuffer, RenderExecutor};

fn config(dir: &TempDir) -> Config {
    Config {
        cache_dir: Some(dir.path().to_path_buf()),
        thumbnail_size: 32,
        prefer_gpu: false,
        ..Config::default()
    }
}

/// PNG source that counts how often it is read
fn counted_source(calls: Arc<AtomicUsize>) -> ByteSource {
    let png = ImageBuffer::filled(100, 50, [0.8, 0.4, 0.2, 1.0])
        .unwrap()
        .encode_png()
        .unwrap();
    Arc::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(png.clone())
    })
}

fn start(
    cfg: &Config,
) -> (
    Arc<ThumbnailService>,
    mpsc::UnboundedReceiver<ThumbnailEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let service = Arc::new(ThumbnailService::open(
        GenerationKind::Thumbnail,
        cfg,
        Arc::new(RenderExecutor::new(cfg.draft_scale)),
        Arc::new(ChannelEvents::new(tx)),
    ));
    (service, rx)
}

async fn wait_for(path: &std::path::Path) {
    for _ in 0..300 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never written", path.display());
}

#[tokio::test]
async fn generated_thumbnail_survives_restart() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let id = AssetId::new("2024/IMG 0001.png");
    let on_disk = dir
        .path()
        .join("thumbnails")
        .join(id.cache_file_name());
    let calls = Arc::new(AtomicUsize::new(0));

    let (service, mut rx) = start(&cfg);
    assert!(service.cache().is_available());
    let worker = tokio::spawn(service.clone().run());
    service.request(id.clone(), Priority::Visible, counted_source(calls.clone()));

    let ThumbnailEvent::Ready { asset_id, .. } = rx.recv().await.unwrap() else {
        panic!("expected ready event");
    };
    assert_eq!(asset_id, id);
    let entry = service.cache().get_cached(&id).unwrap();
    let thumb = ImageBuffer::decode(&entry.blob).unwrap();
    assert_eq!((thumb.width, thumb.height), (32, 16));

    wait_for(&on_disk).await;
    service.cache().clear_memory();
    assert!(service.cache().get(&id).await.is_some());
    service.shutdown();
    worker.await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A fresh service finds the blob in the persistent tier without reading the source
    let (service, mut rx) = start(&cfg);
    let worker = tokio::spawn(service.clone().run());
    service.request(id.clone(), Priority::Visible, counted_source(calls.clone()));
    assert!(matches!(rx.recv().await.unwrap(), ThumbnailEvent::Ready { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Invalidation forces regeneration
    service.invalidate(&id).await;
    assert!(!on_disk.exists());
    service.request(id.clone(), Priority::Visible, counted_source(calls.clone()));
    assert!(matches!(rx.recv().await.unwrap(), ThumbnailEvent::Ready { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    service.shutdown();
    worker.await.unwrap();
}

#[tokio::test]
async fn worker_drains_by_priority() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let (service, mut rx) = start(&cfg);
    let calls = Arc::new(AtomicUsize::new(0));

    // Queue everything before the worker starts
    for (name, priority) in [
        ("background", Priority::Background),
        ("visible", Priority::Visible),
        ("preload", Priority::Preload),
        ("near", Priority::NearVisible),
    ] {
        service.request(AssetId::new(name), priority, counted_source(calls.clone()));
    }
    assert_eq!(service.pending(), 4);

    let worker = tokio::spawn(service.clone().run());
    let mut order = Vec::new();
    for _ in 0..4 {
        match rx.recv().await.unwrap() {
            ThumbnailEvent::Ready { asset_id, .. } => order.push(asset_id.to_string()),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(order, ["visible", "near", "background", "preload"]);

    service.shutdown();
    worker.await.unwrap();
}

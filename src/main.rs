use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use photo_pipeline::histogram::BINS;
use photo_pipeline::thumbnail::{
    ChannelEvents, GenerationKind, Priority, ThumbnailEvent, ThumbnailService,
};
use photo_pipeline::{
    AssetId, Config, EditState, Histogram, ImageBuffer, RenderExecutor, RenderQuality,
    RenderSource,
};

#[derive(Debug, Parser)]
#[command(
    name = "photo-pipeline",
    version,
    about = "Apply non-destructive photo edits on the GPU or CPU"
)]
struct Args {
    /// Path to a JSON config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace); overrides RUST_LOG
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render an image through the adjustment pipeline
    Render {
        input: PathBuf,
        output: PathBuf,
        /// Edit state JSON to apply (defaults to no edits)
        #[arg(long, value_name = "FILE")]
        edits: Option<PathBuf>,
        /// Render a draft downsampled by this scale (0-1]
        #[arg(long, value_name = "SCALE")]
        draft: Option<f32>,
        /// Skip GPU detection and render on the CPU
        #[arg(long)]
        cpu: bool,
    },
    /// Print histogram and clipping information for an image
    Histogram { input: PathBuf },
    /// Generate a cached thumbnail (or preview) for an image
    Thumbnail {
        input: PathBuf,
        /// Generate the large preview instead
        #[arg(long)]
        preview: bool,
    },
}

fn init_tracing(verbose: u8) {
    const QUIET_GPU: &str = "wgpu_core=warn,wgpu_hal=warn,naga=warn";
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("info,{QUIET_GPU}"))),
        1 => EnvFilter::new(format!("debug,{QUIET_GPU}")),
        _ => EnvFilter::new(format!("trace,{QUIET_GPU}")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        verbose,
        command,
    } = Args::parse();
    init_tracing(verbose);

    let cfg = match &config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    tracing::debug!("configuration: {:?}", cfg);

    match command {
        Command::Render {
            input,
            output,
            edits,
            draft,
            cpu,
        } => render(cfg, &input, &output, edits.as_deref(), draft, cpu).await,
        Command::Histogram { input } => histogram(&input),
        Command::Thumbnail { input, preview } => thumbnail(cfg, input, preview).await,
    }
}

async fn render(
    mut cfg: Config,
    input: &Path,
    output: &Path,
    edits: Option<&Path>,
    draft: Option<f32>,
    cpu: bool,
) -> Result<()> {
    if cpu {
        cfg.prefer_gpu = false;
    }
    let edits = match edits {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read edits from {}", path.display()))?;
            EditState::from_json(&json).context("invalid edit state")?
        }
        None => EditState::default(),
    };
    let quality = match draft {
        Some(scale) if scale > 0.0 && scale <= 1.0 => RenderQuality::Draft { scale },
        Some(scale) => bail!("--draft must be in (0, 1], got {scale}"),
        None => RenderQuality::Full,
    };

    let bytes = std::fs::read(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let executor = executor_for(cfg).await?;

    let started = std::time::Instant::now();
    let rendered = executor
        .render_async(RenderSource::Encoded(Arc::new(bytes)), edits, quality)
        .await?
        .context("render was superseded")?;
    tracing::info!(
        strategy = rendered.strategy,
        width = rendered.image.width,
        height = rendered.image.height,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "rendered"
    );

    save_image(&rendered.image, output)?;
    println!("{}", output.display());
    Ok(())
}

/// JPEG has no alpha channel, so it goes through the JPEG encoder directly
fn save_image(image: &ImageBuffer, path: &Path) -> Result<()> {
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        let bytes = image.encode_jpeg(Config::default().jpeg_quality)?;
        std::fs::write(path, bytes)?;
    } else {
        image
            .to_image()?
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn histogram(input: &Path) -> Result<()> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let image = ImageBuffer::decode(&bytes)?;
    let hist = Histogram::from_buffer(&image);

    println!("{}: {}x{} ({} pixels)", input.display(), image.width, image.height, hist.total());
    println!(
        "shadow clipping:    {:?} {:?}",
        hist.has_shadow_clipping(),
        hist.shadow_clipping().indicator()
    );
    println!(
        "highlight clipping: {:?} {:?}",
        hist.has_highlight_clipping(),
        hist.highlight_clipping().indicator()
    );

    // Coarse luminance bars, 16 buckets
    const BUCKETS: usize = 16;
    let per_bucket = BINS / BUCKETS;
    let counts: Vec<u64> = hist
        .luminance
        .chunks(per_bucket)
        .map(|c| c.iter().map(|&v| v as u64).sum())
        .collect();
    let max = counts.iter().copied().max().unwrap_or(0).max(1);
    for (i, count) in counts.iter().enumerate() {
        let bar = "#".repeat((count * 50 / max) as usize);
        println!("{:>3}-{:<3} {:>9} {}", i * per_bucket, (i + 1) * per_bucket - 1, count, bar);
    }
    Ok(())
}

/// GPU probing blocks, so it runs off the async workers
async fn executor_for(cfg: Config) -> Result<Arc<RenderExecutor>> {
    let executor = tokio::task::spawn_blocking(move || RenderExecutor::with_best_strategy(&cfg))
        .await
        .context("strategy detection failed")?;
    Ok(Arc::new(executor))
}

async fn thumbnail(cfg: Config, input: PathBuf, preview: bool) -> Result<()> {
    let kind = if preview {
        GenerationKind::Preview
    } else {
        GenerationKind::Thumbnail
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let executor = executor_for(cfg.clone()).await?;
    let service = Arc::new(ThumbnailService::open(
        kind,
        &cfg,
        executor,
        Arc::new(ChannelEvents::new(tx)),
    ));
    let worker = tokio::spawn(service.clone().run());

    let asset_id = AssetId::new(input.to_string_lossy());
    let path = input.clone();
    service.request(
        asset_id.clone(),
        Priority::Visible,
        Arc::new(move || std::fs::read(&path)),
    );

    let result = match rx.recv().await {
        Some(ThumbnailEvent::Ready { url, .. }) => {
            let entry = service.cache().get(&asset_id).await;
            let size = entry.map(|e| e.blob.len()).unwrap_or(0);
            println!("{kind} ready: {url} ({size} bytes)");
            if let Some(root) = cfg.cache_root() {
                println!("{}", root.join(kind.tier_dir()).join(asset_id.cache_file_name()).display());
            }
            Ok(())
        }
        Some(ThumbnailEvent::Error { error, .. }) => Err(anyhow::anyhow!(error)),
        Some(ThumbnailEvent::Evicted { .. }) | None => Err(anyhow::anyhow!("request dropped")),
    };

    // Give the write-back a moment before the runtime shuts down
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    service.shutdown();
    worker.await.context("worker panicked")?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_executor_honours_prefer_gpu() {
        let cfg = Config {
            prefer_gpu: false,
            ..Config::default()
        };
        let executor = executor_for(cfg).await.unwrap();
        assert_eq!(executor.strategy_name(), "cpu");
    }
}

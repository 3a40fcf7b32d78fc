/// Pixel pipeline orchestration
///
/// Architecture:
/// - `PixelPipeline` - one execution strategy (GPU compute or CPU loop)
/// - `RenderExecutor` - picks a strategy, tracks render state, cancels
///   superseded renders and falls back to the CPU when the GPU fails
///
/// Every strategy runs the same three stages in the same order:
/// global adjustments, tone curve (skipped when identity), gradient masks.

pub mod cpu;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::buffer::{draft_block_size, ImageBuffer};
use crate::config::Config;
use crate::curve::ToneCurveLut;
use crate::error::{Error, Result};
use crate::gradient::MaskStack;
use crate::state::edit::{AdjustmentSet, EditState};

pub use cpu::CpuPipeline;

/// Where the executor currently is in a render
#[derive(Debug, Clone, PartialEq)]
pub enum RenderState {
    Idle,
    Decoding,
    Adjusting,
    ToneCurve,
    Masking,
    Ready,
    Error(String),
}

/// Output resolution for a render
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderQuality {
    Full,
    /// Box-downsampled by `round(1 / scale)` before processing
    Draft { scale: f32 },
}

/// Pixels to render: already decoded, or encoded bytes still to decode
#[derive(Debug, Clone)]
pub enum RenderSource {
    Decoded(Arc<ImageBuffer>),
    Encoded(Arc<Vec<u8>>),
}

/// Edit state resolved into what the stages consume
#[derive(Debug, Clone)]
pub struct PreparedEdits {
    pub adjustments: AdjustmentSet,
    /// `None` when the curve is the identity and the stage is skipped
    pub lut: Option<ToneCurveLut>,
    pub masks: MaskStack,
}

impl PreparedEdits {
    pub fn from_state(state: &EditState) -> Result<Self> {
        state.validate()?;
        let lut = if state.tone_curve.is_identity() {
            None
        } else {
            Some(state.tone_curve.lut()?.clone())
        };
        Ok(Self {
            adjustments: state.adjustments,
            lut,
            masks: MaskStack::from_state(state),
        })
    }
}

/// Handle for one render request.
///
/// Issuing a newer ticket from the same executor supersedes this one; stages
/// check `enter` at each boundary and abandon the work when it returns false.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    generation: u64,
    latest: Arc<AtomicU64>,
    state: Arc<Mutex<RenderState>>,
}

impl RenderTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }

    /// Record entry into `stage`; false once superseded
    pub fn enter(&self, stage: RenderState) -> bool {
        if !self.is_current() {
            return false;
        }
        if let Ok(mut state) = self.state.lock() {
            *state = stage;
        }
        true
    }

    fn fail(&self, message: String) {
        if self.is_current() {
            if let Ok(mut state) = self.state.lock() {
                *state = RenderState::Error(message);
            }
        }
    }
}

/// One way of running the stages over a buffer
pub trait PixelPipeline: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can take an image of this size
    fn supports(&self, _width: u32, _height: u32) -> bool {
        true
    }

    /// Run every stage. `Ok(None)` means the ticket was superseded midway.
    fn process(
        &self,
        input: &ImageBuffer,
        edits: &PreparedEdits,
        ticket: &RenderTicket,
    ) -> Result<Option<ImageBuffer>>;
}

/// Finished render
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub image: ImageBuffer,
    pub quality: RenderQuality,
    /// Name of the strategy that produced the pixels
    pub strategy: &'static str,
}

/// Drives renders through the best available strategy
pub struct RenderExecutor {
    gpu: Mutex<Option<Arc<dyn PixelPipeline>>>,
    cpu: CpuPipeline,
    latest: Arc<AtomicU64>,
    state: Arc<Mutex<RenderState>>,
    draft_scale: f32,
}

impl std::fmt::Debug for RenderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderExecutor")
            .field("strategy", &self.strategy_name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RenderExecutor {
    /// CPU-only executor
    pub fn new(draft_scale: f32) -> Self {
        Self {
            gpu: Mutex::new(None),
            cpu: CpuPipeline::new(),
            latest: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(RenderState::Idle)),
            draft_scale,
        }
    }

    /// Executor that tries `gpu` first and falls back to the CPU
    pub fn with_gpu(gpu: Arc<dyn PixelPipeline>, draft_scale: f32) -> Self {
        let executor = Self::new(draft_scale);
        if let Ok(mut slot) = executor.gpu.lock() {
            *slot = Some(gpu);
        }
        executor
    }

    /// Probe for a GPU when the config asks for one, else run on the CPU
    pub fn with_best_strategy(config: &Config) -> Self {
        if !config.prefer_gpu {
            info!("GPU disabled by configuration, using CPU pipeline");
            return Self::new(config.draft_scale);
        }
        match pollster::block_on(crate::gpu::GpuPipeline::new()) {
            Ok(gpu) => {
                info!(adapter = %gpu.adapter_name(), "using GPU pipeline");
                Self::with_gpu(Arc::new(gpu), config.draft_scale)
            }
            Err(e) => {
                info!(error = %e, "GPU unavailable, using CPU pipeline");
                Self::new(config.draft_scale)
            }
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self.gpu.lock().ok().and_then(|g| g.as_ref().map(|p| p.name())) {
            Some(name) => name,
            None => self.cpu.name(),
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Draft quality using the configured scale
    pub fn draft_quality(&self) -> RenderQuality {
        RenderQuality::Draft {
            scale: self.draft_scale,
        }
    }

    /// Issue a ticket that supersedes every earlier one
    pub fn begin(&self) -> RenderTicket {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        RenderTicket {
            generation,
            latest: self.latest.clone(),
            state: self.state.clone(),
        }
    }

    /// Abandon any in-flight render
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut state) = self.state.lock() {
            *state = RenderState::Idle;
        }
        debug!("render cancelled");
    }

    /// Render synchronously, superseding any earlier request
    pub fn render(
        &self,
        source: RenderSource,
        edits: &EditState,
        quality: RenderQuality,
    ) -> Result<Option<RenderOutput>> {
        let ticket = self.begin();
        self.render_with(&ticket, source, edits, quality)
    }

    /// Render on the blocking pool. The ticket is issued before the work is
    /// queued, so call order decides which request wins.
    pub async fn render_async(
        self: Arc<Self>,
        source: RenderSource,
        edits: EditState,
        quality: RenderQuality,
    ) -> Result<Option<RenderOutput>> {
        let ticket = self.begin();
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.render_with(&ticket, source, &edits, quality))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Render under an already issued ticket
    pub fn render_with(
        &self,
        ticket: &RenderTicket,
        source: RenderSource,
        edits: &EditState,
        quality: RenderQuality,
    ) -> Result<Option<RenderOutput>> {
        let result = self.run(ticket, source, edits, quality);
        if let Err(e) = &result {
            warn!(error = %e, "render failed");
            ticket.fail(e.to_string());
        }
        result
    }

    fn run(
        &self,
        ticket: &RenderTicket,
        source: RenderSource,
        edits: &EditState,
        quality: RenderQuality,
    ) -> Result<Option<RenderOutput>> {
        if !ticket.enter(RenderState::Decoding) {
            return Ok(None);
        }
        let decoded = match source {
            RenderSource::Decoded(buffer) => buffer,
            RenderSource::Encoded(bytes) => Arc::new(ImageBuffer::decode(&bytes)?),
        };
        let prepared = PreparedEdits::from_state(edits)?;

        let input = match quality {
            RenderQuality::Full => decoded,
            RenderQuality::Draft { scale } => {
                Arc::new(decoded.downsample_box(draft_block_size(scale)))
            }
        };
        if !ticket.is_current() {
            return Ok(None);
        }

        let Some((image, strategy)) = self.execute(&input, &prepared, ticket)? else {
            return Ok(None);
        };

        if !ticket.enter(RenderState::Ready) {
            return Ok(None);
        }
        debug!(
            width = image.width,
            height = image.height,
            strategy,
            "render finished"
        );
        Ok(Some(RenderOutput {
            image,
            quality,
            strategy,
        }))
    }

    /// GPU first when present; a GPU failure disables it and reruns on CPU
    fn execute(
        &self,
        input: &ImageBuffer,
        edits: &PreparedEdits,
        ticket: &RenderTicket,
    ) -> Result<Option<(ImageBuffer, &'static str)>> {
        let gpu = self.gpu.lock().ok().and_then(|g| g.clone());
        let mut gpu_failed = false;

        if let Some(gpu) = gpu {
            if gpu.supports(input.width, input.height) {
                match gpu.process(input, edits, ticket) {
                    Ok(out) => return Ok(out.map(|img| (img, gpu.name()))),
                    Err(e) => {
                        warn!(error = %e, "GPU pipeline failed, falling back to CPU");
                        if let Ok(mut slot) = self.gpu.lock() {
                            *slot = None;
                        }
                        gpu_failed = true;
                    }
                }
            } else {
                debug!(
                    width = input.width,
                    height = input.height,
                    "image exceeds GPU limits, using CPU"
                );
            }
        }

        match self.cpu.process(input, edits, ticket) {
            Ok(out) => Ok(out.map(|img| (img, self.cpu.name()))),
            Err(e) if gpu_failed => {
                warn!(error = %e, "CPU fallback failed");
                Err(Error::NoExecutionPath)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurvePoint;

    /// Strategy that always fails, to exercise the fallback path
    struct BrokenGpu;

    impl PixelPipeline for BrokenGpu {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn process(
            &self,
            _input: &ImageBuffer,
            _edits: &PreparedEdits,
            _ticket: &RenderTicket,
        ) -> Result<Option<ImageBuffer>> {
            Err(Error::Gpu("device lost".into()))
        }
    }

    /// Strategy that issues a newer generation mid-render
    struct Superseding(Arc<AtomicU64>);

    impl PixelPipeline for Superseding {
        fn name(&self) -> &'static str {
            "superseding"
        }

        fn process(
            &self,
            input: &ImageBuffer,
            _edits: &PreparedEdits,
            ticket: &RenderTicket,
        ) -> Result<Option<ImageBuffer>> {
            self.0.fetch_add(1, Ordering::AcqRel);
            if !ticket.enter(RenderState::Adjusting) {
                return Ok(None);
            }
            Ok(Some(input.clone()))
        }
    }

    fn grey(w: u32, h: u32) -> Arc<ImageBuffer> {
        Arc::new(ImageBuffer::filled(w, h, [0.25, 0.25, 0.25, 1.0]).unwrap())
    }

    #[test]
    fn test_exposure_render_doubles_values() {
        let executor = RenderExecutor::new(0.25);
        let mut edits = EditState::default();
        edits.adjustments.exposure = 1.0;
        let out = executor
            .render(RenderSource::Decoded(grey(4, 4)), &edits, RenderQuality::Full)
            .unwrap()
            .unwrap();
        assert_eq!(out.strategy, "cpu");
        for p in &out.image.pixels {
            assert!((p[0] - 0.5).abs() < 1e-6);
            assert_eq!(p[3], 1.0);
        }
        assert_eq!(executor.state(), RenderState::Ready);
    }

    #[test]
    fn test_draft_quality_downsamples() {
        let executor = RenderExecutor::new(0.25);
        let out = executor
            .render(
                RenderSource::Decoded(grey(16, 10)),
                &EditState::default(),
                executor.draft_quality(),
            )
            .unwrap()
            .unwrap();
        assert_eq!((out.image.width, out.image.height), (4, 3));
    }

    #[test]
    fn test_gpu_failure_falls_back_to_cpu() {
        let executor = RenderExecutor::with_gpu(Arc::new(BrokenGpu), 0.25);
        assert_eq!(executor.strategy_name(), "broken");
        let out = executor
            .render(RenderSource::Decoded(grey(2, 2)), &EditState::default(), RenderQuality::Full)
            .unwrap()
            .unwrap();
        assert_eq!(out.strategy, "cpu");
        assert_eq!(executor.strategy_name(), "cpu");
    }

    #[test]
    fn test_superseded_render_returns_none() {
        let mut executor = RenderExecutor::new(0.25);
        let racer = Superseding(executor.latest.clone());
        *executor.gpu.get_mut().unwrap() = Some(Arc::new(racer));
        let out = executor
            .render(RenderSource::Decoded(grey(2, 2)), &EditState::default(), RenderQuality::Full)
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_cancel_before_run_yields_none() {
        let executor = RenderExecutor::new(0.25);
        let ticket = executor.begin();
        executor.cancel();
        let out = executor
            .render_with(
                &ticket,
                RenderSource::Decoded(grey(2, 2)),
                &EditState::default(),
                RenderQuality::Full,
            )
            .unwrap();
        assert!(out.is_none());
        assert_eq!(executor.state(), RenderState::Idle);
    }

    #[test]
    fn test_bad_bytes_set_error_state() {
        let executor = RenderExecutor::new(0.25);
        let result = executor.render(
            RenderSource::Encoded(Arc::new(vec![1, 2, 3])),
            &EditState::default(),
            RenderQuality::Full,
        );
        assert!(result.is_err());
        assert!(matches!(executor.state(), RenderState::Error(_)));
    }

    #[test]
    fn test_prepared_edits_skip_identity_curve() {
        let mut state = EditState::default();
        assert!(PreparedEdits::from_state(&state).unwrap().lut.is_none());
        state
            .tone_curve
            .set_points(vec![
                CurvePoint::new(0.0, 0.0),
                CurvePoint::new(0.5, 0.6),
                CurvePoint::new(1.0, 1.0),
            ])
            .unwrap();
        assert!(PreparedEdits::from_state(&state).unwrap().lut.is_some());
    }

    #[tokio::test]
    async fn test_render_async_last_request_wins() {
        let executor = Arc::new(RenderExecutor::new(0.25));
        let first = executor.begin();
        let out = executor
            .clone()
            .render_async(
                RenderSource::Decoded(grey(2, 2)),
                EditState::default(),
                RenderQuality::Full,
            )
            .await
            .unwrap();
        assert!(out.is_some());
        assert!(!first.is_current());
    }
}

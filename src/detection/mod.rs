//! Detection loop: video frame → landmark inference → filter → publish.
//!
//! The loop moves through [`LoopState::Idle`], `Initializing`, `Running` and
//! `Stopped`. While running, each tick from the scheduler performs at most
//! one detection cycle, gated by the target detection rate. The next tick is
//! only requested once the current cycle has fully resolved, so there is
//! never more than one inference in flight. Every suspension point is
//! followed by a liveness check: a result arriving after teardown is dropped
//! without touching the filter or the consumer.

/// Cadence gate and detector timestamps
pub mod cadence;

/// Consumers of detection results
pub mod publisher;

use crate::error::InitStage;
use crate::filters::{PointFilter, SmoothingState};
use crate::landmark::{FaceLandmarkerResult, TrackedLandmarkIndex};
use crate::liveness::LivenessToken;
use crate::mapper::{world_target, MapperConfig};
use crate::scheduler::FrameScheduler;
use crate::{Error, Result};
use cadence::{CadenceGate, TimestampSequence};
use log::{debug, info, warn};
use opencv::core::Mat;
use std::future::Future;
use tokio::sync::watch;

pub use publisher::{PosePublisher, PoseSubscription, TrackingConsumer};

/// Size of a video frame in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A frame exists once both dimensions are non-zero
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Size after downscaling by `scale`, never below one pixel
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn scaled(&self, scale: f64) -> Self {
        let scale_dim = |d: u32| ((f64::from(d) * scale).round() as u32).max(1);
        Self::new(scale_dim(self.width), scale_dim(self.height))
    }
}

/// Face landmark inference engine
#[allow(async_fn_in_trait)]
pub trait LandmarkDetector {
    /// Run inference on one frame. Timestamps must strictly increase.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails for this frame
    async fn detect_for_video(&mut self, frame: &Mat, timestamp_ms: u64) -> Result<FaceLandmarkerResult>;

    /// Release inference resources
    fn close(&mut self);
}

/// Live video feed
pub trait VideoSource {
    /// Current frame size, zero before the first frame arrives
    fn frame_size(&self) -> FrameSize;

    /// Draw the current frame into `target` at `size`, reusing its buffer.
    /// Returns false when no frame is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be copied or resized
    fn draw_into(&mut self, target: &mut Mat, size: FrameSize) -> Result<bool>;

    /// Stop capturing and release the device
    fn release(&mut self);
}

/// Detection loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Initializing,
    Running,
    Stopped,
}

/// What a single call to [`DetectionLoop::step`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// The loop is not running
    Inactive,
    /// The video source has no frame yet
    FrameNotReady,
    /// Skipped by the cadence gate
    Throttled,
    /// A face was found and the filter updated
    Tracked(SmoothingState),
    /// Inference ran and found no face
    NoFace,
    /// Teardown was requested before the result could be applied
    Discarded,
    /// Capture or inference failed for this cycle
    Failed,
}

/// Counters for one detection session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub cycles: u64,
    pub tracked: u64,
    pub missed: u64,
    pub throttled: u64,
    pub not_ready: u64,
    pub discarded: u64,
    pub failed: u64,
}

impl DetectionStats {
    fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Inactive => {}
            CycleOutcome::FrameNotReady => self.not_ready += 1,
            CycleOutcome::Throttled => self.throttled += 1,
            CycleOutcome::Tracked(_) => {
                self.cycles += 1;
                self.tracked += 1;
            }
            CycleOutcome::NoFace => {
                self.cycles += 1;
                self.missed += 1;
            }
            CycleOutcome::Discarded => self.discarded += 1,
            CycleOutcome::Failed => self.failed += 1,
        }
    }
}

/// Fixed settings of a detection loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    /// Frame downscale factor in `(0, 1]`
    pub scale: f64,
    /// Landmark that drives the camera
    pub landmark: TrackedLandmarkIndex,
    /// Minimum time between two cycles
    pub min_interval_ms: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            landmark: TrackedLandmarkIndex::default(),
            min_interval_ms: crate::constants::MS_PER_SECOND / crate::constants::DEFAULT_DETECTION_FPS,
        }
    }
}

/// Resources owned by a running loop
struct DetectionSession<V, D> {
    video: V,
    detector: D,
    scratch: Mat,
    gate: CadenceGate,
    timestamps: TimestampSequence,
}

/// Throttled detection loop owning the video source and the detector
pub struct DetectionLoop<V: VideoSource, D: LandmarkDetector> {
    state: LoopState,
    session: Option<DetectionSession<V, D>>,
    settings: DetectionSettings,
    filter: Box<dyn PointFilter>,
    mapper: watch::Receiver<MapperConfig>,
    consumer: Box<dyn TrackingConsumer>,
    liveness: LivenessToken,
    stats: DetectionStats,
}

impl<V: VideoSource, D: LandmarkDetector> DetectionLoop<V, D> {
    pub fn new(
        settings: DetectionSettings,
        filter: Box<dyn PointFilter>,
        mapper: watch::Receiver<MapperConfig>,
        consumer: Box<dyn TrackingConsumer>,
        liveness: LivenessToken,
    ) -> Self {
        Self {
            state: LoopState::Idle,
            session: None,
            settings,
            filter,
            mapper,
            consumer,
            liveness,
            stats: DetectionStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats
    }

    /// Current filter estimate
    pub fn smoothing_state(&self) -> SmoothingState {
        self.filter.state()
    }

    /// Acquire the video source and load the detector concurrently.
    ///
    /// The loop only starts running once both are ready. If teardown was
    /// requested meanwhile, whatever was acquired is released and the loop
    /// stops without error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Initialization` if either collaborator failed; the
    /// other one is released and the loop is left `Stopped`.
    pub async fn initialize<VF, DF>(&mut self, video: VF, detector: DF) -> Result<()>
    where
        VF: Future<Output = Result<V>>,
        DF: Future<Output = Result<D>>,
    {
        if self.state != LoopState::Idle {
            return Err(Error::InvalidInput(format!(
                "Detection loop cannot initialize from state {:?}",
                self.state
            )));
        }
        self.state = LoopState::Initializing;
        info!("Initializing detection loop");

        let (video, detector) = tokio::join!(video, detector);

        if !self.liveness.is_alive() {
            info!("Teardown requested during initialization, releasing resources");
            if let Ok(mut detector) = detector {
                detector.close();
            }
            if let Ok(mut video) = video {
                video.release();
            }
            self.state = LoopState::Stopped;
            return Ok(());
        }

        match (video, detector) {
            (Ok(video), Ok(detector)) => {
                self.filter.reset();
                self.session = Some(DetectionSession {
                    video,
                    detector,
                    scratch: Mat::default(),
                    gate: CadenceGate::new(self.settings.min_interval_ms),
                    timestamps: TimestampSequence::default(),
                });
                self.state = LoopState::Running;
                info!(
                    "Detection loop running (scale {}, landmark {}, interval {:.1} ms)",
                    self.settings.scale, self.settings.landmark.0, self.settings.min_interval_ms
                );
                Ok(())
            }
            (Err(e), Ok(mut detector)) => {
                detector.close();
                self.state = LoopState::Stopped;
                Err(Error::initialization(InitStage::VideoSource, e))
            }
            (Ok(mut video), Err(e)) => {
                video.release();
                self.state = LoopState::Stopped;
                Err(Error::initialization(InitStage::Detector, e))
            }
            (Err(e), Err(detector_err)) => {
                warn!("Detector also failed to load: {detector_err}");
                self.state = LoopState::Stopped;
                Err(Error::initialization(InitStage::VideoSource, e))
            }
        }
    }

    /// Perform at most one detection cycle for a tick at `now_ms`
    pub async fn step(&mut self, now_ms: f64) -> CycleOutcome {
        let outcome = self.cycle(now_ms).await;
        self.stats.record(&outcome);
        outcome
    }

    async fn cycle(&mut self, now_ms: f64) -> CycleOutcome {
        if self.state != LoopState::Running {
            return CycleOutcome::Inactive;
        }
        let Some(session) = self.session.as_mut() else {
            return CycleOutcome::Inactive;
        };
        if !self.liveness.is_alive() {
            return CycleOutcome::Discarded;
        }

        let size = session.video.frame_size();
        if !size.is_valid() {
            return CycleOutcome::FrameNotReady;
        }
        if !session.gate.is_open(now_ms) {
            return CycleOutcome::Throttled;
        }

        // The gate is only claimed once a frame is in hand
        let target = size.scaled(self.settings.scale);
        match session.video.draw_into(&mut session.scratch, target) {
            Ok(true) => session.gate.mark(now_ms),
            Ok(false) => return CycleOutcome::FrameNotReady,
            Err(e) => {
                warn!("Failed to capture frame: {e}");
                return CycleOutcome::Failed;
            }
        }

        let timestamp = session.timestamps.next(now_ms);
        let result = session.detector.detect_for_video(&session.scratch, timestamp).await;

        if !self.liveness.is_alive() {
            debug!("Dropping detection result for {timestamp} ms after teardown");
            return CycleOutcome::Discarded;
        }

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!("Landmark detection failed: {e}");
                return CycleOutcome::Failed;
            }
        };

        let tracked = result
            .first_face()
            .and_then(|landmarks| self.settings.landmark.select(landmarks).map(|raw| (landmarks, raw)));

        match tracked {
            Some((landmarks, raw)) => {
                let cfg = *self.mapper.borrow();
                self.filter.retune(&cfg.smoothing);
                let state = self.filter.update(Some(world_target(&raw, &cfg)));
                self.consumer.on_landmarks(landmarks);
                self.consumer.on_update(Some(state));
                CycleOutcome::Tracked(state)
            }
            None => {
                if result.first_face().is_some() {
                    debug!("Landmark {} missing from detector output", self.settings.landmark.0);
                }
                self.consumer.on_landmarks(&[]);
                self.consumer.on_update(None);
                CycleOutcome::NoFace
            }
        }
    }

    /// Run cycles until the scheduler ends or the session is cancelled,
    /// then stop.
    pub async fn run<S: FrameScheduler>(&mut self, scheduler: &mut S) -> DetectionStats {
        while self.state == LoopState::Running {
            let tick = tokio::select! {
                biased;
                () = self.liveness.cancelled() => None,
                tick = scheduler.next_tick() => tick,
            };
            let Some(now_ms) = tick else {
                break;
            };
            self.step(now_ms).await;
        }
        self.stop();
        self.stats
    }

    /// Close the detector, then release the video source. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.detector.close();
            session.video.release();
            info!(
                "Detection loop stopped after {} cycles ({} tracked, {} missed)",
                self.stats.cycles, self.stats.tracked, self.stats.missed
            );
        }
        self.state = LoopState::Stopped;
    }
}

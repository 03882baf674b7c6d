//! Session lifecycle: wiring, concurrent start and ordered teardown.
//!
//! A session owns the liveness flag, the live mapper configuration and both
//! loops. Detection initialization and rendering start together on one task;
//! the render loop decides when the session ends. Teardown always cancels
//! liveness first, then stops detection (detector before video), then
//! disposes the renderer.

use crate::config::{Config, LiveConfig};
use crate::detection::{DetectionLoop, DetectionStats, LandmarkDetector, PosePublisher, VideoSource};
use crate::liveness::Liveness;
use crate::render::{PerspectiveCamera, RenderExit, RenderLoop, SceneRenderer};
use crate::scheduler::FrameScheduler;
use crate::{Error, Result};
use log::{error, info, warn};
use std::future::Future;
use std::path::PathBuf;

/// Outcome of a finished session
#[derive(Debug)]
pub struct SessionReport {
    /// Why detection never started, if it did not
    pub init_error: Option<Error>,
    /// How the render loop ended
    pub render_exit: RenderExit,
    /// Detection counters
    pub stats: DetectionStats,
}

/// One head-tracking session
pub struct Lifecycle<V: VideoSource, D: LandmarkDetector, R: SceneRenderer> {
    liveness: Liveness,
    live: LiveConfig,
    detection: DetectionLoop<V, D>,
    render: RenderLoop<R>,
    deactivated: bool,
}

impl<V: VideoSource, D: LandmarkDetector, R: SceneRenderer> Lifecycle<V, D, R> {
    /// Wire a session from configuration
    pub fn new(config: &Config, config_path: Option<PathBuf>, renderer: R) -> Result<Self> {
        config.validate()?;

        let liveness = Liveness::new();
        let live = LiveConfig::new(config.mapper, config_path);
        let (publisher, subscription) = PosePublisher::channel();

        let detection = DetectionLoop::new(
            config.detection_settings(),
            config.create_filter()?,
            live.subscribe(),
            Box::new(publisher),
            liveness.token(),
        );

        let camera = PerspectiveCamera::new(
            config.display.fov,
            1.0,
            config.display.near,
            config.display.far,
        );
        let render = RenderLoop::new(renderer, camera, subscription, live.subscribe(), config.initial_state());

        Ok(Self {
            liveness,
            live,
            detection,
            render,
            deactivated: false,
        })
    }

    /// Handle that tears the session down when cancelled, e.g. from a
    /// signal handler
    pub fn shutdown_handle(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn live_config(&self) -> &LiveConfig {
        &self.live
    }

    pub fn detection(&self) -> &DetectionLoop<V, D> {
        &self.detection
    }

    pub fn render(&self) -> &RenderLoop<R> {
        &self.render
    }

    /// Run the session until the render loop ends, then tear down.
    ///
    /// Detection initialization failures are logged and reported; rendering
    /// carries on with the default camera.
    pub async fn run<VF, DF, SD, SR>(
        &mut self,
        video: VF,
        detector: DF,
        detection_ticks: &mut SD,
        render_ticks: &mut SR,
    ) -> Result<SessionReport>
    where
        VF: Future<Output = Result<V>>,
        DF: Future<Output = Result<D>>,
        SD: FrameScheduler,
        SR: FrameScheduler,
    {
        let Self {
            liveness,
            live,
            detection,
            render,
            ..
        } = self;
        let token = liveness.token();

        let detection_task = async {
            match detection.initialize(video, detector).await {
                Ok(()) => {
                    detection.run(detection_ticks).await;
                    None
                }
                Err(e) => {
                    error!("Head tracking unavailable: {e}");
                    Some(e)
                }
            }
        };

        let render_task = async {
            let exit = loop {
                match render.run(render_ticks, &token).await {
                    Ok(RenderExit::ReloadRequested) => {
                        if let Err(e) = live.reload() {
                            warn!("Keeping current settings: {e}");
                        }
                    }
                    other => break other,
                }
            };
            liveness.cancel();
            exit
        };

        let (init_error, render_exit) = tokio::join!(detection_task, render_task);
        self.deactivate();

        let render_exit = render_exit?;
        let stats = self.detection.stats();
        info!("Session ended ({render_exit:?})");
        Ok(SessionReport {
            init_error,
            render_exit,
            stats,
        })
    }

    /// Cancel liveness, stop detection and dispose the renderer. Idempotent.
    pub fn deactivate(&mut self) {
        self.liveness.cancel();
        self.detection.stop();
        self.render.dispose();
        if !self.deactivated {
            self.deactivated = true;
            info!("Session deactivated");
        }
    }
}

impl<V: VideoSource, D: LandmarkDetector, R: SceneRenderer> Drop for Lifecycle<V, D, R> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

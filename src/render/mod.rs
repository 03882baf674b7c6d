//! Render loop: latest pose → camera transform → frame.
//!
//! The render loop never waits on detection. Each tick reads whatever pose
//! was last published, maps it with the current mapper coefficients and the
//! viewport size, applies it to the camera and renders.

/// Perspective camera model
pub mod camera;

/// OpenCV window renderer
pub mod wireframe;

use crate::detection::PoseSubscription;
use crate::filters::SmoothingState;
use crate::landmark::NormalizedPoint;
use crate::liveness::LivenessToken;
use crate::mapper::{map_to_camera, CameraTransform, MapperConfig};
use crate::scheduler::FrameScheduler;
use crate::Result;
use log::{debug, info};
use tokio::sync::watch;

pub use camera::PerspectiveCamera;
pub use wireframe::WireframeRenderer;

/// Drawable area in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Width over height, 1 for an empty viewport
    pub fn aspect(&self) -> f64 {
        if self.is_valid() {
            f64::from(self.width) / f64::from(self.height)
        } else {
            1.0
        }
    }
}

/// User request raised by the renderer's input handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCommand {
    Quit,
    ReloadConfig,
}

/// Why [`RenderLoop::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderExit {
    /// The user asked to quit
    Quit,
    /// The user asked to reload the configuration file
    ReloadRequested,
    /// The scheduler produced no more ticks
    SchedulerClosed,
    /// The session was torn down
    Cancelled,
}

/// Rendering backend
pub trait SceneRenderer {
    /// Current drawable size
    fn viewport(&self) -> Viewport;

    /// Resize the render target
    fn resize(&mut self, viewport: Viewport) -> Result<()>;

    /// Report a viewport change made outside the program, such as the user
    /// resizing the window
    fn poll_resize(&mut self) -> Result<Option<Viewport>> {
        Ok(None)
    }

    /// Draw one frame through `camera`, with the latest landmarks as overlay
    fn render(&mut self, camera: &PerspectiveCamera, overlay: &[NormalizedPoint]) -> Result<()>;

    /// Pending user command, if any
    fn poll_input(&mut self) -> Result<Option<RenderCommand>> {
        Ok(None)
    }

    /// Release the render target
    fn dispose(&mut self);
}

/// Display-rate loop applying the latest pose to the camera
pub struct RenderLoop<R: SceneRenderer> {
    renderer: R,
    camera: PerspectiveCamera,
    subscription: PoseSubscription,
    mapper: watch::Receiver<MapperConfig>,
    initial: SmoothingState,
    frames: u64,
    disposed: bool,
}

impl<R: SceneRenderer> RenderLoop<R> {
    pub fn new(
        renderer: R,
        mut camera: PerspectiveCamera,
        subscription: PoseSubscription,
        mapper: watch::Receiver<MapperConfig>,
        initial: SmoothingState,
    ) -> Self {
        camera.set_aspect(renderer.viewport());
        Self {
            renderer,
            camera,
            subscription,
            mapper,
            initial,
            frames: 0,
            disposed: false,
        }
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Transform the camera would get right now, without rendering
    pub fn current_transform(&self) -> CameraTransform {
        let pose = (*self.subscription.pose.borrow()).unwrap_or(self.initial);
        let cfg = *self.mapper.borrow();
        let viewport = self.renderer.viewport();
        map_to_camera(&pose, &cfg, viewport.width, viewport.height)
    }

    /// Apply the latest pose and render one frame
    pub fn tick(&mut self) -> Result<CameraTransform> {
        let transform = self.current_transform();
        self.camera.apply(&transform, self.renderer.viewport());
        let overlay = self.subscription.overlay.borrow().clone();
        self.renderer.render(&self.camera, &overlay)?;
        self.frames += 1;
        Ok(transform)
    }

    /// Update the camera aspect and the render target for a new viewport
    pub fn resize(&mut self, viewport: Viewport) -> Result<()> {
        if !viewport.is_valid() {
            debug!("Ignoring empty viewport {}x{}", viewport.width, viewport.height);
            return Ok(());
        }
        self.renderer.resize(viewport)?;
        self.camera.set_aspect(viewport);
        Ok(())
    }

    /// Render every tick until quit, reload, cancellation or the end of
    /// the scheduler.
    pub async fn run<S: FrameScheduler>(&mut self, scheduler: &mut S, liveness: &LivenessToken) -> Result<RenderExit> {
        loop {
            if !liveness.is_alive() {
                return Ok(RenderExit::Cancelled);
            }
            let tick = tokio::select! {
                biased;
                () = liveness.cancelled() => return Ok(RenderExit::Cancelled),
                tick = scheduler.next_tick() => tick,
            };
            if tick.is_none() {
                return Ok(RenderExit::SchedulerClosed);
            }

            if let Some(viewport) = self.renderer.poll_resize()? {
                self.resize(viewport)?;
            }
            self.tick()?;

            match self.renderer.poll_input()? {
                Some(RenderCommand::Quit) => {
                    info!("Quit requested");
                    return Ok(RenderExit::Quit);
                }
                Some(RenderCommand::ReloadConfig) => return Ok(RenderExit::ReloadRequested),
                None => {}
            }
        }
    }

    /// Release the renderer. Idempotent.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.renderer.dispose();
            info!("Renderer disposed after {} frames", self.frames);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_aspect() {
        assert!((Viewport::new(1920, 1080).aspect() - 16.0 / 9.0).abs() < 1e-12);
        assert!((Viewport::default().aspect() - 1.0).abs() < f64::EPSILON);
        assert!(!Viewport::new(0, 10).is_valid());
    }
}

//! Wireframe scene drawn into an `OpenCV` window.

use super::{PerspectiveCamera, RenderCommand, SceneRenderer, Viewport};
use crate::landmark::NormalizedPoint;
use crate::utils::safe_cast::{f64_to_i32_clamp, u32_to_i32};
use crate::{Error, Result};
use log::{debug, info, warn};
use nalgebra::{Point2, Vector3};
use opencv::core::{self, Mat, Point, Rect, Scalar, CV_8UC3};
use opencv::highgui::{self, WINDOW_NORMAL, WND_PROP_VISIBLE};
use opencv::imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8, LINE_AA};
use opencv::prelude::*;
use std::time::{Duration, Instant};

/// Default window title
pub const WINDOW_TITLE: &str = "Head Parallax";

const KEY_ESC: i32 = 27;

/// Floor grid size in world units and number of divisions
const GRID_SIZE: f64 = 10.0;
const GRID_DIVISIONS: u32 = 20;
const GRID_HEIGHT: f64 = -1.0;

/// Landmark inset size in pixels
const INSET_WIDTH: i32 = 160;
const INSET_HEIGHT: i32 = 120;

/// Cube centers, receding into the screen
const CUBES: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [-1.5, 0.0, -2.0], [1.5, 0.0, -4.0]];
const CUBE_HALF_EXTENT: f64 = 0.5;

#[rustfmt::skip]
const CUBE_EDGES: [(usize, usize); 12] = [
    (0, 1), (1, 3), (3, 2), (2, 0),
    (4, 5), (5, 7), (7, 6), (6, 4),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

/// Renders a floor grid and a few cubes through the parallax camera, with a
/// landmark overlay and the camera position as text
pub struct WireframeRenderer {
    title: String,
    viewport: Viewport,
    canvas: Mat,
    show_landmarks: bool,
    window_open: bool,
    fps: FpsCounter,
}

impl WireframeRenderer {
    /// Open a resizable window
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be created
    pub fn open(title: &str, viewport: Viewport, show_landmarks: bool) -> Result<Self> {
        if !viewport.is_valid() {
            return Err(Error::Render(format!(
                "Invalid window size {}x{}",
                viewport.width, viewport.height
            )));
        }
        highgui::named_window(title, WINDOW_NORMAL)?;
        highgui::resize_window(title, u32_to_i32(viewport.width)?, u32_to_i32(viewport.height)?)?;
        info!("Opened window '{title}' at {}x{}", viewport.width, viewport.height);

        let mut renderer = Self {
            title: title.to_string(),
            viewport,
            canvas: Mat::default(),
            show_landmarks,
            window_open: true,
            fps: FpsCounter::default(),
        };
        renderer.allocate_canvas()?;
        Ok(renderer)
    }

    fn allocate_canvas(&mut self) -> Result<()> {
        self.canvas = Mat::new_rows_cols_with_default(
            u32_to_i32(self.viewport.height)?,
            u32_to_i32(self.viewport.width)?,
            CV_8UC3,
            background(),
        )?;
        Ok(())
    }

    fn draw_segment(&mut self, camera: &PerspectiveCamera, a: &Vector3<f64>, b: &Vector3<f64>, color: Scalar) -> Result<()> {
        if let Some((p, q)) = camera.project_segment(a, b, self.viewport) {
            let (p, q) = (self.pixel(p), self.pixel(q));
            imgproc::line(&mut self.canvas, p, q, color, 1, LINE_AA, 0)?;
        }
        Ok(())
    }

    fn pixel(&self, p: Point2<f64>) -> Point {
        // Keep far off-screen endpoints within a range OpenCV clips reliably
        let limit = 8 * u32_to_i32(self.viewport.width.max(self.viewport.height)).unwrap_or(i32::MAX / 16);
        Point::new(
            f64_to_i32_clamp(p.x.round(), -limit, limit),
            f64_to_i32_clamp(p.y.round(), -limit, limit),
        )
    }

    fn draw_grid(&mut self, camera: &PerspectiveCamera) -> Result<()> {
        let half = GRID_SIZE / 2.0;
        let step = GRID_SIZE / f64::from(GRID_DIVISIONS);
        let color = Scalar::new(90.0, 90.0, 90.0, 0.0);
        for i in 0..=GRID_DIVISIONS {
            let t = -half + step * f64::from(i);
            self.draw_segment(
                camera,
                &Vector3::new(t, GRID_HEIGHT, -half),
                &Vector3::new(t, GRID_HEIGHT, half),
                color,
            )?;
            self.draw_segment(
                camera,
                &Vector3::new(-half, GRID_HEIGHT, t),
                &Vector3::new(half, GRID_HEIGHT, t),
                color,
            )?;
        }
        Ok(())
    }

    fn draw_cubes(&mut self, camera: &PerspectiveCamera) -> Result<()> {
        let color = Scalar::new(255.0, 200.0, 80.0, 0.0);
        for center in CUBES {
            let center = Vector3::from(center);
            let corners: Vec<Vector3<f64>> = (0..8)
                .map(|i| {
                    let sign = |bit: usize| if i & bit == 0 { -CUBE_HALF_EXTENT } else { CUBE_HALF_EXTENT };
                    center + Vector3::new(sign(1), sign(2), sign(4))
                })
                .collect();
            for (a, b) in CUBE_EDGES {
                self.draw_segment(camera, &corners[a], &corners[b], color)?;
            }
        }
        Ok(())
    }

    fn draw_overlay(&mut self, overlay: &[NormalizedPoint]) -> Result<()> {
        let x0 = u32_to_i32(self.viewport.width)? - INSET_WIDTH - 10;
        let y0 = 10;
        if x0 < 0 {
            return Ok(());
        }
        let inset = Rect::new(x0, y0, INSET_WIDTH, INSET_HEIGHT);
        imgproc::rectangle(&mut self.canvas, inset, Scalar::new(0.0, 0.0, 0.0, 0.0), -1, LINE_8, 0)?;
        imgproc::rectangle(&mut self.canvas, inset, Scalar::new(120.0, 120.0, 120.0, 0.0), 1, LINE_8, 0)?;
        for point in overlay {
            let x = x0 + f64_to_i32_clamp(f64::from(point.x) * f64::from(INSET_WIDTH), 0, INSET_WIDTH - 1);
            let y = y0 + f64_to_i32_clamp(f64::from(point.y) * f64::from(INSET_HEIGHT), 0, INSET_HEIGHT - 1);
            imgproc::circle(&mut self.canvas, Point::new(x, y), 1, Scalar::new(0.0, 0.0, 255.0, 0.0), -1, LINE_8, 0)?;
        }
        Ok(())
    }

    fn draw_text(&mut self, camera: &PerspectiveCamera, fps: f64) -> Result<()> {
        let p = camera.position;
        let lines = [
            format!("Camera: {:.2}, {:.2}, {:.2}", p.x, p.y, p.z),
            format!("FPS: {fps:.1}"),
        ];
        for (i, text) in lines.iter().enumerate() {
            imgproc::put_text(
                &mut self.canvas,
                text,
                Point::new(10, 24 + 22 * i32::try_from(i).unwrap_or(0)),
                FONT_HERSHEY_SIMPLEX,
                0.55,
                Scalar::new(255.0, 255.0, 255.0, 0.0),
                1,
                LINE_AA,
                false,
            )?;
        }
        Ok(())
    }
}

impl SceneRenderer for WireframeRenderer {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn resize(&mut self, viewport: Viewport) -> Result<()> {
        debug!("Resizing canvas to {}x{}", viewport.width, viewport.height);
        self.viewport = viewport;
        self.allocate_canvas()
    }

    fn poll_resize(&mut self) -> Result<Option<Viewport>> {
        if !self.window_open {
            return Ok(None);
        }
        let rect = highgui::get_window_image_rect(&self.title)?;
        let (Ok(width), Ok(height)) = (u32::try_from(rect.width), u32::try_from(rect.height)) else {
            return Ok(None);
        };
        let viewport = Viewport::new(width, height);
        Ok((viewport.is_valid() && viewport != self.viewport).then_some(viewport))
    }

    fn render(&mut self, camera: &PerspectiveCamera, overlay: &[NormalizedPoint]) -> Result<()> {
        if !self.window_open {
            return Ok(());
        }
        self.canvas.set_to(&background(), &core::no_array())?;
        self.draw_grid(camera)?;
        self.draw_cubes(camera)?;
        if self.show_landmarks {
            self.draw_overlay(overlay)?;
        }
        let fps = self.fps.frame();
        self.draw_text(camera, fps)?;
        highgui::imshow(&self.title, &self.canvas)?;
        Ok(())
    }

    fn poll_input(&mut self) -> Result<Option<RenderCommand>> {
        if !self.window_open {
            return Ok(Some(RenderCommand::Quit));
        }
        let key = highgui::wait_key(1)?;
        if key == KEY_ESC || key == i32::from(b'q') {
            return Ok(Some(RenderCommand::Quit));
        }
        if key == i32::from(b'r') {
            return Ok(Some(RenderCommand::ReloadConfig));
        }
        // The window was closed with the title bar button
        if highgui::get_window_property(&self.title, WND_PROP_VISIBLE)? < 1.0 {
            info!("Window closed");
            self.window_open = false;
            return Ok(Some(RenderCommand::Quit));
        }
        Ok(None)
    }

    fn dispose(&mut self) {
        if self.window_open {
            self.window_open = false;
            if let Err(e) = highgui::destroy_window(&self.title) {
                warn!("Failed to destroy window '{}': {e}", self.title);
            }
        }
    }
}

impl Drop for WireframeRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn background() -> Scalar {
    Scalar::new(32.0, 32.0, 32.0, 0.0)
}

/// Frames-per-second estimate refreshed once a second
#[derive(Debug)]
struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }
}

impl FpsCounter {
    fn frame(&mut self) -> f64 {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = Instant::now();
        }
        self.fps
    }
}

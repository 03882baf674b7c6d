//! Perspective camera with off-axis view windows.
//!
//! Follows the common film-camera model: the vertical field of view is
//! derived from a focal length against a film gauge, and a view window
//! selects a sub-rectangle of a larger virtual frustum.

use crate::constants::{DEFAULT_FOV_DEGREES, DEFAULT_NEAR_PLANE, DEFAULT_FAR_PLANE, FILM_GAUGE_MM};
use crate::mapper::CameraTransform;
use nalgebra::{Matrix4, Point2, Vector3, Vector4};

use super::Viewport;

/// Sub-window of a larger virtual viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewWindow {
    pub full_width: f64,
    pub full_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Camera with a position and an asymmetric perspective frustum. The camera
/// looks down the negative z axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees
    pub fov: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    pub zoom: f64,
    /// Film height reference in millimetres
    pub film_gauge: f64,
    pub position: Vector3<f64>,
    view: Option<ViewWindow>,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(DEFAULT_FOV_DEGREES, 1.0, DEFAULT_NEAR_PLANE, DEFAULT_FAR_PLANE)
    }
}

impl PerspectiveCamera {
    /// Create a camera
    ///
    /// # Panics
    ///
    /// Panics if the clip planes are not `0 < near < far`
    pub fn new(fov: f64, aspect: f64, near: f64, far: f64) -> Self {
        assert!(near > 0.0 && far > near, "Clip planes must satisfy 0 < near < far");
        Self {
            fov,
            aspect,
            near,
            far,
            zoom: 1.0,
            film_gauge: FILM_GAUGE_MM,
            position: Vector3::zeros(),
            view: None,
        }
    }

    /// Film height used for focal length conversions
    pub fn film_height(&self) -> f64 {
        self.film_gauge / self.aspect.max(1.0)
    }

    /// Set the field of view from a focal length in millimetres.
    /// Non-positive or non-finite lengths are ignored.
    pub fn set_focal_length(&mut self, focal_length: f64) {
        if !focal_length.is_finite() || focal_length <= 0.0 {
            return;
        }
        let v_extent_slope = 0.5 * self.film_height() / focal_length;
        self.fov = 2.0 * v_extent_slope.atan().to_degrees();
    }

    /// Focal length matching the current field of view
    pub fn focal_length(&self) -> f64 {
        let v_extent_slope = (0.5 * self.fov.to_radians()).tan();
        0.5 * self.film_height() / v_extent_slope
    }

    /// Render only the `(x, y, width, height)` window of a virtual viewport
    /// of `full_width` × `full_height`
    pub fn set_view_offset(&mut self, full_width: f64, full_height: f64, x: f64, y: f64, width: f64, height: f64) {
        self.view = Some(ViewWindow {
            full_width,
            full_height,
            offset_x: x,
            offset_y: y,
            width,
            height,
        });
    }

    pub fn clear_view_offset(&mut self) {
        self.view = None;
    }

    pub fn view_offset(&self) -> Option<&ViewWindow> {
        self.view.as_ref()
    }

    /// Update the aspect ratio for a viewport; zero-sized viewports are ignored
    pub fn set_aspect(&mut self, viewport: Viewport) {
        if viewport.is_valid() {
            self.aspect = viewport.aspect();
        }
    }

    /// Apply a mapped transform for the given viewport
    pub fn apply(&mut self, transform: &CameraTransform, viewport: Viewport) {
        let width = f64::from(viewport.width);
        let height = f64::from(viewport.height);
        self.position = transform.position;
        self.set_view_offset(
            width,
            height,
            transform.view_offset.cx,
            transform.view_offset.cy,
            width,
            height,
        );
        self.set_focal_length(transform.focal_length);
    }

    /// Projection matrix of the (possibly off-axis) frustum
    pub fn projection_matrix(&self) -> Matrix4<f64> {
        let near = self.near;
        let mut top = near * (0.5 * self.fov.to_radians()).tan() / self.zoom;
        let mut height = 2.0 * top;
        let mut width = self.aspect * height;
        let mut left = -0.5 * width;

        if let Some(view) = self.view.filter(|v| v.full_width > 0.0 && v.full_height > 0.0) {
            left += view.offset_x * width / view.full_width;
            top -= view.offset_y * height / view.full_height;
            width *= view.width / view.full_width;
            height *= view.height / view.full_height;
        }

        frustum(left, left + width, top, top - height, near, self.far)
    }

    /// World-to-camera transform; the camera only translates
    pub fn view_matrix(&self) -> Matrix4<f64> {
        Matrix4::new_translation(&-self.position)
    }

    /// Transform a world point into camera space
    pub fn to_camera_space(&self, point: &Vector3<f64>) -> Vector3<f64> {
        point - self.position
    }

    /// Clip a camera-space segment against the near plane. Returns `None`
    /// when the segment lies entirely behind it.
    pub fn clip_segment(&self, a: Vector3<f64>, b: Vector3<f64>) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let limit = -self.near;
        match (a.z <= limit, b.z <= limit) {
            (true, true) => Some((a, b)),
            (false, false) => None,
            (a_in, _) => {
                let t = (limit - a.z) / (b.z - a.z);
                let hit = a + (b - a) * t;
                if a_in {
                    Some((a, hit))
                } else {
                    Some((hit, b))
                }
            }
        }
    }

    /// Project a camera-space point to normalized device coordinates
    pub fn project(&self, point: &Vector3<f64>) -> Option<Point2<f64>> {
        let clip = self.projection_matrix() * Vector4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= f64::EPSILON {
            return None;
        }
        Some(Point2::new(clip.x / clip.w, clip.y / clip.w))
    }

    /// Project a world segment into viewport pixels, clipping at the near plane
    pub fn project_segment(
        &self,
        a: &Vector3<f64>,
        b: &Vector3<f64>,
        viewport: Viewport,
    ) -> Option<(Point2<f64>, Point2<f64>)> {
        let (a, b) = self.clip_segment(self.to_camera_space(a), self.to_camera_space(b))?;
        let a = self.project(&a)?;
        let b = self.project(&b)?;
        Some((ndc_to_pixel(a, viewport), ndc_to_pixel(b, viewport)))
    }
}

/// Convert normalized device coordinates to pixels, y pointing down
pub fn ndc_to_pixel(ndc: Point2<f64>, viewport: Viewport) -> Point2<f64> {
    Point2::new(
        (ndc.x + 1.0) * 0.5 * f64::from(viewport.width),
        (1.0 - ndc.y) * 0.5 * f64::from(viewport.height),
    )
}

fn frustum(left: f64, right: f64, top: f64, bottom: f64, near: f64, far: f64) -> Matrix4<f64> {
    let x = 2.0 * near / (right - left);
    let y = 2.0 * near / (top - bottom);
    let a = (right + left) / (right - left);
    let b = (top + bottom) / (top - bottom);
    let c = -(far + near) / (far - near);
    let d = -2.0 * far * near / (far - near);

    #[rustfmt::skip]
    let m = Matrix4::new(
        x,   0.0, a,    0.0,
        0.0, y,   b,    0.0,
        0.0, 0.0, c,    d,
        0.0, 0.0, -1.0, 0.0,
    );
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::ViewOffset;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_focal_length_round_trip() {
        let mut camera = PerspectiveCamera::new(75.0, 16.0 / 9.0, 0.1, 1000.0);
        camera.set_focal_length(30.0);
        assert!((camera.focal_length() - 30.0).abs() < 1e-6);
        let fov = camera.fov;
        camera.set_focal_length(0.0);
        assert_eq!(camera.fov, fov);
    }

    #[test]
    fn test_centered_point_projects_to_origin() {
        let camera = PerspectiveCamera::default();
        let ndc = camera.project(&Vector3::new(0.0, 0.0, -5.0)).unwrap();
        assert!(ndc.x.abs() < EPS && ndc.y.abs() < EPS);
    }

    #[test]
    fn test_view_offset_shifts_projection() {
        let mut camera = PerspectiveCamera::new(60.0, 1.0, 0.1, 100.0);
        let point = Vector3::new(0.0, 0.0, -5.0);
        camera.set_view_offset(100.0, 100.0, 10.0, 0.0, 100.0, 100.0);
        let shifted = camera.project(&point).unwrap();
        // Moving the window right moves content left
        assert!(shifted.x < 0.0);
        assert!((shifted.x + 0.2).abs() < 1e-9);
        assert!(shifted.y.abs() < EPS);
    }

    #[test]
    fn test_apply_sets_all_parameters() {
        let mut camera = PerspectiveCamera::default();
        let viewport = Viewport::new(800, 600);
        camera.set_aspect(viewport);
        let transform = CameraTransform {
            position: Vector3::new(0.5, -0.25, 3.0),
            view_offset: ViewOffset { cx: 4.0, cy: -2.0 },
            focal_length: 30.0,
        };
        camera.apply(&transform, viewport);
        assert_eq!(camera.position, transform.position);
        let view = camera.view_offset().unwrap();
        assert_eq!((view.offset_x, view.offset_y), (4.0, -2.0));
        assert_eq!((view.full_width, view.width), (800.0, 800.0));
        assert!((camera.focal_length() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip_segment_against_near_plane() {
        let camera = PerspectiveCamera::new(60.0, 1.0, 1.0, 100.0);
        let front = Vector3::new(0.0, 0.0, -5.0);
        let behind = Vector3::new(0.0, 0.0, 5.0);
        let (a, b) = camera.clip_segment(front, behind).unwrap();
        assert_eq!(a, front);
        assert!((b.z + 1.0).abs() < EPS);
        assert!(camera.clip_segment(behind, Vector3::new(1.0, 0.0, 2.0)).is_none());
    }

    #[test]
    fn test_ndc_to_pixel_flips_y() {
        let viewport = Viewport::new(200, 100);
        let p = ndc_to_pixel(Point2::new(-1.0, 1.0), viewport);
        assert_eq!(p, Point2::new(0.0, 0.0));
        let p = ndc_to_pixel(Point2::new(1.0, -1.0), viewport);
        assert_eq!(p, Point2::new(200.0, 100.0));
    }

    #[test]
    #[should_panic(expected = "Clip planes must satisfy 0 < near < far")]
    fn test_invalid_clip_planes() {
        let _ = PerspectiveCamera::new(60.0, 1.0, 10.0, 1.0);
    }
}

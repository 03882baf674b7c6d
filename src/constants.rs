//! Constants used throughout the application

/// Number of points in the face-mesh landmark set
pub const NUM_FACE_MESH_LANDMARKS: usize = 468;

/// Landmark sitting between the eyes, on the nose bridge
pub const LANDMARK_BETWEEN_EYES: usize = 168;

/// Default detection rate in cycles per second
pub const DEFAULT_DETECTION_FPS: f64 = 30.0;

/// Default display refresh rate for the render loop
pub const DEFAULT_REFRESH_HZ: f64 = 60.0;

/// Milliseconds per second
pub const MS_PER_SECOND: f64 = 1000.0;

/// Default capture resolution requested from the camera
pub const DEFAULT_CAPTURE_WIDTH: u32 = 320;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 240;

/// Lateral world span covered by a full sweep of the normalized x axis
pub const WORLD_SPAN_X: f64 = 4.0;

/// Vertical world span covered by a full sweep of the normalized y axis
pub const WORLD_SPAN_Y: f64 = 3.0;

/// Scale from detector depth units to world distance
pub const WORLD_DEPTH_SCALE: f64 = 40.0;

/// Default camera distance from the scene origin
pub const DEFAULT_BASE_DISTANCE: f64 = 3.0;

/// Default mapper coefficients
pub const DEFAULT_EFFECT_AMOUNT: f64 = 1.0;
pub const DEFAULT_OFFSET_SCALE: f64 = 0.05;
pub const DEFAULT_FOCAL_SCALE: f64 = 10.0;

/// Default smoothing divisors per axis (depth is noisier)
pub const DEFAULT_SMOOTHING_XY: f64 = 4.0;
pub const DEFAULT_SMOOTHING_Z: f64 = 8.0;

/// Perspective camera defaults
pub const DEFAULT_FOV_DEGREES: f64 = 75.0;
pub const DEFAULT_NEAR_PLANE: f64 = 0.1;
pub const DEFAULT_FAR_PLANE: f64 = 1000.0;

/// Film gauge in millimetres used for focal length conversion
pub const FILM_GAUGE_MM: f64 = 35.0;

/// Default face-mesh model input size
pub const DEFAULT_MESH_INPUT_SIZE: i32 = 192;

/// Default SCRFD face detector input size
pub const DEFAULT_FACE_INPUT_SIZE: i32 = 640;

/// Face detector score and overlap thresholds
pub const DEFAULT_FACE_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

/// Pixel normalization for the face detector, `(v - offset) / scale`
pub const IMAGE_NORMALIZATION_OFFSET: f32 = 127.5;
pub const IMAGE_NORMALIZATION_SCALE: f32 = 128.0;

/// Fraction of the face box added on each side before cropping for the mesh
pub const FACE_ROI_MARGIN: f32 = 0.2;

/// Default face presence probability threshold
pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.5;

/// Seconds to wait for the first camera frame
pub const CAMERA_READY_TIMEOUT_SECS: u64 = 10;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;

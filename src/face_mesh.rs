//! Face-mesh landmark detector backed by `ONNX` Runtime.
//!
//! Runs in two stages. An SCRFD face detector finds the best face box in
//! the frame; the box is widened, squared and cropped, and the mesh model
//! runs on the crop. Landmarks are mapped back to frame-normalized
//! coordinates.
//!
//! The mesh model takes one image input (NHWC or NCHW, RGB in `[0, 1]`)
//! and produces a landmark output of at least 468 × 3 values in input-pixel
//! units. An optional single-value output is read as a face-presence logit.

use crate::config::DetectorConfig;
use crate::constants::{DEFAULT_MESH_INPUT_SIZE, FACE_ROI_MARGIN, NUM_FACE_MESH_LANDMARKS};
use crate::detection::LandmarkDetector;
use crate::face_detection::FaceDetector;
use crate::landmark::{FaceLandmarkerResult, NormalizedPoint};
use crate::utils::image_conversion::{mat_to_rgb_tensor, TensorLayout, TensorScratch};
use crate::{Error, Result};
use log::{debug, info, warn};
use ndarray::{Array4, CowArray};
use opencv::core::{Mat, MatTraitConst, Rect};
use ort::{Environment, ExecutionProvider, GraphOptimizationLevel, LoggingLevel, Session, SessionBuilder, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Hardware used for inference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    #[default]
    Cpu,
    /// CUDA execution provider, falling back to CPU when unavailable
    Gpu,
}

impl std::str::FromStr for Delegate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            _ => Err(Error::ConfigError(format!("Unknown delegate: {s}"))),
        }
    }
}

/// Raw model outputs for one frame
struct MeshOutputs {
    landmarks: Vec<f32>,
    presence_logit: Option<f32>,
}

/// Both models and their buffers; moved onto a blocking thread per frame
struct MeshPipeline {
    faces: FaceDetector,
    mesh: Session,
    layout: TensorLayout,
    input_size: usize,
    presence_threshold: f32,
    scratch: TensorScratch,
}

impl MeshPipeline {
    fn process(&mut self, frame: &Mat) -> Result<FaceLandmarkerResult> {
        let Some(face) = self.faces.detect(frame)?.into_iter().next() else {
            return Ok(FaceLandmarkerResult::empty());
        };
        let (cols, rows) = (frame.cols(), frame.rows());
        let Some(roi) = square_face_roi(face.bbox, cols, rows, FACE_ROI_MARGIN) else {
            debug!("Face box {:?} lies outside the frame", face.bbox);
            return Ok(FaceLandmarkerResult::empty());
        };

        let crop = Mat::roi(frame, roi)?.try_clone()?;
        let input = mat_to_rgb_tensor(&crop, self.input_size, self.layout, &mut self.scratch)?;
        let outputs = run_inference(&self.mesh, input)?;

        if let Some(logit) = outputs.presence_logit {
            if sigmoid(logit) < self.presence_threshold {
                return Ok(FaceLandmarkerResult::empty());
            }
        }
        let points = decode_landmarks(&outputs.landmarks, self.input_size)?;
        Ok(FaceLandmarkerResult::single(crop_to_frame(&points, roi, cols, rows)))
    }
}

/// Face detector followed by the face-mesh model
pub struct OnnxFaceMesh {
    pipeline: Option<Box<MeshPipeline>>,
    last_timestamp: Option<u64>,
}

impl OnnxFaceMesh {
    /// Load both models off the async runtime
    pub async fn load(config: DetectorConfig) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::new(&config))
            .await
            .map_err(|e| Error::ModelError(format!("Model loading task failed: {e}")))?
    }

    /// Load both models on the current thread
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either model file does not exist or cannot be parsed
    /// - The mesh model has no inputs
    /// - The ONNX runtime environment cannot be created
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        for path in [&config.face_model_path, &config.model_path] {
            if !path.exists() {
                return Err(Error::ModelError(format!("Model file not found: {}", path.display())));
            }
        }
        info!(
            "Loading face models {} and {} ({:?})",
            config.face_model_path.display(),
            config.model_path.display(),
            config.delegate
        );

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_mesh")
                .with_log_level(LoggingLevel::Warning)
                .build()?,
        );

        let faces = FaceDetector::new(
            build_session(&environment, &config.face_model_path, config.delegate)?,
            config.face_confidence,
            config.nms_threshold,
        )?;
        let mesh = build_session(&environment, &config.model_path, config.delegate)?;

        let input = mesh
            .inputs
            .first()
            .ok_or_else(|| Error::ModelInputError("Model has no inputs".to_string()))?;
        let dims: Vec<Option<i64>> = input.dimensions.iter().map(|d| d.map(i64::from)).collect();
        let (layout, input_size) = input_geometry(&dims);
        debug!("Model input '{}' {:?} → {layout:?}, {input_size}px", input.name, dims);

        Ok(Self {
            pipeline: Some(Box::new(MeshPipeline {
                faces,
                mesh,
                layout,
                input_size,
                presence_threshold: config.presence_threshold,
                scratch: TensorScratch::default(),
            })),
            last_timestamp: None,
        })
    }
}

fn build_session(environment: &Arc<Environment>, path: &Path, delegate: Delegate) -> Result<Session> {
    let mut builder = SessionBuilder::new(environment)?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if delegate == Delegate::Gpu {
        builder = builder.with_execution_providers([ExecutionProvider::CUDA(Default::default())])?;
    }
    Ok(builder.with_model_from_file(path)?)
}

impl LandmarkDetector for OnnxFaceMesh {
    async fn detect_for_video(&mut self, frame: &Mat, timestamp_ms: u64) -> Result<FaceLandmarkerResult> {
        if self.pipeline.is_none() {
            return Err(Error::ModelError("Detector is closed".to_string()));
        }
        if let Some(last) = self.last_timestamp.filter(|&last| timestamp_ms <= last) {
            return Err(Error::InvalidInput(format!(
                "Timestamp {timestamp_ms} ms does not advance past {last} ms"
            )));
        }
        self.last_timestamp = Some(timestamp_ms);

        let frame = frame.try_clone()?;
        let Some(mut pipeline) = self.pipeline.take() else {
            return Err(Error::ModelError("Detector is closed".to_string()));
        };
        let (pipeline, result) = tokio::task::spawn_blocking(move || {
            let result = pipeline.process(&frame);
            (pipeline, result)
        })
        .await
        .map_err(|e| Error::ModelError(format!("Inference task failed: {e}")))?;
        self.pipeline = Some(pipeline);
        result
    }

    fn close(&mut self) {
        if self.pipeline.take().is_some() {
            info!("Face mesh detector closed");
        }
    }
}

/// Widen a face box by `margin` of its size on each side, square it and
/// keep it inside a `cols` × `rows` frame. `None` when nothing remains.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn square_face_roi(bbox: Rect, cols: i32, rows: i32, margin: f32) -> Option<Rect> {
    let x_shift = (bbox.width as f32 * margin).round() as i32;
    let y_shift = (bbox.height as f32 * margin).round() as i32;
    let x1 = (bbox.x - x_shift).max(0);
    let y1 = (bbox.y - y_shift).max(0);
    let x2 = (bbox.x + bbox.width + x_shift).min(cols);
    let y2 = (bbox.y + bbox.height + y_shift).min(rows);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let side = (x2 - x1).max(y2 - y1).min(cols).min(rows);
    let cx = (x1 + x2) / 2;
    let cy = (y1 + y2) / 2;
    let x = (cx - side / 2).clamp(0, cols - side);
    let y = (cy - side / 2).clamp(0, rows - side);
    Some(Rect::new(x, y, side, side))
}

/// Map crop-normalized points back into the normalized space of a
/// `cols` × `rows` frame. Depth scales with the crop width like x.
#[allow(clippy::cast_precision_loss)]
pub fn crop_to_frame(points: &[NormalizedPoint], roi: Rect, cols: i32, rows: i32) -> Vec<NormalizedPoint> {
    let (fw, fh) = (cols as f32, rows as f32);
    let (rx, ry) = (roi.x as f32, roi.y as f32);
    let (rw, rh) = (roi.width as f32, roi.height as f32);
    points
        .iter()
        .map(|p| NormalizedPoint::new((rx + p.x * rw) / fw, (ry + p.y * rh) / fh, p.z * rw / fw))
        .collect()
}

fn run_inference(session: &Session, input: Array4<f32>) -> Result<MeshOutputs> {
    let input = CowArray::from(input.into_dyn());
    let tensor = Value::from_array(session.allocator(), &input)?;
    let outputs = session.run(vec![tensor])?;

    let mut landmarks = None;
    let mut presence_logit = None;
    for output in &outputs {
        let extracted = output.try_extract::<f32>()?;
        let view = extracted.view();
        let values: Vec<f32> = view.iter().copied().collect();
        if values.len() >= NUM_FACE_MESH_LANDMARKS * 3 && landmarks.is_none() {
            landmarks = Some(values);
        } else if values.len() == 1 && presence_logit.is_none() {
            presence_logit = Some(values[0]);
        }
    }

    let landmarks =
        landmarks.ok_or_else(|| Error::ModelOutputError("Model produced no landmark tensor".to_string()))?;
    Ok(MeshOutputs {
        landmarks,
        presence_logit,
    })
}

/// Pick the tensor layout and square input size from the model's input
/// dimensions; dynamic dimensions fall back to the default size
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn input_geometry(dims: &[Option<i64>]) -> (TensorLayout, usize) {
    let default_size = DEFAULT_MESH_INPUT_SIZE as usize;
    if dims.len() != 4 {
        warn!("Unexpected input rank {}, assuming NHWC", dims.len());
        return (TensorLayout::Nhwc, default_size);
    }
    let size_of = |d: Option<i64>| d.filter(|&v| v > 0).map_or(default_size, |v| v as usize);
    if dims[1] == Some(3) {
        (TensorLayout::Nchw, size_of(dims[2]))
    } else {
        (TensorLayout::Nhwc, size_of(dims[1]))
    }
}

/// Convert landmark values in input-pixel units into normalized points
///
/// # Errors
///
/// Returns `ModelOutputError` if fewer than a full mesh of values is present
#[allow(clippy::cast_precision_loss)]
pub fn decode_landmarks(values: &[f32], input_size: usize) -> Result<Vec<NormalizedPoint>> {
    if values.len() < NUM_FACE_MESH_LANDMARKS * 3 {
        return Err(Error::ModelOutputError(format!(
            "Expected at least {} landmark values, got {}",
            NUM_FACE_MESH_LANDMARKS * 3,
            values.len()
        )));
    }
    let scale = 1.0 / input_size as f32;
    Ok(values
        .chunks_exact(3)
        .take(NUM_FACE_MESH_LANDMARKS)
        .map(|v| NormalizedPoint::new(v[0] * scale, v[1] * scale, v[2] * scale))
        .collect())
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_geometry() {
        assert_eq!(
            input_geometry(&[Some(1), Some(192), Some(192), Some(3)]),
            (TensorLayout::Nhwc, 192)
        );
        assert_eq!(
            input_geometry(&[Some(1), Some(3), Some(256), Some(256)]),
            (TensorLayout::Nchw, 256)
        );
        assert_eq!(input_geometry(&[None, None, None, Some(3)]), (TensorLayout::Nhwc, 192));
        assert_eq!(input_geometry(&[Some(1), Some(3)]).1, 192);
    }

    #[test]
    fn test_decode_landmarks_normalizes() {
        let mut values = vec![0.0f32; NUM_FACE_MESH_LANDMARKS * 3];
        values[168 * 3] = 96.0;
        values[168 * 3 + 1] = 48.0;
        values[168 * 3 + 2] = -19.2;
        let points = decode_landmarks(&values, 192).unwrap();
        assert_eq!(points.len(), NUM_FACE_MESH_LANDMARKS);
        assert!((points[168].x - 0.5).abs() < 1e-6);
        assert!((points[168].y - 0.25).abs() < 1e-6);
        assert!((points[168].z + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_short_output() {
        assert!(decode_landmarks(&[0.0; 30], 192).is_err());
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < f32::EPSILON);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_delegate_parsing() {
        assert_eq!("GPU".parse::<Delegate>().unwrap(), Delegate::Gpu);
        assert_eq!("cpu".parse::<Delegate>().unwrap(), Delegate::Cpu);
        assert!("tpu".parse::<Delegate>().is_err());
    }

    #[test]
    fn test_crop_to_frame_mapping() {
        let roi = Rect::new(100, 50, 200, 200);
        let points = [
            NormalizedPoint::new(0.0, 0.0, 0.0),
            NormalizedPoint::new(0.5, 0.5, -0.1),
            NormalizedPoint::new(1.0, 1.0, 0.2),
        ];
        let mapped = crop_to_frame(&points, roi, 400, 300);

        assert!((mapped[0].x - 0.25).abs() < 1e-6);
        assert!((mapped[0].y - 50.0 / 300.0).abs() < 1e-6);
        assert!((mapped[1].x - 0.5).abs() < 1e-6);
        assert!((mapped[1].y - 0.5).abs() < 1e-6);
        assert!((mapped[1].z + 0.05).abs() < 1e-6);
        assert!((mapped[2].x - 0.75).abs() < 1e-6);
        assert!((mapped[2].y - 250.0 / 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_square_face_roi() {
        let roi = square_face_roi(Rect::new(100, 100, 50, 80), 640, 480, 0.2).unwrap();
        assert_eq!(roi.width, roi.height);
        assert_eq!(roi.width, 112);
        assert!(roi.x <= 90 && roi.y <= 84);

        // Clamped against the bottom-right corner
        let roi = square_face_roi(Rect::new(600, 440, 40, 40), 640, 480, 0.2).unwrap();
        assert!(roi.x + roi.width <= 640);
        assert!(roi.y + roi.height <= 480);
        assert_eq!(roi.width, roi.height);

        // Larger than a non-square frame
        let roi = square_face_roi(Rect::new(0, 0, 640, 480), 640, 480, 0.2).unwrap();
        assert_eq!(roi, Rect::new(80, 0, 480, 480));

        assert_eq!(square_face_roi(Rect::new(700, 10, 20, 20), 640, 480, 0.2), None);
    }

    #[test]
    fn test_missing_model_fails() {
        let config = DetectorConfig {
            model_path: "does/not/exist.onnx".into(),
            ..DetectorConfig::default()
        };
        assert!(matches!(OnnxFaceMesh::new(&config), Err(Error::ModelError(_))));

        let config = DetectorConfig {
            face_model_path: "does/not/exist.onnx".into(),
            ..DetectorConfig::default()
        };
        assert!(matches!(OnnxFaceMesh::new(&config), Err(Error::ModelError(_))));
    }
}

//! SCRFD face detector over `ONNX` Runtime.
//!
//! The face-mesh model expects a face crop, so every frame first goes
//! through this detector. The model predicts, per feature-map stride, a
//! score and four edge distances for each anchor; boxes above the score
//! threshold are merged with non-maximum suppression.

use crate::constants::DEFAULT_FACE_INPUT_SIZE;
use crate::utils::image_conversion::{letterbox_rgb_tensor, TensorScratch};
use crate::{Error, Result};
use log::{debug, warn};
use ndarray::CowArray;
use opencv::core::{Mat, Rect};
use ort::{Session, Value};

/// Detected face in frame pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceDetection {
    pub bbox: Rect,
    pub score: f32,
}

/// Box candidate in detector input pixels
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Self) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Undo the letterbox scale
    #[allow(clippy::cast_possible_truncation)]
    fn to_detection(self, scale: f32) -> FaceDetection {
        let x1 = (self.x1 / scale).round() as i32;
        let y1 = (self.y1 / scale).round() as i32;
        let x2 = (self.x2 / scale).round() as i32;
        let y2 = (self.y2 / scale).round() as i32;
        FaceDetection {
            bbox: Rect::new(x1, y1, x2 - x1, y2 - y1),
            score: self.score,
        }
    }
}

/// Output arrangement of an SCRFD export, known from its output count
#[derive(Debug, Clone, PartialEq, Eq)]
struct AnchorLayout {
    strides: Vec<i32>,
    anchors_per_cell: usize,
    /// Index distance between a stride's score and box outputs
    offset: usize,
}

impl AnchorLayout {
    fn for_output_count(outputs: usize) -> Self {
        match outputs {
            6 | 9 => Self {
                strides: vec![8, 16, 32],
                anchors_per_cell: 2,
                offset: 3,
            },
            10 | 15 => Self {
                strides: vec![8, 16, 32, 64, 128],
                anchors_per_cell: 1,
                offset: 5,
            },
            n => {
                warn!("Unknown face detector layout with {n} outputs, assuming 3 strides");
                Self::for_output_count(6)
            }
        }
    }
}

/// Face detector session and its per-stride anchor grids
pub struct FaceDetector {
    session: Session,
    input_size: (i32, i32),
    conf_threshold: f32,
    nms_threshold: f32,
    layout: AnchorLayout,
    centers: Vec<Vec<(f32, f32)>>,
    scratch: TensorScratch,
}

impl FaceDetector {
    /// Wrap a loaded SCRFD session
    pub fn new(session: Session, conf_threshold: f32, nms_threshold: f32) -> Result<Self> {
        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::ModelInputError("Face detector has no inputs".to_string()))?;
        let dim = |i: usize| {
            input
                .dimensions
                .get(i)
                .copied()
                .flatten()
                .and_then(|d| i32::try_from(d).ok())
                .filter(|&d| d > 0)
                .unwrap_or(DEFAULT_FACE_INPUT_SIZE)
        };
        // [batch, channels, height, width]
        let input_size = (dim(3), dim(2));
        let layout = AnchorLayout::for_output_count(session.outputs.len());
        let centers = layout
            .strides
            .iter()
            .map(|&stride| anchor_centers(input_size.0 / stride, input_size.1 / stride, stride, layout.anchors_per_cell))
            .collect();
        debug!(
            "Face detector input {}x{}, strides {:?}",
            input_size.0, input_size.1, layout.strides
        );

        Ok(Self {
            session,
            input_size,
            conf_threshold,
            nms_threshold,
            layout,
            centers,
            scratch: TensorScratch::default(),
        })
    }

    /// Detect faces in a BGR frame, best score first
    pub fn detect(&mut self, image: &Mat) -> Result<Vec<FaceDetection>> {
        let (width, height) = self.input_size;
        let (input, scale) = letterbox_rgb_tensor(image, width, height, &mut self.scratch)?;
        let input = CowArray::from(input.into_dyn());
        let tensor = Value::from_array(self.session.allocator(), &input)?;
        let outputs = self.session.run(vec![tensor])?;

        let mut candidates = Vec::new();
        for (level, (&stride, centers)) in self.layout.strides.iter().zip(&self.centers).enumerate() {
            let output = |index: usize| -> Result<Vec<f32>> {
                let value = outputs.get(index).ok_or_else(|| {
                    Error::ModelOutputError(format!("Face detector output {index} is missing"))
                })?;
                let extracted = value.try_extract::<f32>()?;
                let values = extracted.view().iter().copied().collect();
                Ok(values)
            };
            let scores = output(level)?;
            let distances = output(level + self.layout.offset)?;
            candidates.extend(decode_level(&scores, &distances, centers, stride, self.conf_threshold)?);
        }

        Ok(non_max_suppression(candidates, self.nms_threshold)
            .into_iter()
            .map(|c| c.to_detection(scale))
            .collect())
    }
}

/// Anchor centers of one stride, row-major, repeated per anchor
#[allow(clippy::cast_precision_loss)]
fn anchor_centers(cols: i32, rows: i32, stride: i32, per_cell: usize) -> Vec<(f32, f32)> {
    let mut centers = Vec::new();
    for y in 0..rows {
        for x in 0..cols {
            let center = ((x * stride) as f32, (y * stride) as f32);
            centers.extend(std::iter::repeat(center).take(per_cell));
        }
    }
    centers
}

/// Turn one stride's scores and edge distances into candidates
#[allow(clippy::cast_precision_loss)]
fn decode_level(
    scores: &[f32],
    distances: &[f32],
    centers: &[(f32, f32)],
    stride: i32,
    threshold: f32,
) -> Result<Vec<Candidate>> {
    if centers.len() < scores.len() || distances.len() < scores.len() * 4 {
        return Err(Error::ModelOutputError(format!(
            "Stride {stride}: {} scores for {} anchors and {} distances",
            scores.len(),
            centers.len(),
            distances.len()
        )));
    }
    let stride = stride as f32;
    Ok(scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score >= threshold)
        .map(|(i, &score)| {
            let (cx, cy) = centers[i];
            let d = &distances[i * 4..i * 4 + 4];
            Candidate {
                score,
                x1: cx - d[0] * stride,
                y1: cy - d[1] * stride,
                x2: cx + d[2] * stride,
                y2: cy + d[3] * stride,
            }
        })
        .collect())
}

/// Greedy non-maximum suppression, highest score first
fn non_max_suppression(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= threshold) {
            kept.push(candidate);
        }
    }
    kept
}

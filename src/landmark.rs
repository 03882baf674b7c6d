//! Landmark data produced by the face detector.

use crate::constants::LANDMARK_BETWEEN_EYES;
use serde::{Deserialize, Serialize};

/// A single landmark in normalized frame coordinates.
///
/// `x` and `y` are in `[0, 1]` relative to the frame width and height with
/// the origin at the top-left corner. `z` is the detector's relative depth
/// estimate; its sign and scale follow the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Index of the one landmark that drives the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedLandmarkIndex(pub usize);

impl Default for TrackedLandmarkIndex {
    fn default() -> Self {
        Self(LANDMARK_BETWEEN_EYES)
    }
}

impl TrackedLandmarkIndex {
    /// Pick the tracked landmark out of one face's landmark set
    pub fn select(self, landmarks: &[NormalizedPoint]) -> Option<NormalizedPoint> {
        landmarks.get(self.0).copied()
    }
}

/// Output of one detector invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceLandmarkerResult {
    /// Landmark sets indexed by detected face
    pub face_landmarks: Vec<Vec<NormalizedPoint>>,
}

impl FaceLandmarkerResult {
    /// Result with no detected face
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result with a single detected face
    pub fn single(landmarks: Vec<NormalizedPoint>) -> Self {
        Self {
            face_landmarks: vec![landmarks],
        }
    }

    /// Landmarks of the first detected face, if any
    pub fn first_face(&self) -> Option<&[NormalizedPoint]> {
        self.face_landmarks
            .first()
            .map(Vec::as_slice)
            .filter(|landmarks| !landmarks.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_FACE_MESH_LANDMARKS;

    #[test]
    fn test_default_index_is_between_eyes() {
        assert_eq!(TrackedLandmarkIndex::default().0, 168);
        assert!(TrackedLandmarkIndex::default().0 < NUM_FACE_MESH_LANDMARKS);
    }

    #[test]
    fn test_select_out_of_range() {
        let landmarks = vec![NormalizedPoint::default(); 10];
        assert!(TrackedLandmarkIndex(10).select(&landmarks).is_none());
        assert!(TrackedLandmarkIndex(9).select(&landmarks).is_some());
    }

    #[test]
    fn test_first_face_ignores_empty_sets() {
        assert!(FaceLandmarkerResult::empty().first_face().is_none());
        assert!(FaceLandmarkerResult::single(Vec::new()).first_face().is_none());

        let result = FaceLandmarkerResult::single(vec![NormalizedPoint::new(0.5, 0.5, 0.0)]);
        assert_eq!(result.first_face().map(<[_]>::len), Some(1));
    }
}

//! Error types for the head parallax library.

use std::fmt;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// `ONNX` Runtime inference failed
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model loading or inference error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Model input configuration error
    #[error("Model input error: {0}")]
    ModelInputError(String),

    /// Model output processing error
    #[error("Model output error: {0}")]
    ModelOutputError(String),

    /// Filter initialization or processing error
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Video source could not be opened or read
    #[error("Video source error: {0}")]
    VideoSource(String),

    /// Rendering backend failure
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The detection loop could not start. Terminal for the session.
    #[error("Initialization failed ({stage}): {source}")]
    Initialization {
        /// Which collaborator failed to become ready
        stage: InitStage,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },
}

/// Startup step that produced an initialization failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Camera acquisition
    VideoSource,
    /// Landmark model loading
    Detector,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoSource => f.write_str("video source"),
            Self::Detector => f.write_str("detector"),
        }
    }
}

impl Error {
    /// Wrap an error as an initialization failure of the given stage
    pub fn initialization(stage: InitStage, source: Error) -> Self {
        Self::Initialization {
            stage,
            source: Box::new(source),
        }
    }

    /// Whether this error ends the tracking session
    pub fn is_initialization(&self) -> bool {
        matches!(self, Self::Initialization { .. })
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

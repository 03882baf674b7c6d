//! Webcam or video-file source backed by an `OpenCV` capture thread.
//!
//! The capture thread reads frames as they arrive and keeps only the newest
//! one. The detection loop copies that frame into its own scratch surface
//! when a cycle runs, so a slow detector never builds up a backlog.

use crate::config::CameraConfig;
use crate::constants::CAMERA_READY_TIMEOUT_SECS;
use crate::detection::{FrameSize, VideoSource};
use crate::utils::safe_cast::{i32_to_u32, u32_to_i32};
use crate::{Error, Result};
use log::{debug, error, info, warn};
use opencv::core::{Mat, Size};
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;
use opencv::videoio::{
    self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH,
    CAP_PROP_POS_FRAMES,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// Consecutive failed reads after which a device is considered lost
const MAX_READ_FAILURES: u32 = 100;

const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Live camera feed
pub struct CameraSource {
    latest: Arc<Mutex<Option<Mat>>>,
    running: Arc<AtomicBool>,
    size: watch::Receiver<FrameSize>,
    thread: Option<JoinHandle<()>>,
}

impl CameraSource {
    /// Open the configured device or file and wait for the first frame
    ///
    /// # Errors
    ///
    /// Returns `VideoSource` if the device cannot be opened or no frame
    /// arrives within the ready timeout
    pub async fn open(config: CameraConfig) -> Result<Self> {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (size_tx, size_rx) = watch::channel(FrameSize::default());

        let thread = {
            let latest = Arc::clone(&latest);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("camera-capture".to_string())
                .spawn(move || capture_thread(&config, ready_tx, &size_tx, &latest, &running))?
        };

        let mut source = Self {
            latest,
            running,
            size: size_rx,
            thread: Some(thread),
        };

        let opened = ready_rx
            .await
            .map_err(|_| Error::VideoSource("Capture thread exited before opening the device".to_string()))
            .and_then(|result| result);
        if let Err(e) = opened {
            source.release();
            return Err(e);
        }

        let mut size = source.size.clone();
        let first_frame = tokio::time::timeout(
            Duration::from_secs(CAMERA_READY_TIMEOUT_SECS),
            size.wait_for(FrameSize::is_valid),
        )
        .await;
        match first_frame {
            Ok(Ok(size)) => {
                info!("Camera ready at {}x{}", size.width, size.height);
                Ok(source)
            }
            Ok(Err(_)) => {
                source.release();
                Err(Error::VideoSource("Capture stopped before the first frame".to_string()))
            }
            Err(_) => {
                source.release();
                Err(Error::VideoSource(format!(
                    "No frame received within {CAMERA_READY_TIMEOUT_SECS} s"
                )))
            }
        }
    }
}

impl VideoSource for CameraSource {
    fn frame_size(&self) -> FrameSize {
        *self.size.borrow()
    }

    fn draw_into(&mut self, target: &mut Mat, size: FrameSize) -> Result<bool> {
        let latest = self.latest.lock();
        let Some(frame) = latest.as_ref() else {
            return Ok(false);
        };
        let current = FrameSize::new(i32_to_u32(frame.cols())?, i32_to_u32(frame.rows())?);
        if current == size {
            frame.copy_to(target)?;
        } else {
            imgproc::resize(
                frame,
                target,
                Size::new(u32_to_i32(size.width)?, u32_to_i32(size.height)?),
                0.0,
                0.0,
                InterpolationFlags::INTER_AREA as i32,
            )?;
        }
        Ok(true)
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Camera capture thread panicked");
            }
            info!("Camera released");
        }
        self.latest.lock().take();
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_capture(config: &CameraConfig) -> Result<VideoCapture> {
    let capture = if let Some(path) = &config.video_file {
        info!("Opening video file {}", path.display());
        VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?
    } else {
        info!("Opening camera {}", config.device_index);
        let mut capture = VideoCapture::new(config.device_index, videoio::CAP_ANY)?;
        capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;
        capture.set(CAP_PROP_FRAME_WIDTH, f64::from(config.width))?;
        capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(config.height))?;
        capture
    };
    if !capture.is_opened()? {
        return Err(Error::VideoSource(match &config.video_file {
            Some(path) => format!("Cannot open video file {}", path.display()),
            None => format!("Cannot open camera {}", config.device_index),
        }));
    }
    Ok(capture)
}

fn capture_thread(
    config: &CameraConfig,
    ready: oneshot::Sender<Result<()>>,
    size: &watch::Sender<FrameSize>,
    latest: &Mutex<Option<Mat>>,
    running: &AtomicBool,
) {
    let mut capture = match open_capture(config) {
        Ok(capture) => {
            let _ = ready.send(Ok(()));
            capture
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Files are paced at their native rate, devices block in read()
    let frame_delay = config
        .video_file
        .as_ref()
        .and_then(|_| capture.get(CAP_PROP_FPS).ok())
        .filter(|fps| *fps > 0.0)
        .map(|fps| Duration::from_secs_f64(1.0 / fps));

    let mut frame = Mat::default();
    let mut failures = 0;
    while running.load(Ordering::SeqCst) {
        match capture.read(&mut frame) {
            Ok(true) if !frame.empty() => {
                failures = 0;
                if let Err(e) = publish_frame(&frame, size, latest) {
                    warn!("Failed to store captured frame: {e}");
                }
                if let Some(delay) = frame_delay {
                    thread::sleep(delay);
                }
            }
            result => {
                if let Err(e) = result {
                    debug!("Capture read failed: {e}");
                }
                if config.video_file.is_some() {
                    // Loop the file
                    if capture.set(CAP_PROP_POS_FRAMES, 0.0).is_err() {
                        break;
                    }
                    continue;
                }
                failures += 1;
                if failures >= MAX_READ_FAILURES {
                    error!("Camera stopped delivering frames");
                    break;
                }
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }

    if let Err(e) = capture.release() {
        warn!("Failed to release capture device: {e}");
    }
    clear_frame(size, latest);
    debug!("Capture thread exiting");
}

/// Drop the stored frame and report that no frame is available
fn clear_frame(size: &watch::Sender<FrameSize>, latest: &Mutex<Option<Mat>>) {
    latest.lock().take();
    size.send_replace(FrameSize::default());
}

fn publish_frame(frame: &Mat, size: &watch::Sender<FrameSize>, latest: &Mutex<Option<Mat>>) -> Result<()> {
    {
        let mut slot = latest.lock();
        match slot.as_mut() {
            Some(stored) => frame.copy_to(stored)?,
            None => *slot = Some(frame.try_clone()?),
        }
    }
    let current = FrameSize::new(i32_to_u32(frame.cols())?, i32_to_u32(frame.rows())?);
    size.send_if_modified(|known| {
        if *known == current {
            false
        } else {
            *known = current;
            true
        }
    });
    Ok(())
}

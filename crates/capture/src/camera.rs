//! OpenCV-backed webcam source.

use chrono::Utc;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::types::{CaptureError, Frame, FrameFormat};

/// A sequential producer of video frames.
///
/// `read_frame` returning `Ok(None)` signals the end of the stream: an
/// expected terminal condition (device unplugged, recorded source
/// exhausted), not a fault. `close` releases the underlying device and may
/// be called any number of times; reads after `close` report end of stream.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
    fn close(&mut self);
}

/// Webcam wrapper producing BGR frames at a fixed target size.
pub struct CameraSource {
    cap: VideoCapture,
    target_size: (i32, i32),
    released: bool,
}

impl CameraSource {
    /// Open the camera at `index` and configure it for `target_size`.
    ///
    /// Fails with [`CaptureError::DeviceUnavailable`] when no backend can
    /// open the device; callers are expected to treat that as fatal rather
    /// than retry.
    pub fn open(index: i32, target_size: (i32, i32)) -> Result<Self, CaptureError> {
        let mut cap = open_device(index)?;
        configure_camera(&mut cap, target_size, 30.0);
        Ok(Self {
            cap,
            target_size,
            released: false,
        })
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Ok(None);
        }

        let mut frame = Mat::default();
        let mut scratch = Mat::default();
        let (target_w, target_h) = self.target_size;

        loop {
            match self.cap.read(&mut frame) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("camera reported no further frames");
                    return Ok(None);
                }
                Err(err) => {
                    warn!("camera read failed: {err}");
                    return Ok(None);
                }
            }

            let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
            // Some drivers deliver empty warm-up frames right after opening.
            if size.width <= 0 {
                continue;
            }

            let working = if size.width != target_w || size.height != target_h {
                opencv::imgproc::resize(
                    &frame,
                    &mut scratch,
                    core::Size {
                        width: target_w,
                        height: target_h,
                    },
                    0.0,
                    0.0,
                    opencv::imgproc::INTER_LINEAR,
                )
                .map_err(|e| CaptureError::Other(e.into()))?;
                &scratch
            } else {
                &frame
            };

            let data = working
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec();

            return Ok(Some(Frame {
                data,
                width: target_w,
                height: target_h,
                timestamp_ms: Utc::now().timestamp_millis(),
                format: FrameFormat::Bgr8,
            }));
        }
    }

    fn close(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.cap.release() {
            warn!("failed to release camera: {err}");
        }
        self.released = true;
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_device(index: i32) -> Result<VideoCapture, CaptureError> {
    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::new(index, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                debug!("camera #{index} unavailable via backend {backend}: {err}");
            }
        }
    }
    Err(CaptureError::DeviceUnavailable { index })
}

/// Apply common capture settings (preferred pixel format, resolution, fps).
fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
    if let Ok(fourcc) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, fourcc as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}

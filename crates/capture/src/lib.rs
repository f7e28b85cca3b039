//! Camera capture: frame types and the OpenCV-backed webcam source.

pub use camera::{CameraSource, FrameSource};
pub use types::{CaptureError, Frame, FrameFormat};

mod camera;
mod types;

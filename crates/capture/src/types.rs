use thiserror::Error;

/// Raw BGR frame pulled from a video source.
///
/// A frame belongs to the loop iteration that read it and is dropped when
/// the iteration finishes; nothing downstream retains frame history.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera device #{index}")]
    DeviceUnavailable { index: i32 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

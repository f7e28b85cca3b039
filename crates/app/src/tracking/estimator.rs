//! Boundary to the pose-estimation model.

use anyhow::Result;
use capture::Frame;
use pose_core::Keypoint;

/// A live pose-estimation session fed one frame at a time.
///
/// Implementations may keep temporal state between calls; the pipeline
/// holds exactly one session for its lifetime and drops it during the
/// stopping pass. `Ok(None)` means no body was detected in the frame.
pub(crate) trait PoseEstimator {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Vec<Keypoint>>>;
}

#[cfg(feature = "with-tch")]
impl PoseEstimator for pose_core::PoseModel {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Vec<Keypoint>>> {
        self.estimate_bgr(&frame.data, frame.width, frame.height)
    }
}

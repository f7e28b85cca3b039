//! Body-pose model boundary: keypoint types, the fixed body topology, and
//! the TorchScript-backed estimation session. Enable the `with-tch` feature
//! to pull in the `tch` crate and the real model; the types and topology
//! are always available so callers can test against scripted estimators.

pub use topology::{POSE_CONNECTIONS, POSE_LANDMARK_COUNT, PoseLandmark};

#[cfg(feature = "with-tch")]
pub use model::PoseModel;
#[cfg(feature = "with-tch")]
pub use tch;

/// One estimated keypoint in normalized image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

#[cfg(feature = "with-tch")]
mod model;
mod topology;

//! Fixed full-body landmark topology shared by the model and the preview.
//!
//! The emission order is part of the wire contract: consumers key scene
//! objects by landmark index, so the same anatomical point must report under
//! the same index on every frame.

/// Number of keypoints emitted per detection.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// Anatomical identity of each landmark index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl PoseLandmark {
    /// Position of this landmark in the model's emission order.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Skeleton segments drawn between anatomically adjacent landmarks.
pub const POSE_CONNECTIONS: [(PoseLandmark, PoseLandmark); 35] = [
    // face
    (PoseLandmark::Nose, PoseLandmark::LeftEyeInner),
    (PoseLandmark::LeftEyeInner, PoseLandmark::LeftEye),
    (PoseLandmark::LeftEye, PoseLandmark::LeftEyeOuter),
    (PoseLandmark::LeftEyeOuter, PoseLandmark::LeftEar),
    (PoseLandmark::Nose, PoseLandmark::RightEyeInner),
    (PoseLandmark::RightEyeInner, PoseLandmark::RightEye),
    (PoseLandmark::RightEye, PoseLandmark::RightEyeOuter),
    (PoseLandmark::RightEyeOuter, PoseLandmark::RightEar),
    (PoseLandmark::MouthLeft, PoseLandmark::MouthRight),
    // arms
    (PoseLandmark::LeftShoulder, PoseLandmark::RightShoulder),
    (PoseLandmark::LeftShoulder, PoseLandmark::LeftElbow),
    (PoseLandmark::LeftElbow, PoseLandmark::LeftWrist),
    (PoseLandmark::LeftWrist, PoseLandmark::LeftPinky),
    (PoseLandmark::LeftWrist, PoseLandmark::LeftIndex),
    (PoseLandmark::LeftWrist, PoseLandmark::LeftThumb),
    (PoseLandmark::LeftPinky, PoseLandmark::LeftIndex),
    (PoseLandmark::RightShoulder, PoseLandmark::RightElbow),
    (PoseLandmark::RightElbow, PoseLandmark::RightWrist),
    (PoseLandmark::RightWrist, PoseLandmark::RightPinky),
    (PoseLandmark::RightWrist, PoseLandmark::RightIndex),
    (PoseLandmark::RightWrist, PoseLandmark::RightThumb),
    (PoseLandmark::RightPinky, PoseLandmark::RightIndex),
    // torso
    (PoseLandmark::LeftShoulder, PoseLandmark::LeftHip),
    (PoseLandmark::RightShoulder, PoseLandmark::RightHip),
    (PoseLandmark::LeftHip, PoseLandmark::RightHip),
    // legs
    (PoseLandmark::LeftHip, PoseLandmark::LeftKnee),
    (PoseLandmark::RightHip, PoseLandmark::RightKnee),
    (PoseLandmark::LeftKnee, PoseLandmark::LeftAnkle),
    (PoseLandmark::RightKnee, PoseLandmark::RightAnkle),
    (PoseLandmark::LeftAnkle, PoseLandmark::LeftHeel),
    (PoseLandmark::RightAnkle, PoseLandmark::RightHeel),
    (PoseLandmark::LeftHeel, PoseLandmark::LeftFootIndex),
    (PoseLandmark::RightHeel, PoseLandmark::RightFootIndex),
    (PoseLandmark::LeftAnkle, PoseLandmark::LeftFootIndex),
    (PoseLandmark::RightAnkle, PoseLandmark::RightFootIndex),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_stay_within_the_topology() {
        for (a, b) in POSE_CONNECTIONS {
            assert!(a.index() < POSE_LANDMARK_COUNT);
            assert!(b.index() < POSE_LANDMARK_COUNT);
            assert_ne!(a.index(), b.index(), "segment connects a point to itself");
        }
    }

    #[test]
    fn connections_are_unique() {
        for (i, (a1, b1)) in POSE_CONNECTIONS.iter().enumerate() {
            for (a2, b2) in &POSE_CONNECTIONS[i + 1..] {
                assert!(
                    !(a1.index() == a2.index() && b1.index() == b2.index()),
                    "duplicate segment {a1:?} -> {b1:?}"
                );
            }
        }
    }

    #[test]
    fn emission_order_covers_the_full_body() {
        assert_eq!(PoseLandmark::Nose.index(), 0);
        assert_eq!(PoseLandmark::RightFootIndex.index(), POSE_LANDMARK_COUNT - 1);
    }
}

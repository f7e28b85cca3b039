//! Conversion from raw model keypoints to wire-ready landmark records.

use pose_core::Keypoint;

use crate::tracking::data::Landmark;

/// Flatten raw keypoints into ordered landmark records.
///
/// Ids are assigned by emission order so a consumer can follow one
/// anatomical point across frames.
pub(crate) fn encode_landmarks(keypoints: &[Keypoint]) -> Vec<Landmark> {
    keypoints
        .iter()
        .enumerate()
        .map(|(index, keypoint)| Landmark {
            id: index as u32,
            x: keypoint.x,
            y: keypoint.y,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypoint(x: f32, y: f32) -> Keypoint {
        Keypoint { x, y, score: 0.9 }
    }

    #[test]
    fn ids_follow_emission_order() {
        let keypoints = [keypoint(0.1, 0.2), keypoint(0.3, 0.4), keypoint(0.5, 0.6)];
        let landmarks = encode_landmarks(&keypoints);
        assert_eq!(landmarks.len(), 3);
        for (index, landmark) in landmarks.iter().enumerate() {
            assert_eq!(landmark.id, index as u32);
        }
        assert_eq!(landmarks[1].x, 0.3);
        assert_eq!(landmarks[1].y, 0.4);
    }

    #[test]
    fn empty_input_produces_an_empty_set() {
        assert!(encode_landmarks(&[]).is_empty());
    }
}

use serde::Serialize;

/// One landmark as it appears on the wire: normalized coordinates keyed by
/// a stable anatomical index.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub(crate) struct Landmark {
    pub(crate) id: u32,
    pub(crate) x: f32,
    pub(crate) y: f32,
}

/// Wire-level unit pushed to the consumer for each frame with a detection.
#[derive(Debug, Serialize)]
pub(crate) struct TrackingMessage<'a> {
    pub(crate) id: i32,
    pub(crate) landmarks: &'a [Landmark],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_to_the_wire_layout() {
        let landmarks = [
            Landmark { id: 0, x: 0.25, y: 0.5 },
            Landmark { id: 1, x: 0.75, y: 1.0 },
        ];
        let message = TrackingMessage {
            id: 3,
            landmarks: &landmarks,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"id":3,"landmarks":[{"id":0,"x":0.25,"y":0.5},{"id":1,"x":0.75,"y":1.0}]}"#
        );
    }
}

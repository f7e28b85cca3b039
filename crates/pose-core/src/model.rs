//! TorchScript pose-estimation session.

use std::path::Path;

use anyhow::{Result, bail};
use tch::{CModule, Device, Kind, Tensor};

use crate::Keypoint;

/// A live TorchScript pose session.
///
/// The session carries one piece of temporal state: whether a body was
/// present in the previous frame. While a body is held, presence is gated
/// on the tracking threshold; once lost, re-acquisition requires the
/// (stricter) detection threshold. The module itself is expected to keep
/// its own tracking state across consecutive calls.
pub struct PoseModel {
    module: CModule,
    device: Device,
    input_size: (i64, i64),
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    tracking: bool,
}

impl PoseModel {
    /// Load a TorchScript module onto `device`.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        input_size: (i64, i64),
    ) -> Result<Self> {
        let module = CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module,
            device,
            input_size,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            tracking: false,
        })
    }

    /// Override the confidence thresholds gating detection presence.
    pub fn with_confidence(mut self, min_detection: f32, min_tracking: f32) -> Self {
        self.min_detection_confidence = min_detection;
        self.min_tracking_confidence = min_tracking;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Run the model on one BGR frame.
    ///
    /// Returns `Ok(None)` when no body clears the active confidence
    /// threshold; keypoint coordinates are normalized to `[0, 1]`.
    pub fn estimate_bgr(
        &mut self,
        data: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Option<Vec<Keypoint>>> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            bail!(
                "unexpected frame buffer size: got {} bytes, expected {expected}",
                data.len()
            );
        }

        let input = self.prepare_input(data, width, height);
        let output = self.module.forward_ts(&[input])?;

        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 || shape[2] < 3 {
            bail!("unexpected pose output shape: {shape:?}");
        }

        let rows: Vec<Vec<f32>> =
            Vec::<Vec<f32>>::try_from(&output.to_device(Device::Cpu).squeeze_dim(0))?;

        let mut keypoints = Vec::with_capacity(rows.len());
        let mut score_sum = 0.0f32;
        for row in &rows {
            let score = row[2];
            score_sum += score;
            keypoints.push(Keypoint {
                x: row[0].clamp(0.0, 1.0),
                y: row[1].clamp(0.0, 1.0),
                score,
            });
        }

        let presence = if keypoints.is_empty() {
            0.0
        } else {
            score_sum / keypoints.len() as f32
        };
        let threshold = if self.tracking {
            self.min_tracking_confidence
        } else {
            self.min_detection_confidence
        };

        if presence < threshold {
            self.tracking = false;
            return Ok(None);
        }

        self.tracking = true;
        Ok(Some(keypoints))
    }

    /// Normalize a BGR byte buffer into the module's NCHW float input,
    /// resampling when the frame does not match the module's input size.
    fn prepare_input(&self, data: &[u8], width: i32, height: i32) -> Tensor {
        let (in_w, in_h) = self.input_size;
        let tensor = Tensor::from_slice(data)
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, height as i64, width as i64, 3])
            .permute([0, 3, 1, 2])
            / 255.0;

        if (width as i64, height as i64) != (in_w, in_h) {
            tensor.upsample_bilinear2d([in_h, in_w], false, None, None)
        } else {
            tensor
        }
    }
}

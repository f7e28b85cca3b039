use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};

/// Port the stream binds when `--port` is not given, matching the consumer's
/// default endpoint.
pub(crate) const DEFAULT_STREAM_PORT: u16 = 8765;

const DEFAULT_CONFIDENCE: f32 = 0.5;

const TRACK_USAGE: &str = "Usage: cargo run -p app --features with-tch -- \
track --model <path> [--camera <index>] [--id <n>] \
[--port <1-65535> | --no-stream] [--width <px>] [--height <px>] \
[--min-detection-confidence <0-1>] [--min-tracking-confidence <0-1>]\n\n\
Positional form is also supported: track <camera-index> <model-path> [...flags...]";

/// Immutable settings for one pipeline instance, captured at startup.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Caller-assigned id included verbatim in every streamed message.
    pub source_id: i32,
    pub camera_index: i32,
    /// `None` disables the landmark stream entirely.
    pub transport_port: Option<u16>,
    pub model_path: PathBuf,
    pub width: i32,
    pub height: i32,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl PipelineConfig {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut camera_index: Option<i32> = None;
        let mut source_id: Option<i32> = None;
        let mut port: Option<u16> = None;
        let mut no_stream = false;
        let mut model_path: Option<PathBuf> = None;
        let mut width: Option<i32> = None;
        let mut height: Option<i32> = None;
        let mut min_detection: Option<f32> = None;
        let mut min_tracking: Option<f32> = None;
        let mut positional: Vec<String> = Vec::new();

        let mut idx = 2;
        while idx < args.len() {
            match args[idx].as_str() {
                "--camera" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--camera requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--camera must be an integer".to_string())?;
                    camera_index = Some(value);
                    idx += 1;
                }
                "--id" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--id requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--id must be an integer".to_string())?;
                    source_id = Some(value);
                    idx += 1;
                }
                "--port" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--port requires a value"))?
                        .parse::<u32>()
                        .with_context(|| "--port must be an integer".to_string())?;
                    if !(1..=65535).contains(&value) {
                        bail!("--port must be between 1 and 65535");
                    }
                    port = Some(value as u16);
                    idx += 1;
                }
                "--no-stream" => {
                    no_stream = true;
                    idx += 1;
                }
                "--model" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--model requires a value"))?
                        .clone();
                    model_path = Some(PathBuf::from(value));
                    idx += 1;
                }
                "--width" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--width requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--width must be a positive integer".to_string())?;
                    if value <= 0 {
                        bail!("--width must be a positive integer");
                    }
                    width = Some(value);
                    idx += 1;
                }
                "--height" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--height requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--height must be a positive integer".to_string())?;
                    if value <= 0 {
                        bail!("--height must be a positive integer");
                    }
                    height = Some(value);
                    idx += 1;
                }
                "--min-detection-confidence" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--min-detection-confidence requires a value"))?
                        .parse::<f32>()
                        .with_context(|| {
                            "--min-detection-confidence must be a number".to_string()
                        })?;
                    min_detection = Some(value);
                    idx += 1;
                }
                "--min-tracking-confidence" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--min-tracking-confidence requires a value"))?
                        .parse::<f32>()
                        .with_context(|| "--min-tracking-confidence must be a number".to_string())?;
                    min_tracking = Some(value);
                    idx += 1;
                }
                "--help" | "-h" => bail!(TRACK_USAGE),
                arg if arg.starts_with('-') => {
                    bail!("Unrecognised flag: {arg}\n\n{TRACK_USAGE}");
                }
                other => {
                    positional.push(other.to_string());
                    idx += 1;
                }
            }
        }

        let mut positional = positional.into_iter();
        if camera_index.is_none() {
            if let Some(value) = positional.next() {
                camera_index = Some(
                    value
                        .parse::<i32>()
                        .with_context(|| "camera index must be an integer".to_string())?,
                );
            }
        }
        if model_path.is_none() {
            if let Some(path) = positional.next() {
                model_path = Some(PathBuf::from(path));
            }
        }

        if no_stream && port.is_some() {
            bail!("--port and --no-stream are mutually exclusive");
        }

        let model_path = model_path.ok_or_else(|| {
            anyhow!("Missing model path. Provide --model <path> or positional <model-path>.")
        })?;

        let min_detection_confidence = min_detection.unwrap_or(DEFAULT_CONFIDENCE);
        let min_tracking_confidence = min_tracking.unwrap_or(DEFAULT_CONFIDENCE);
        for (flag, value) in [
            ("--min-detection-confidence", min_detection_confidence),
            ("--min-tracking-confidence", min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{flag} must be between 0 and 1");
            }
        }

        let transport_port = if no_stream {
            None
        } else {
            Some(port.unwrap_or(DEFAULT_STREAM_PORT))
        };

        Ok(Self {
            source_id: source_id.unwrap_or(1),
            camera_index: camera_index.unwrap_or(0),
            transport_port,
            model_path,
            width: width.unwrap_or(1280),
            height: height.unwrap_or(720),
            min_detection_confidence,
            min_tracking_confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tail: &[&str]) -> Vec<String> {
        let mut all = vec!["app".to_string(), "track".to_string()];
        all.extend(tail.iter().map(|s| s.to_string()));
        all
    }

    #[test]
    fn defaults_mirror_the_single_camera_tool() {
        let config = PipelineConfig::from_args(&args(&["--model", "pose.pt"])).unwrap();
        assert_eq!(config.source_id, 1);
        assert_eq!(config.camera_index, 0);
        assert_eq!(config.transport_port, Some(DEFAULT_STREAM_PORT));
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
        assert_eq!(config.min_detection_confidence, 0.5);
        assert_eq!(config.min_tracking_confidence, 0.5);
    }

    #[test]
    fn positional_form_sets_camera_and_model() {
        let config = PipelineConfig::from_args(&args(&["2", "pose.pt"])).unwrap();
        assert_eq!(config.camera_index, 2);
        assert_eq!(config.model_path, PathBuf::from("pose.pt"));
    }

    #[test]
    fn no_stream_disables_the_transport() {
        let config =
            PipelineConfig::from_args(&args(&["--model", "pose.pt", "--no-stream"])).unwrap();
        assert!(config.transport_port.is_none());
    }

    #[test]
    fn port_and_no_stream_conflict() {
        let err = PipelineConfig::from_args(&args(&[
            "--model",
            "pose.pt",
            "--port",
            "9000",
            "--no-stream",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn out_of_range_ports_are_rejected() {
        for port in ["0", "70000"] {
            assert!(
                PipelineConfig::from_args(&args(&["--model", "pose.pt", "--port", port])).is_err()
            );
        }
    }

    #[test]
    fn confidence_must_stay_normalized() {
        assert!(
            PipelineConfig::from_args(&args(&[
                "--model",
                "pose.pt",
                "--min-detection-confidence",
                "1.5",
            ]))
            .is_err()
        );
    }

    #[test]
    fn model_path_is_required() {
        assert!(PipelineConfig::from_args(&args(&["--camera", "0"])).is_err());
    }

    #[test]
    fn unrecognised_flags_are_rejected() {
        assert!(PipelineConfig::from_args(&args(&["--model", "pose.pt", "--gpu"])).is_err());
    }
}

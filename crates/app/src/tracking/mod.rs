//! Body-tracking pipeline: webcam capture, pose estimation, landmark
//! streaming, and an annotated preview window.
//!
//! The module is split into focused submodules:
//! - `config`: CLI flag parsing into an immutable `PipelineConfig`.
//! - `pipeline`: the per-frame orchestration loop and its lifecycle.
//! - `estimator`: boundary to the pose model session.
//! - `encoder`: estimator output → wire-ready landmark records.
//! - `preview`: skeleton overlay window and quit-key polling.
//! - `transport`: single-consumer WebSocket landmark stream.
//! - `data`: wire-level message structs.
//! - `telemetry`: tracing subscriber setup.

pub use config::PipelineConfig;
pub use pipeline::{PipelineState, TrackingPipeline};

mod config;
mod data;
mod encoder;
mod estimator;
mod pipeline;
mod preview;
pub(crate) mod telemetry;
mod transport;

use std::sync::{Once, atomic::Ordering};

use anyhow::{Context, Result};
use capture::CameraSource;
use tracing::{debug, warn};

use crate::tracking::{estimator::PoseEstimator, preview::PreviewWindow};

/// Parse `track` arguments and run one pipeline to completion.
pub fn run_from_args(args: &[String]) -> Result<()> {
    let config = PipelineConfig::from_args(args)?;
    run(config)
}

/// Run one pipeline instance with a ready-made configuration.
pub fn run(config: PipelineConfig) -> Result<()> {
    debug!(
        "confidence thresholds: detection {:.2}, tracking {:.2}",
        config.min_detection_confidence, config.min_tracking_confidence
    );

    let source = CameraSource::open(config.camera_index, (config.width, config.height))
        .with_context(|| format!("failed to open camera #{}", config.camera_index))?;
    let estimator = build_estimator(&config)?;
    let preview = PreviewWindow::open(&format!("Pose Tracking {}", config.source_id))?;

    let mut pipeline =
        TrackingPipeline::new(config, Box::new(source), estimator, Box::new(preview))?;

    install_ctrlc_handler(&pipeline);

    pipeline.run()
}

fn install_ctrlc_handler(pipeline: &TrackingPipeline) {
    static CTRL_HANDLER: Once = Once::new();
    let shutdown = pipeline.shutdown_flag();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });
}

#[cfg(feature = "with-tch")]
const POSE_INPUT_SIZE: (i64, i64) = (256, 256);

#[cfg(feature = "with-tch")]
fn build_estimator(config: &PipelineConfig) -> Result<Box<dyn PoseEstimator>> {
    use pose_core::{PoseModel, tch::Device};

    let model = PoseModel::load(
        &config.model_path,
        Device::cuda_if_available(),
        POSE_INPUT_SIZE,
    )
    .with_context(|| format!("failed to load pose model {}", config.model_path.display()))?
    .with_confidence(
        config.min_detection_confidence,
        config.min_tracking_confidence,
    );
    Ok(Box::new(model))
}

#[cfg(not(feature = "with-tch"))]
fn build_estimator(config: &PipelineConfig) -> Result<Box<dyn PoseEstimator>> {
    anyhow::bail!(
        "cannot load pose model {}: this build carries no Torch backend; rebuild with `--features with-tch`",
        config.model_path.display()
    )
}

//! The per-frame orchestration loop and its lifecycle.
//!
//! One pipeline instance owns a frame source, a pose session, a preview
//! surface, and (optionally) the landmark stream. Everything runs on one
//! thread, strictly one frame in and one frame out; the only background
//! work is the transport's accept thread, which never blocks this loop.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use anyhow::Result;
use capture::FrameSource;
use tracing::{debug, error, info};

use crate::tracking::{
    config::PipelineConfig,
    data::TrackingMessage,
    encoder::encode_landmarks,
    estimator::PoseEstimator,
    preview::PreviewSurface,
    transport::{TransportState, WsTransport},
};

/// How often the running loop logs its frame-rate heartbeat.
const HEARTBEAT_EVERY: u64 = 30;

/// Lifecycle of one pipeline instance. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// One capture → estimate → encode → render → stream loop bound to a
/// single camera. Owns every resource it runs on and releases them all in
/// one stopping pass, whichever signal ends the run.
pub struct TrackingPipeline {
    config: PipelineConfig,
    source: Box<dyn FrameSource>,
    estimator: Option<Box<dyn PoseEstimator>>,
    preview: Box<dyn PreviewSurface>,
    transport: Option<WsTransport>,
    shutdown: Arc<AtomicBool>,
    state: PipelineState,
}

impl TrackingPipeline {
    /// Assemble a pipeline from already-acquired components, binding the
    /// stream transport when one is configured.
    ///
    /// A bind failure releases the components that were handed in before
    /// the error surfaces; no partially-started pipeline escapes.
    pub(crate) fn new(
        config: PipelineConfig,
        mut source: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
        mut preview: Box<dyn PreviewSurface>,
    ) -> Result<Self> {
        let transport = match config.transport_port {
            Some(port) => match WsTransport::bind(port) {
                Ok(transport) => Some(transport),
                Err(err) => {
                    source.close();
                    preview.close();
                    return Err(err.into());
                }
            },
            None => None,
        };

        Ok(Self {
            config,
            source,
            estimator: Some(estimator),
            preview,
            transport,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: PipelineState::Starting,
        })
    }

    /// Flag checked once per frame; signal handlers set it to request the
    /// same stopping pass the quit key triggers. No mid-frame cancellation:
    /// an in-progress estimate always completes first.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Drive the loop until end-of-stream, the quit key, or a shutdown
    /// signal, then release everything.
    pub fn run(&mut self) -> Result<()> {
        self.state = PipelineState::Running;
        info!(
            "tracking pipeline {} running (camera {})",
            self.config.source_id, self.config.camera_index
        );

        let mut frame_number: u64 = 0;
        let mut smoothed_fps: f32 = 0.0;
        let mut last_instant = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, stopping");
                break;
            }

            let frame = match self.source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("frame source ended, stopping");
                    break;
                }
                Err(err) => {
                    error!("frame source failed: {err}");
                    break;
                }
            };
            frame_number = frame_number.wrapping_add(1);

            // A failed estimate counts as "nothing detected in this frame";
            // one bad frame must not end the stream.
            let keypoints = match self.estimator.as_mut() {
                Some(estimator) => match estimator.estimate(&frame) {
                    Ok(result) => result,
                    Err(err) => {
                        debug!("estimation failed on frame #{frame_number}: {err}");
                        None
                    }
                },
                None => None,
            };

            let landmarks = keypoints.map(|keypoints| encode_landmarks(&keypoints));

            if let (Some(landmarks), Some(transport)) =
                (landmarks.as_deref(), self.transport.as_mut())
            {
                if !landmarks.is_empty() {
                    transport.send(&TrackingMessage {
                        id: self.config.source_id,
                        landmarks,
                    });
                }
            }

            if let Err(err) = self
                .preview
                .render(&frame, landmarks.as_deref().unwrap_or(&[]))
            {
                error!("preview render failed: {err}");
                break;
            }

            match self.preview.poll_quit() {
                Ok(true) => {
                    info!("quit key pressed, stopping");
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    error!("preview event poll failed: {err}");
                    break;
                }
            }

            let elapsed = last_instant.elapsed().as_secs_f32();
            last_instant = Instant::now();
            if elapsed > 0.0 {
                let instant_fps = 1.0 / elapsed;
                smoothed_fps = if smoothed_fps == 0.0 {
                    instant_fps
                } else {
                    0.9 * smoothed_fps + 0.1 * instant_fps
                };
            }
            if frame_number % HEARTBEAT_EVERY == 0 {
                debug!("frame #{frame_number}, {smoothed_fps:.1} fps");
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Release camera, estimator session, transport, and window in one
    /// pass. Safe to call more than once; component cleanup logs its own
    /// failures and nothing propagates from here.
    pub fn shutdown(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.state = PipelineState::Stopping;

        self.source.close();
        self.estimator = None;
        if let Some(transport) = self.transport.as_mut() {
            if transport.state() == TransportState::Connected {
                debug!("closing live consumer connection");
            }
            transport.close();
        }
        self.preview.close();

        self.state = PipelineState::Stopped;
        info!("tracking pipeline {} stopped", self.config.source_id);
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> Option<&mut WsTransport> {
        self.transport.as_mut()
    }
}

impl Drop for TrackingPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Annotated preview window and quit-key polling.

use anyhow::Result;
use capture::Frame;
use opencv::{
    core::{Point, Scalar},
    highgui, imgproc,
    prelude::*,
};
use pose_core::POSE_CONNECTIONS;
use tracing::warn;

use crate::tracking::data::Landmark;

/// Key code reported by the GUI event pump for Escape.
const QUIT_KEY: i32 = 27;
/// How long each poll pumps window events, in milliseconds.
const EVENT_POLL_MS: i32 = 5;

/// On-screen surface showing the annotated feed.
///
/// `poll_quit` doubles as the GUI event pump; skipping it freezes the
/// window on most backends.
pub(crate) trait PreviewSurface {
    fn render(&mut self, frame: &Frame, landmarks: &[Landmark]) -> Result<()>;
    fn poll_quit(&mut self) -> Result<bool>;
    fn close(&mut self);
}

/// OpenCV `highgui` window drawing the skeleton overlay.
pub(crate) struct PreviewWindow {
    name: String,
    open: bool,
}

impl PreviewWindow {
    pub(crate) fn open(name: &str) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_string(),
            open: true,
        })
    }
}

impl PreviewSurface for PreviewWindow {
    fn render(&mut self, frame: &Frame, landmarks: &[Landmark]) -> Result<()> {
        let mut canvas = Mat::from_slice(&frame.data)?
            .reshape(3, frame.height)?
            .try_clone()?;

        for (from, to) in POSE_CONNECTIONS {
            let (Some(from), Some(to)) =
                (landmarks.get(from.index()), landmarks.get(to.index()))
            else {
                continue;
            };
            imgproc::line(
                &mut canvas,
                to_pixel(from, frame),
                to_pixel(to, frame),
                Scalar::new(0.0, 255.0, 255.0, 0.0),
                2,
                imgproc::LINE_AA,
                0,
            )?;
        }
        for landmark in landmarks {
            imgproc::circle(
                &mut canvas,
                to_pixel(landmark, frame),
                3,
                Scalar::new(0.0, 255.0, 0.0, 0.0),
                imgproc::FILLED,
                imgproc::LINE_AA,
                0,
            )?;
        }

        highgui::imshow(&self.name, &canvas)?;
        Ok(())
    }

    fn poll_quit(&mut self) -> Result<bool> {
        let key = highgui::wait_key(EVENT_POLL_MS)?;
        Ok(key & 0xFF == QUIT_KEY)
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        if let Err(err) = highgui::destroy_window(&self.name) {
            warn!("failed to destroy preview window: {err}");
        }
        self.open = false;
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_pixel(landmark: &Landmark, frame: &Frame) -> Point {
    Point::new(
        (landmark.x * (frame.width - 1) as f32).round() as i32,
        (landmark.y * (frame.height - 1) as f32).round() as i32,
    )
}

//! Live preview of scanned frames.
//!
//! The hub surfaces every frame it scans to a [`PreviewSink`], with an
//! outline around each detected face. [`PngPreview`] keeps the most recent
//! frame on disk for an external viewer to poll.

use crate::frame::{bgr_to_rgb, Frame};
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;
use thiserror::Error;

/// Outline colour for a recognised or accepted face (BGR).
pub const COLOR_ACCEPT: [u8; 3] = [0, 255, 0];
/// Outline colour for an unknown face (BGR).
pub const COLOR_REJECT: [u8; 3] = [0, 0, 255];

const OUTLINE_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("frame buffer does not match {0}x{1}")]
    BadFrame(u32, u32),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A rectangle to draw over a preview frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: [u8; 3],
}

/// Receives frames for display.
pub trait PreviewSink: Send {
    fn show(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<(), PreviewError>;
}

/// Discards every frame.
#[derive(Debug, Default)]
pub struct NoPreview;

impl PreviewSink for NoPreview {
    fn show(&mut self, _frame: &Frame, _overlays: &[Overlay]) -> Result<(), PreviewError> {
        Ok(())
    }
}

/// Writes the latest frame as a PNG, replacing the previous one atomically.
#[derive(Debug, Clone)]
pub struct PngPreview {
    path: PathBuf,
}

impl PngPreview {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PreviewSink for PngPreview {
    fn show(&mut self, frame: &Frame, overlays: &[Overlay]) -> Result<(), PreviewError> {
        let mut bgr = frame.data.clone();
        for overlay in overlays {
            draw_outline(&mut bgr, frame.width, frame.height, overlay);
        }

        let image = RgbImage::from_raw(frame.width, frame.height, bgr_to_rgb(&bgr))
            .ok_or(PreviewError::BadFrame(frame.width, frame.height))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        image.save_with_format(&tmp, ImageFormat::Png)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Draw a rectangle outline into a BGR buffer, clipped to the frame.
pub fn draw_outline(bgr: &mut [u8], width: u32, height: u32, overlay: &Overlay) {
    if width == 0 || height == 0 || bgr.len() < width as usize * height as usize * 3 {
        return;
    }
    let clamp_x = |v: f32| (v.round().max(0.0) as u32).min(width - 1);
    let clamp_y = |v: f32| (v.round().max(0.0) as u32).min(height - 1);

    let x0 = clamp_x(overlay.x);
    let y0 = clamp_y(overlay.y);
    let x1 = clamp_x(overlay.x + overlay.width);
    let y1 = clamp_y(overlay.y + overlay.height);

    let mut put = |x: u32, y: u32| {
        let idx = (y as usize * width as usize + x as usize) * 3;
        bgr[idx..idx + 3].copy_from_slice(&overlay.color);
    };

    for t in 0..OUTLINE_THICKNESS {
        let top = (y0 + t).min(y1);
        let bottom = y1.saturating_sub(t).max(y0);
        let left = (x0 + t).min(x1);
        let right = x1.saturating_sub(t).max(x0);
        for x in x0..=x1 {
            put(x, top);
            put(x, bottom);
        }
        for y in y0..=y1 {
            put(left, y);
            put(right, y);
        }
    }
}

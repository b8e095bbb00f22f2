//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::source::{CaptureDevice, FrameSource};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    DeviceNotFound(String),
    #[error("frame capture: {0}")]
    CaptureFailed(String),
    #[error("camera is in use by another process")]
    DeviceBusy,
    #[error("pixel format: {0}")]
    FormatNegotiationFailed(String),
    #[error("device cannot stream video")]
    StreamingNotSupported,
}

/// Pixel layouts the session knows how to turn into BGR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 4:2:2, two bytes per pixel.
    Yuyv,
    /// One luma byte per pixel (IR cameras).
    Grey,
}

impl PixelFormat {
    const YUYV: [u8; 4] = *b"YUYV";
    const GREY: [u8; 4] = *b"GREY";

    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match fourcc.repr {
            Self::YUYV => Some(PixelFormat::Yuyv),
            Self::GREY => Some(PixelFormat::Grey),
            _ => None,
        }
    }
}

/// A V4L2 device node. Nothing is opened until [`CaptureDevice::acquire`].
#[derive(Debug, Clone)]
pub struct V4lCamera {
    pub device_path: String,
    /// Requested resolution; the driver may pick another.
    pub width: u32,
    pub height: u32,
    /// Frames thrown away after opening so exposure can settle.
    pub warmup_frames: usize,
}

impl V4lCamera {
    pub fn new(device_path: impl Into<String>, width: u32, height: u32, warmup_frames: usize) -> Self {
        Self {
            device_path: device_path.into(),
            width,
            height,
            warmup_frames,
        }
    }

    fn open_device(&self) -> Result<Device, CameraError> {
        let path = self.device_path.as_str();
        if !Path::new(path).exists() {
            return Err(CameraError::DeviceNotFound(path.to_string()));
        }
        let device = Device::with_path(path).map_err(|e| match e.raw_os_error() {
            Some(code) if code == EBUSY => CameraError::DeviceBusy,
            _ => CameraError::DeviceNotFound(format!("{path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("query caps on {path}: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }
        tracing::debug!(device = path, driver = %caps.driver, card = %caps.card, "camera opened");
        Ok(device)
    }

    /// Ask for YUYV at the configured size and accept YUYV or GREY back.
    fn negotiate(&self, device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
        let mut wanted = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("read current format: {e}")))?;
        wanted.fourcc = FourCC::new(&PixelFormat::YUYV);
        wanted.width = self.width;
        wanted.height = self.height;

        let got = device
            .set_format(&wanted)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("apply format: {e}")))?;
        let pixel_format = PixelFormat::from_fourcc(got.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!("driver chose {}, expected YUYV or GREY", got.fourcc))
        })?;

        if (got.width, got.height) != (self.width, self.height) {
            tracing::warn!(
                requested = ?(self.width, self.height),
                granted = ?(got.width, got.height),
                "camera adjusted the resolution"
            );
        }
        Ok((got.width, got.height, pixel_format))
    }

    fn start_session(&self) -> Result<V4lSession, CameraError> {
        let device = self.open_device()?;
        let (width, height, pixel_format) = self.negotiate(&device)?;
        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("map stream buffers: {e}")))?;

        tracing::info!(device = %self.device_path, width, height, ?pixel_format, "camera acquired");
        Ok(V4lSession {
            stream,
            _device: device,
            device_path: self.device_path.clone(),
            width,
            height,
            pixel_format,
        })
    }
}

impl CaptureDevice for V4lCamera {
    fn acquire(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let mut session = self.start_session()?;
        if self.warmup_frames > 0 {
            tracing::debug!(count = self.warmup_frames, "skipping warmup frames");
            for _ in 0..self.warmup_frames {
                session.next_frame()?;
            }
        }
        Ok(Box::new(session))
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}

/// An open, streaming camera. Dropping it stops the stream and closes the device.
pub struct V4lSession {
    stream: MmapStream<'static>,
    _device: Device,
    device_path: String,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

fn to_bgr(format: PixelFormat, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
    let converted = match format {
        PixelFormat::Yuyv => frame::yuyv_to_bgr(buf, width, height),
        PixelFormat::Grey => frame::grey_to_bgr(buf, width, height),
    };
    converted.map_err(|e| CameraError::CaptureFailed(format!("{format:?} to BGR: {e}")))
}

impl FrameSource for V4lSession {
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let (raw, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue on {}: {e}", self.device_path)))?;
        let sequence = meta.sequence;
        let bgr = to_bgr(self.pixel_format, raw, self.width, self.height)?;
        Frame::from_bgr(bgr, self.width, self.height, sequence)
            .map(Some)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }
}

impl Drop for V4lSession {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

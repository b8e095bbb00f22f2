//! Capture capability traits.
//!
//! A [`CaptureDevice`] is acquired once per scan and hands back a boxed
//! [`FrameSource`]. The device is held for as long as that session value
//! lives; dropping it releases the camera on every exit path.

use crate::camera::CameraError;
use crate::frame::Frame;

/// Blocking, sequential frame pull for one capture session.
pub trait FrameSource: Send {
    /// Next frame in arrival order, or `Ok(None)` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;
}

/// Something that can open capture sessions on demand.
pub trait CaptureDevice: Send {
    fn acquire(&self) -> Result<Box<dyn FrameSource>, CameraError>;

    /// Human-readable device name for logs.
    fn describe(&self) -> String;
}

//! warden-hw: Hardware abstraction for camera capture and frame preview.
//!
//! Provides the capture-session traits the hub scans through, a V4L2-backed
//! camera, and a PNG preview sink.

pub mod camera;
pub mod frame;
pub mod preview;
pub mod source;

pub use camera::{CameraError, PixelFormat, V4lCamera};
pub use frame::Frame;
pub use preview::{NoPreview, Overlay, PngPreview, PreviewError, PreviewSink};
pub use source::{CaptureDevice, FrameSource};

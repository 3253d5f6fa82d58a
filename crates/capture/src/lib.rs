//! Window capture core for LivePiP
//!
//! Enumerates capturable windows, runs one live capture session per source
//! window and hands decoded frames over to the presentation context.

pub mod catalog;
pub mod frame;
pub mod session;
pub mod stream;
pub mod window;

#[cfg(target_os = "windows")]
pub mod wgc;

pub use catalog::{search, WindowCatalog, WindowSource, MIN_WINDOW_DIMENSION};
pub use frame::{latest_frame_channel, FrameData, FrameReceiver, FrameSink, FrameWaker, PixelFormat, RawFrame};
pub use session::{CaptureSession, PendingStart, SessionId, SessionState, StartOutcome};
pub use stream::{StreamConfig, StreamProvider, VideoStream};
pub use window::{DedupKey, WindowDescriptor, WindowId};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Window catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Capture failed to start: {0}")]
    CaptureStartFailed(String),

    #[error("Frame decode failed: {0}")]
    FrameDecodeFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Session is {0}")]
    InvalidState(SessionState),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Capture stopped")]
    Stopped,
}

impl CaptureError {
    /// The underlying message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            CaptureError::CatalogUnavailable(msg)
            | CaptureError::CaptureStartFailed(msg)
            | CaptureError::FrameDecodeFailed(msg)
            | CaptureError::PermissionDenied(msg)
            | CaptureError::Platform(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(target_os = "windows")]
impl From<windows::core::Error> for CaptureError {
    fn from(err: windows::core::Error) -> Self {
        CaptureError::Platform(err.to_string())
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Rectangle in physical pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_strips_category() {
        let err = CaptureError::CatalogUnavailable("permission denied".into());
        assert_eq!(err.detail(), "permission denied");
        assert_eq!(err.to_string(), "Window catalog unavailable: permission denied");
    }

    #[test]
    fn rect_area_does_not_overflow() {
        let rect = Rect::new(0, 0, u32::MAX, 2);
        assert_eq!(rect.area(), u32::MAX as u64 * 2);
        assert!(Rect::new(10, 10, 5, 5).contains(12, 14));
        assert!(!Rect::new(10, 10, 5, 5).contains(15, 10));
    }
}

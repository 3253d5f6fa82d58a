//! Presentation layer for LivePiP
//!
//! A PiP surface mirrors one captured window. The controller owns the
//! surface and tracks pin and opacity state; platform surfaces live behind
//! [`SurfaceFactory`].

pub mod config;
pub mod controller;
pub mod surface;

#[cfg(target_os = "windows")]
pub mod win32;

pub use config::{fit_within, initial_frame, PresentationConfig};
pub use controller::{CloseNotifier, PresentationController, PLACEHOLDER_TEXT};
pub use surface::{
    ActionHandler, PresentationSurface, SurfaceAction, SurfaceCallbacks, SurfaceFactory, SurfaceId,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("Surface could not be created: {0}")]
    SurfaceUnavailable(String),

    #[error("Surface is closed")]
    Closed,

    #[error("Platform error: {0}")]
    Platform(String),
}

#[cfg(target_os = "windows")]
impl From<windows::core::Error> for OverlayError {
    fn from(err: windows::core::Error) -> Self {
        OverlayError::Platform(err.to_string())
    }
}

pub type OverlayResult<T> = Result<T, OverlayError>;

//! LivePiP application core
//!
//! Owns the session registry and the UI context that serialises every
//! trigger (hotkey, picker, surface close) through one event queue.

pub mod config;
pub mod context;
pub mod event;
pub mod logging;
pub mod platform;
pub mod registry;

#[cfg(test)]
mod testing;

pub use context::{Flow, UiContext, UiHandle};
pub use event::UiEvent;
pub use logging::init_logging;
pub use platform::Platform;
pub use registry::{RegistryError, RegistryResult, SessionRegistry, ToggleOutcome};

use capture::CaptureError;
use hotkey::HotkeyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Hotkey(#[from] HotkeyError),

    #[error("No configuration directory available; set {}", config::CONFIG_DIR_ENV)]
    NoConfigDir,

    #[error("LivePiP does not support {0}")]
    UnsupportedPlatform(&'static str),
}

pub type AppResult<T> = Result<T, AppError>;

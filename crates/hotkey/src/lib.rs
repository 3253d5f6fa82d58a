//! Global hotkey for LivePiP
//!
//! Matches key-downs against the active chord, learns a new chord on
//! request and persists it. The low-level keyboard hook lives in [`hook`].

pub mod chord;
pub mod matcher;
pub mod store;

#[cfg(target_os = "windows")]
pub mod hook;

pub use chord::{HotkeyConfig, KeyEvent, KeySink, Modifiers, DEFAULT_KEY_CODE, DEFAULT_MODIFIERS};
pub use matcher::{HotkeyMatcher, KeyOutcome, MatcherState};
pub use store::{load_or_default, HotkeyStore, JsonFileStore, MemoryStore};

#[cfg(target_os = "windows")]
pub use hook::KeyboardHook;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings file is corrupt: {0}")]
    Corrupt(String),

    #[error("Keyboard hook unavailable: {0}")]
    HookUnavailable(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

#[cfg(target_os = "windows")]
impl From<windows::core::Error> for HotkeyError {
    fn from(err: windows::core::Error) -> Self {
        HotkeyError::Platform(err.to_string())
    }
}

pub type HotkeyResult<T> = Result<T, HotkeyError>;

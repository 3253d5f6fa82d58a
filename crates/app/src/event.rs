//! Messages drained by the UI context

use capture::{StartOutcome, WindowDescriptor, WindowId};
use hotkey::KeyEvent;
use overlay::SurfaceAction;

/// Everything that may change registry or matcher state.
///
/// Producers on other threads only ever send these; the UI context is the
/// single consumer.
#[derive(Debug)]
pub enum UiEvent {
    /// Key-down from the global hook
    Key(KeyEvent),
    /// Picker or CLI asked to toggle a specific window
    Toggle(WindowDescriptor),
    /// Toggle whatever window is frontmost now
    ToggleFrontmost,
    BeginRebind,
    StartFinished(StartOutcome),
    /// A frame is waiting in the session's slot
    FrameReady(WindowId),
    /// The user closed the surface directly
    PresentationClosed(WindowId),
    SurfaceAction(WindowId, SurfaceAction),
    CloseAll,
    Shutdown,
}

//! Session registry: at most one (session, presentation) pair per window
//!
//! Only the UI context mutates the registry. Stream starts run on worker
//! threads and come back as [`UiEvent::StartFinished`]; stops are awaited
//! in place so a window is free to reopen as soon as its entry is gone.

use crate::UiEvent;
use capture::{
    CaptureError, CaptureSession, SessionId, SessionState, StartOutcome, StreamProvider,
    WindowDescriptor, WindowId,
};
use crossbeam_channel::Sender;
use overlay::{
    CloseNotifier, OverlayError, PresentationConfig, PresentationController, SurfaceAction,
    SurfaceCallbacks, SurfaceFactory,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Window {0} already has a live picture-in-picture")]
    AlreadyTracked(WindowId),

    #[error("Presentation failed: {0}")]
    Presentation(#[from] OverlayError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Opened,
    Closed,
}

struct Entry {
    session: CaptureSession,
    controller: PresentationController,
    showing_decode_warning: bool,
}

pub struct SessionRegistry {
    entries: HashMap<WindowId, Entry>,
    streams: Arc<dyn StreamProvider>,
    surfaces: Arc<dyn SurfaceFactory>,
    presentation: PresentationConfig,
    events: Sender<UiEvent>,
}

impl SessionRegistry {
    pub fn new(
        streams: Arc<dyn StreamProvider>,
        surfaces: Arc<dyn SurfaceFactory>,
        presentation: PresentationConfig,
        events: Sender<UiEvent>,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            streams,
            surfaces,
            presentation,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, window_id: WindowId) -> bool {
        self.entries.contains_key(&window_id)
    }

    pub fn tracked(&self) -> Vec<WindowId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn session_state(&self, window_id: WindowId) -> Option<SessionState> {
        self.entries.get(&window_id).map(|e| e.session.state())
    }

    pub fn session_id(&self, window_id: WindowId) -> Option<SessionId> {
        self.entries.get(&window_id).map(|e| e.session.id())
    }

    pub fn last_error(&self, window_id: WindowId) -> Option<CaptureError> {
        self.entries
            .get(&window_id)
            .and_then(|e| e.session.last_error().cloned())
    }

    /// Close the window's entry if it has one, otherwise open one.
    pub fn toggle(&mut self, window: &WindowDescriptor) -> RegistryResult<ToggleOutcome> {
        if self.close(window.id) {
            Ok(ToggleOutcome::Closed)
        } else {
            self.open(window)?;
            Ok(ToggleOutcome::Opened)
        }
    }

    /// Show a surface for `window` and start capturing in the background.
    ///
    /// Rejected while the window already has an entry.
    pub fn open(&mut self, window: &WindowDescriptor) -> RegistryResult<()> {
        if self.entries.contains_key(&window.id) {
            return Err(RegistryError::AlreadyTracked(window.id));
        }

        let window_id = window.id;
        let frames = self.events.clone();
        let mut session = CaptureSession::new(
            window,
            Arc::new(move || {
                let _ = frames.send(UiEvent::FrameReady(window_id));
            }),
        );

        let controller = PresentationController::open(
            self.surfaces.as_ref(),
            window,
            self.presentation.clone(),
            self.callbacks(window_id),
        )?;

        let pending = session.begin_start(window)?;
        let session_id = pending.session_id();

        self.entries.insert(
            window_id,
            Entry {
                session,
                controller,
                showing_decode_warning: false,
            },
        );
        info!(
            event = "app.registry.opened",
            window_id = %window_id,
            session_id = %session_id,
            title = %window.title
        );

        let streams = self.streams.clone();
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name(format!("capture-start-{}", window_id))
            .spawn(move || {
                let outcome = pending.run(streams.as_ref());
                let _ = events.send(UiEvent::StartFinished(outcome));
            });

        if let Err(e) = spawned {
            self.on_start_finished(StartOutcome {
                session_id,
                window_id,
                result: Err(CaptureError::CaptureStartFailed(e.to_string())),
            });
        }
        Ok(())
    }

    fn callbacks(&self, window_id: WindowId) -> SurfaceCallbacks {
        let closed = self.events.clone();
        let actions = self.events.clone();
        SurfaceCallbacks {
            on_close: CloseNotifier::new(
                window_id,
                Arc::new(move |id| {
                    let _ = closed.send(UiEvent::PresentationClosed(id));
                }),
            ),
            on_action: Arc::new(move |id, action| {
                let _ = actions.send(UiEvent::SurfaceAction(id, action));
            }),
        }
    }

    /// Close and forget the window's entry. Returns false if untracked.
    ///
    /// The stream is released before this returns.
    pub fn close(&mut self, window_id: WindowId) -> bool {
        let Some(mut entry) = self.entries.remove(&window_id) else {
            return false;
        };

        if let Err(e) = entry.controller.close() {
            warn!(event = "app.registry.surface_close_failed", window_id = %window_id, error = %e);
        }
        if let Err(e) = entry.session.stop() {
            warn!(event = "app.registry.stop_failed", window_id = %window_id, error = %e);
        }

        info!(
            event = "app.registry.closed",
            window_id = %window_id,
            session_id = %entry.session.id()
        );
        true
    }

    /// Close every entry, then any surface still open without one.
    pub fn close_all(&mut self) {
        let ids = self.tracked();
        let count = ids.len();
        for id in ids {
            self.close(id);
        }

        let mut swept = 0;
        for surface in self.surfaces.live_surfaces() {
            match self.surfaces.destroy(surface) {
                Ok(()) => swept += 1,
                Err(e) => warn!(event = "app.registry.sweep_failed", surface_id = %surface, error = %e),
            }
        }

        info!(event = "app.registry.closed_all", closed = count, swept);
    }

    /// The user closed a surface directly. Absent entries are ignored.
    pub fn on_presentation_closed(&mut self, window_id: WindowId) -> bool {
        let closed = self.close(window_id);
        if !closed {
            debug!(event = "app.registry.close_already_handled", window_id = %window_id);
        }
        closed
    }

    /// Apply a finished start; starts for sessions no longer tracked are
    /// stopped immediately.
    pub fn on_start_finished(&mut self, outcome: StartOutcome) {
        let window_id = outcome.window_id;

        let Some(entry) = self
            .entries
            .get_mut(&window_id)
            .filter(|e| e.session.id() == outcome.session_id)
        else {
            debug!(
                event = "app.registry.stale_start",
                window_id = %window_id,
                session_id = %outcome.session_id
            );
            if let Ok(mut stream) = outcome.result {
                if let Err(e) = stream.stop() {
                    warn!(event = "app.registry.stale_stop_failed", window_id = %window_id, error = %e);
                }
            }
            return;
        };

        match entry.session.finish_start(outcome) {
            // frames delivered while starting are still in the slot
            Ok(()) => self.on_frame_ready(window_id),
            Err(e) => {
                // entry stays so the error remains visible until the user closes it
                let message = format!("Capture failed: {}", e.detail());
                if let Err(e) = entry.controller.show_error(&message) {
                    debug!(event = "app.registry.status_failed", window_id = %window_id, error = %e);
                }
            }
        }
    }

    /// Move the pending frame of the window's session onto its surface.
    pub fn on_frame_ready(&mut self, window_id: WindowId) {
        let Some(entry) = self.entries.get_mut(&window_id) else {
            return;
        };
        let Entry {
            session,
            controller,
            showing_decode_warning,
        } = entry;

        if let Some(frame) = session.take_frame() {
            if let Err(e) = controller.present(frame) {
                debug!(event = "app.registry.present_failed", window_id = %window_id, error = %e);
            }
        }

        let decode_error = match session.last_error() {
            Some(CaptureError::FrameDecodeFailed(msg)) => Some(msg.clone()),
            _ => None,
        };
        let result = match (decode_error, *showing_decode_warning) {
            (Some(msg), false) => {
                *showing_decode_warning = true;
                controller.show_error(&msg)
            }
            (None, true) => {
                *showing_decode_warning = false;
                controller.clear_error()
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            debug!(event = "app.registry.status_failed", window_id = %window_id, error = %e);
        }
    }

    pub fn on_surface_action(&mut self, window_id: WindowId, action: SurfaceAction) {
        let Some(entry) = self.entries.get_mut(&window_id) else {
            return;
        };
        let result = match action {
            SurfaceAction::TogglePin => entry.controller.toggle_pin().map(|_| ()),
            SurfaceAction::AdjustOpacity(delta) => entry.controller.adjust_opacity(delta).map(|_| ()),
        };
        if let Err(e) = result {
            debug!(event = "app.registry.action_failed", window_id = %window_id, error = %e);
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.close_all();
        }
    }
}

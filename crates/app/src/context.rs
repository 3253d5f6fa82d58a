//! UI context: the single owner of registry and matcher state

use crate::{SessionRegistry, UiEvent};
use capture::{StreamProvider, WindowCatalog, WindowDescriptor};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use hotkey::{HotkeyMatcher, KeyEvent, KeyOutcome, KeySink};
use overlay::{PresentationConfig, SurfaceFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whether the loop keeps running after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Cloneable sender side of the UI context
#[derive(Clone)]
pub struct UiHandle {
    sender: Sender<UiEvent>,
}

impl UiHandle {
    pub fn send(&self, event: UiEvent) {
        if self.sender.send(event).is_err() {
            debug!(event = "app.context.send_after_exit");
        }
    }

    pub fn toggle(&self, window: WindowDescriptor) {
        self.send(UiEvent::Toggle(window));
    }

    pub fn toggle_frontmost(&self) {
        self.send(UiEvent::ToggleFrontmost);
    }

    pub fn begin_rebind(&self) {
        self.send(UiEvent::BeginRebind);
    }

    pub fn close_all(&self) {
        self.send(UiEvent::CloseAll);
    }

    pub fn shutdown(&self) {
        self.send(UiEvent::Shutdown);
    }

    /// Key sink for the platform hook
    pub fn key_sink(&self) -> KeySink {
        let sender = self.sender.clone();
        Arc::new(move |event: KeyEvent| {
            let _ = sender.send(UiEvent::Key(event));
        })
    }
}

pub struct UiContext {
    registry: SessionRegistry,
    catalog: WindowCatalog,
    matcher: HotkeyMatcher,
    sender: Sender<UiEvent>,
    events: Receiver<UiEvent>,
}

impl UiContext {
    pub fn new(
        catalog: WindowCatalog,
        streams: Arc<dyn StreamProvider>,
        surfaces: Arc<dyn SurfaceFactory>,
        matcher: HotkeyMatcher,
    ) -> Self {
        let (sender, events) = unbounded();
        let registry = SessionRegistry::new(
            streams,
            surfaces,
            PresentationConfig::default(),
            sender.clone(),
        );
        Self {
            registry,
            catalog,
            matcher,
            sender,
            events,
        }
    }

    pub fn handle(&self) -> UiHandle {
        UiHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &WindowCatalog {
        &self.catalog
    }

    pub fn matcher(&self) -> &HotkeyMatcher {
        &self.matcher
    }

    /// Drain events until [`UiEvent::Shutdown`]; closes everything on exit.
    pub fn run(mut self) {
        info!(event = "app.context.started", hotkey = %self.matcher.config());
        while let Ok(event) = self.events.recv() {
            if self.dispatch(event) == Flow::Exit {
                break;
            }
        }
        self.registry.close_all();
        info!(event = "app.context.stopped");
    }

    /// Handle at most one event, waiting up to `timeout`.
    pub fn poll(&mut self, timeout: Duration) -> Option<Flow> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(self.dispatch(event)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Flow::Exit),
        }
    }

    pub fn dispatch(&mut self, event: UiEvent) -> Flow {
        match event {
            UiEvent::Key(key) => self.on_key(&key),
            UiEvent::Toggle(window) => self.toggle(&window),
            UiEvent::ToggleFrontmost => self.toggle_frontmost(),
            UiEvent::BeginRebind => {
                self.matcher.begin_rebind();
            }
            UiEvent::StartFinished(outcome) => self.registry.on_start_finished(outcome),
            UiEvent::FrameReady(window_id) => self.registry.on_frame_ready(window_id),
            UiEvent::PresentationClosed(window_id) => {
                self.registry.on_presentation_closed(window_id);
            }
            UiEvent::SurfaceAction(window_id, action) => {
                self.registry.on_surface_action(window_id, action)
            }
            UiEvent::CloseAll => self.registry.close_all(),
            UiEvent::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    fn on_key(&mut self, key: &KeyEvent) {
        match self.matcher.handle_key_down(key) {
            KeyOutcome::Triggered => self.toggle_frontmost(),
            KeyOutcome::Rebound(config) => {
                info!(event = "app.context.hotkey_changed", chord = %config)
            }
            KeyOutcome::RebindCancelled | KeyOutcome::Ignored => {}
        }
    }

    fn toggle(&mut self, window: &WindowDescriptor) {
        match self.registry.toggle(window) {
            Ok(outcome) => debug!(event = "app.context.toggled", window_id = %window.id, ?outcome),
            Err(e) => warn!(event = "app.context.toggle_failed", window_id = %window.id, error = %e),
        }
    }

    fn toggle_frontmost(&mut self) {
        match self.catalog.frontmost_window() {
            Ok(Some(window)) => self.toggle(&window),
            Ok(None) => debug!(event = "app.context.no_frontmost_window"),
            Err(e) => warn!(event = "app.context.frontmost_failed", error = %e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use capture::{SessionState, WindowId};
    use hotkey::{HotkeyConfig, MatcherState, MemoryStore, Modifiers};
    use std::thread;
    use std::time::Instant;

    struct Harness {
        ctx: UiContext,
        source: Arc<FakeSource>,
        streams: Arc<FakeStreams>,
        surfaces: Arc<FakeSurfaces>,
    }

    fn harness(windows: Vec<WindowDescriptor>) -> Harness {
        let source = Arc::new(FakeSource::new(windows));
        let streams = Arc::new(FakeStreams::default());
        let surfaces = Arc::new(FakeSurfaces::default());
        let ctx = UiContext::new(
            WindowCatalog::with_self_pid(source.clone(), 1),
            streams.clone(),
            surfaces.clone(),
            HotkeyMatcher::new(Box::new(MemoryStore::new())),
        );
        Harness {
            ctx,
            source,
            streams,
            surfaces,
        }
    }

    fn pump_until(ctx: &mut UiContext, done: impl Fn(&UiContext) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done(ctx) {
                return true;
            }
            ctx.poll(Duration::from_millis(20));
        }
        done(ctx)
    }

    fn chord() -> KeyEvent {
        let config = HotkeyConfig::default();
        KeyEvent::new(config.key_code, config.modifiers)
    }

    #[test]
    fn hotkey_opens_then_closes_frontmost_window() {
        let mut h = harness(vec![
            window(7, "Report", "Writer", 50),
            window(8, "Inbox", "Mail", 60),
        ]);
        h.source.set_frontmost(Some(50));
        let id = WindowId(7);

        let handle = h.ctx.handle();
        handle.send(UiEvent::Key(chord()));
        assert!(pump_until(&mut h.ctx, |c| c.registry().contains(id)));
        assert_eq!(h.ctx.registry().len(), 1);
        assert!(pump_until(&mut h.ctx, |c| {
            c.registry().session_state(id) == Some(SessionState::Capturing)
        }));

        handle.send(UiEvent::Key(chord()));
        assert!(pump_until(&mut h.ctx, |c| c.registry().is_empty()));
        assert_eq!(h.streams.stops(), 1);
    }

    #[test]
    fn repeat_and_other_chords_do_nothing() {
        let mut h = harness(vec![window(7, "Report", "Writer", 50)]);
        h.source.set_frontmost(Some(50));

        h.ctx.dispatch(UiEvent::Key(chord().repeated()));
        h.ctx.dispatch(UiEvent::Key(KeyEvent::new(0x50, Modifiers::CONTROL)));
        assert!(h.ctx.registry().is_empty());
        assert_eq!(h.surfaces.created(), 0);
    }

    #[test]
    fn no_frontmost_window_is_a_no_op() {
        let mut h = harness(vec![window(7, "Report", "Writer", 50)]);
        h.source.set_frontmost(Some(99));
        h.ctx.dispatch(UiEvent::ToggleFrontmost);

        h.source.set_frontmost(None);
        h.ctx.dispatch(UiEvent::ToggleFrontmost);

        h.source.fail_with("permission denied");
        h.source.set_frontmost(Some(50));
        h.ctx.dispatch(UiEvent::ToggleFrontmost);

        assert!(h.ctx.registry().is_empty());
    }

    #[test]
    fn concurrent_toggles_never_double_track() {
        let w = window(21, "Dashboard", "Metrics", 70);
        let mut h = harness(vec![w.clone()]);

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let handle = h.ctx.handle();
                let w = w.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        handle.toggle(w.clone());
                    }
                })
            })
            .collect();
        for s in senders {
            s.join().unwrap();
        }

        // toggles and late start outcomes, until the queue goes quiet
        while h.ctx.poll(Duration::from_millis(200)).is_some() {
            assert!(h.ctx.registry().len() <= 1);
        }

        // twenty toggles of one window
        assert_eq!(h.ctx.registry().tracked(), Vec::<WindowId>::new());
        assert_eq!(h.surfaces.created(), 10);
        assert!(h.surfaces.live_surfaces().is_empty());
    }

    #[test]
    fn rebind_through_events() {
        let mut h = harness(vec![window(7, "Report", "Writer", 50)]);
        h.source.set_frontmost(Some(50));

        h.ctx.dispatch(UiEvent::BeginRebind);
        assert_eq!(h.ctx.matcher().state(), MatcherState::Rebinding);

        let learned = KeyEvent::new(0x4B, Modifiers::SHIFT | Modifiers::COMMAND);
        h.ctx.dispatch(UiEvent::Key(learned));
        assert_eq!(
            h.ctx.matcher().config(),
            HotkeyConfig::new(0x4B, Modifiers::SHIFT | Modifiers::COMMAND)
        );
        // learning does not toggle
        assert!(h.ctx.registry().is_empty());

        h.ctx.dispatch(UiEvent::Key(learned));
        assert!(h.ctx.registry().contains(WindowId(7)));
    }

    #[test]
    fn shutdown_exits_and_close_all_empties() {
        let mut h = harness(vec![window(7, "Report", "Writer", 50)]);
        let handle = h.ctx.handle();

        handle.toggle(window(7, "Report", "Writer", 50));
        handle.toggle(window(8, "Inbox", "Mail", 60));
        handle.close_all();
        handle.shutdown();

        let mut flows = Vec::new();
        while let Some(flow) = h.ctx.poll(Duration::from_millis(200)) {
            flows.push(flow);
            if flow == Flow::Exit {
                break;
            }
        }
        assert_eq!(flows.last(), Some(&Flow::Exit));
        assert!(h.ctx.registry().is_empty());
        assert!(h.surfaces.live_surfaces().is_empty());
    }
}

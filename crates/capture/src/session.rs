//! Capture session: one live stream bound to one source window
//!
//! ```text
//! Idle -> Starting -> Capturing -> Stopping -> Stopped
//!            \__________________________________/
//!                     (start failed)
//! ```
//!
//! A stopped session is never restarted; open a new one instead.

use crate::{
    latest_frame_channel, CaptureError, CaptureResult, FrameData, FrameReceiver, FrameSink,
    FrameWaker, StreamConfig, StreamProvider, VideoStream, WindowDescriptor, WindowId,
};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Consecutive undecodable frames before the session reports an error
pub const DECODE_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Capturing,
    Stopping,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Capturing => "capturing",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// Start work detached from the session so it can run off the UI context
pub struct PendingStart {
    session_id: SessionId,
    window: WindowDescriptor,
    config: StreamConfig,
    sink: FrameSink,
}

impl PendingStart {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open the platform stream. Blocks until it starts or fails.
    ///
    /// If the session was stopped while the stream was opening, the new
    /// stream is stopped here before any frame reaches the consumer.
    pub fn run(self, provider: &dyn StreamProvider) -> StartOutcome {
        let window_id = self.window.id;

        if !self.sink.is_active() {
            return StartOutcome {
                session_id: self.session_id,
                window_id,
                result: Err(CaptureError::Stopped),
            };
        }

        let result = match provider.open(&self.window, &self.config, self.sink.clone()) {
            Ok(mut stream) if !self.sink.is_active() => {
                info!(
                    event = "capture.session.start_cancelled",
                    session_id = %self.session_id,
                    window_id = %window_id
                );
                if let Err(e) = stream.stop() {
                    warn!(event = "capture.session.cancel_stop_failed", error = %e);
                }
                Err(CaptureError::Stopped)
            }
            other => other,
        };

        StartOutcome {
            session_id: self.session_id,
            window_id,
            result,
        }
    }
}

/// Completion of a [`PendingStart`], reported back to the owning context
pub struct StartOutcome {
    pub session_id: SessionId,
    pub window_id: WindowId,
    pub result: CaptureResult<Box<dyn VideoStream>>,
}

impl fmt::Debug for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOutcome")
            .field("session_id", &self.session_id)
            .field("window_id", &self.window_id)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

/// Live binding between a source window and its stream
pub struct CaptureSession {
    id: SessionId,
    source_window_id: WindowId,
    state: SessionState,
    stream: Option<Box<dyn VideoStream>>,
    sink: FrameSink,
    frames: FrameReceiver,
    latest_frame: Option<FrameData>,
    last_error: Option<CaptureError>,
    decode_failures: u32,
}

impl CaptureSession {
    /// Create an idle session for `window`.
    ///
    /// `waker` runs on the producer thread whenever a new frame is pending.
    pub fn new(window: &WindowDescriptor, waker: FrameWaker) -> Self {
        let config = StreamConfig::for_window(window);
        let (sink, frames) = latest_frame_channel(config.min_frame_interval, waker);
        Self {
            id: SessionId::new(),
            source_window_id: window.id,
            state: SessionState::Idle,
            stream: None,
            sink,
            frames,
            latest_frame: None,
            last_error: None,
            decode_failures: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source_window_id(&self) -> WindowId {
        self.source_window_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == SessionState::Capturing
    }

    pub fn latest_frame(&self) -> Option<&FrameData> {
        self.latest_frame.as_ref()
    }

    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    /// Move to `Starting` and hand out the work needed to open the stream.
    pub fn begin_start(&mut self, window: &WindowDescriptor) -> CaptureResult<PendingStart> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::InvalidState(self.state));
        }
        if window.id != self.source_window_id {
            return Err(CaptureError::CaptureStartFailed(format!(
                "session is bound to window {}, not {}",
                self.source_window_id, window.id
            )));
        }

        let config = StreamConfig::for_window(window);
        debug!(
            event = "capture.session.start_requested",
            session_id = %self.id,
            window_id = %window.id,
            width = config.width,
            height = config.height
        );

        self.state = SessionState::Starting;
        self.last_error = None;
        self.sink.activate();

        Ok(PendingStart {
            session_id: self.id,
            window: window.clone(),
            config,
            sink: self.sink.clone(),
        })
    }

    /// Apply the result of a [`PendingStart`].
    pub fn finish_start(&mut self, outcome: StartOutcome) -> CaptureResult<()> {
        if outcome.session_id != self.id {
            return Err(CaptureError::InvalidState(self.state));
        }

        match (self.state, outcome.result) {
            (SessionState::Starting, Ok(stream)) => {
                self.stream = Some(stream);
                self.state = SessionState::Capturing;
                info!(
                    event = "capture.session.capturing",
                    session_id = %self.id,
                    window_id = %self.source_window_id
                );
                Ok(())
            }
            (SessionState::Starting, Err(e)) => {
                let err = CaptureError::CaptureStartFailed(e.detail());
                warn!(
                    event = "capture.session.start_failed",
                    session_id = %self.id,
                    window_id = %self.source_window_id,
                    error = %err
                );
                self.sink.close();
                self.state = SessionState::Stopped;
                self.last_error = Some(err.clone());
                Err(err)
            }
            (SessionState::Stopping | SessionState::Stopped, Ok(mut stream)) => {
                // closed while starting
                debug!(event = "capture.session.late_stream_stopped", session_id = %self.id);
                stream.stop()
            }
            (SessionState::Stopping | SessionState::Stopped, Err(_)) => Ok(()),
            (state, _) => Err(CaptureError::InvalidState(state)),
        }
    }

    /// Start on the calling thread.
    pub fn start(&mut self, provider: &dyn StreamProvider, window: &WindowDescriptor) -> CaptureResult<()> {
        let pending = self.begin_start(window)?;
        let outcome = pending.run(provider);
        self.finish_start(outcome)
    }

    /// Stop and release the stream. No-op when idle or already stopped.
    ///
    /// The session is `Stopped` on return even if the platform reported an
    /// error while releasing.
    pub fn stop(&mut self) -> CaptureResult<()> {
        match self.state {
            SessionState::Idle | SessionState::Stopped => return Ok(()),
            SessionState::Starting | SessionState::Capturing | SessionState::Stopping => {}
        }

        self.state = SessionState::Stopping;
        self.sink.close();

        let result = match self.stream.take() {
            Some(mut stream) => stream.stop(),
            None => Ok(()),
        };

        self.frames.clear();
        self.latest_frame = None;
        self.state = SessionState::Stopped;

        match &result {
            Ok(()) => info!(
                event = "capture.session.stopped",
                session_id = %self.id,
                window_id = %self.source_window_id
            ),
            Err(e) => warn!(
                event = "capture.session.stop_failed",
                session_id = %self.id,
                error = %e
            ),
        }
        result
    }

    /// Take the pending frame, decode it and make it the latest frame.
    ///
    /// While `Starting` a pending frame stays in the slot until the start
    /// is confirmed. Undecodable frames are dropped; a run of them is
    /// reported through `last_error` without stopping the session.
    pub fn take_frame(&mut self) -> Option<&FrameData> {
        match self.state {
            SessionState::Capturing => {}
            SessionState::Starting => return None,
            _ => {
                self.frames.clear();
                return None;
            }
        }

        let raw = self.frames.take()?;
        match raw.decode() {
            Ok(frame) => {
                self.decode_failures = 0;
                if matches!(self.last_error, Some(CaptureError::FrameDecodeFailed(_))) {
                    self.last_error = None;
                }
                self.latest_frame = Some(frame);
                self.latest_frame.as_ref()
            }
            Err(e) => {
                self.decode_failures += 1;
                debug!(
                    event = "capture.session.frame_dropped",
                    session_id = %self.id,
                    consecutive = self.decode_failures,
                    error = %e
                );
                if self.decode_failures >= DECODE_FAILURE_THRESHOLD {
                    if self.decode_failures == DECODE_FAILURE_THRESHOLD {
                        warn!(
                            event = "capture.session.decode_failing",
                            session_id = %self.id,
                            consecutive = self.decode_failures
                        );
                    }
                    self.last_error = Some(CaptureError::FrameDecodeFailed(format!(
                        "{} consecutive frames could not be decoded",
                        self.decode_failures
                    )));
                }
                None
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawFrame, Rect};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn window(id: u64) -> WindowDescriptor {
        WindowDescriptor {
            id: WindowId(id),
            title: "Slides".into(),
            owner_pid: 5,
            owner_app_name: "Deck".into(),
            bounds: Rect::new(0, 0, 400, 300),
        }
    }

    struct TestStream {
        stops: Arc<AtomicUsize>,
    }

    impl VideoStream for TestStream {
        fn stop(&mut self) -> CaptureResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestProvider {
        fail_with: Option<String>,
        first_frame: Option<RawFrame>,
        stops: Arc<AtomicUsize>,
        sink: Mutex<Option<FrameSink>>,
        opened: AtomicUsize,
    }

    impl StreamProvider for TestProvider {
        fn open(
            &self,
            _window: &WindowDescriptor,
            _config: &StreamConfig,
            sink: FrameSink,
        ) -> CaptureResult<Box<dyn VideoStream>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = &self.fail_with {
                return Err(CaptureError::PermissionDenied(msg.clone()));
            }
            if let Some(frame) = &self.first_frame {
                sink.push(frame.clone());
            }
            *self.sink.lock() = Some(sink);
            Ok(Box::new(TestStream {
                stops: self.stops.clone(),
            }))
        }
    }

    fn session(w: &WindowDescriptor) -> CaptureSession {
        CaptureSession::new(w, Arc::new(|| {}))
    }

    #[test]
    fn start_then_stop() {
        let w = window(1);
        let provider = TestProvider::default();
        let mut s = session(&w);
        assert_eq!(s.state(), SessionState::Idle);

        s.start(&provider, &w).unwrap();
        assert!(s.is_capturing());

        s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let w = window(1);
        let provider = TestProvider::default();
        let mut s = session(&w);
        assert!(s.stop().is_ok());
        assert_eq!(s.state(), SessionState::Idle);

        s.start(&provider, &w).unwrap();
        assert!(s.stop().is_ok());
        assert!(s.stop().is_ok());
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_start_ends_stopped_with_error() {
        let w = window(1);
        let provider = TestProvider {
            fail_with: Some("user declined screen recording".into()),
            ..Default::default()
        };
        let mut s = session(&w);
        let err = s.start(&provider, &w).unwrap_err();

        assert_eq!(
            err,
            CaptureError::CaptureStartFailed("user declined screen recording".into())
        );
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(s.last_error(), Some(&err));
    }

    #[test]
    fn start_twice_is_rejected() {
        let w = window(1);
        let provider = TestProvider::default();
        let mut s = session(&w);
        s.start(&provider, &w).unwrap();
        assert_eq!(
            s.start(&provider, &w).unwrap_err(),
            CaptureError::InvalidState(SessionState::Capturing)
        );

        s.stop().unwrap();
        assert!(s.start(&provider, &w).is_err());
    }

    #[test]
    fn stop_while_starting_stops_late_stream() {
        let w = window(1);
        let provider = TestProvider::default();
        let mut s = session(&w);

        let pending = s.begin_start(&w).unwrap();
        assert_eq!(s.state(), SessionState::Starting);
        s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Stopped);

        // start never reaches the provider once cancelled
        let outcome = pending.run(&provider);
        assert!(matches!(outcome.result, Err(CaptureError::Stopped)));
        assert_eq!(provider.opened.load(Ordering::SeqCst), 0);
        s.finish_start(outcome).unwrap();
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[test]
    fn stream_opened_after_close_is_stopped_by_finish() {
        let w = window(1);
        let provider = TestProvider::default();
        let mut s = session(&w);

        let pending = s.begin_start(&w).unwrap();
        let outcome = pending.run(&provider);
        assert!(outcome.result.is_ok());

        s.stop().unwrap();
        s.finish_start(outcome).unwrap();
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frames_replace_latest_and_decode_failures_escalate() {
        let w = window(1);
        let provider = TestProvider::default();
        let mut s = session(&w);
        s.start(&provider, &w).unwrap();
        let sink = provider.sink.lock().clone().unwrap();

        sink.push(RawFrame::bgra(vec![9; 16], 2, 2));
        assert!(s.take_frame().is_some());
        assert_eq!(s.latest_frame().unwrap().width(), 2);

        for i in 1..=3 {
            // wait out the frame pacing
            std::thread::sleep(std::time::Duration::from_millis(40));
            assert!(sink.push(RawFrame::bgra(vec![0; 3], 2, 2)));
            assert!(s.take_frame().is_none());
            if i < 3 {
                assert!(s.last_error().is_none());
            }
        }
        assert!(matches!(s.last_error(), Some(CaptureError::FrameDecodeFailed(_))));
        assert!(s.is_capturing());
        // previous good frame is still shown
        assert!(s.latest_frame().is_some());

        std::thread::sleep(std::time::Duration::from_millis(40));
        sink.push(RawFrame::bgra(vec![1; 16], 2, 2));
        assert!(s.take_frame().is_some());
        assert!(s.last_error().is_none());

        s.stop().unwrap();
        assert!(s.latest_frame().is_none());
        assert!(!sink.push(RawFrame::bgra(vec![1; 16], 2, 2)));
    }

    #[test]
    fn frame_delivered_before_confirmation_is_kept() {
        let w = window(1);
        let provider = TestProvider {
            first_frame: Some(RawFrame::bgra(vec![7; 16], 2, 2)),
            ..Default::default()
        };
        let mut s = session(&w);

        let pending = s.begin_start(&w).unwrap();
        let outcome = pending.run(&provider);
        // the frame is already waiting before the start is applied
        assert!(s.take_frame().is_none());

        s.finish_start(outcome).unwrap();
        assert!(s.is_capturing());
        assert_eq!(s.take_frame().map(|f| f.width()), Some(2));
    }

    #[test]
    fn wrong_window_is_rejected() {
        let w = window(1);
        let mut s = session(&w);
        assert!(s.begin_start(&window(2)).is_err());
        assert_eq!(s.state(), SessionState::Idle);
    }
}

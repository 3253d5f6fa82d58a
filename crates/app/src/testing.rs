//! In-process fakes for the platform boundaries

use capture::{
    CaptureError, CaptureResult, FrameData, FrameSink, RawFrame, Rect, StreamConfig,
    StreamProvider, VideoStream, WindowDescriptor, WindowId, WindowSource,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use overlay::{
    OverlayResult, PresentationConfig, PresentationSurface, SurfaceAction, SurfaceCallbacks,
    SurfaceFactory, SurfaceId,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn window(id: u64, title: &str, app: &str, pid: u32) -> WindowDescriptor {
    WindowDescriptor {
        id: WindowId(id),
        title: title.into(),
        owner_pid: pid,
        owner_app_name: app.into(),
        bounds: Rect::new(0, 0, 800, 600),
    }
}

pub fn bgra_frame(width: u32, height: u32) -> RawFrame {
    RawFrame::bgra(vec![0x80; (width * height * 4) as usize], width, height)
}

pub struct FakeSource {
    windows: Mutex<Vec<WindowDescriptor>>,
    frontmost: Mutex<Option<u32>>,
    failure: Mutex<Option<String>>,
}

impl FakeSource {
    pub fn new(windows: Vec<WindowDescriptor>) -> Self {
        Self {
            windows: Mutex::new(windows),
            frontmost: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }

    pub fn set_frontmost(&self, pid: Option<u32>) {
        *self.frontmost.lock() = pid;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.into());
    }
}

impl WindowSource for FakeSource {
    fn windows(&self) -> CaptureResult<Vec<WindowDescriptor>> {
        if let Some(msg) = self.failure.lock().clone() {
            return Err(CaptureError::Platform(msg));
        }
        Ok(self.windows.lock().clone())
    }

    fn frontmost_pid(&self) -> Option<u32> {
        *self.frontmost.lock()
    }
}

struct FakeStream {
    stops: Arc<AtomicUsize>,
}

impl VideoStream for FakeStream {
    fn stop(&mut self) -> CaptureResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeStreams {
    fail_with: Option<String>,
    first_frame: Option<RawFrame>,
    gate: Option<(Sender<()>, Receiver<()>)>,
    opened_tx: Sender<()>,
    opened_rx: Receiver<()>,
    stops: Arc<AtomicUsize>,
    sinks: Mutex<HashMap<WindowId, FrameSink>>,
}

impl Default for FakeStreams {
    fn default() -> Self {
        let (opened_tx, opened_rx) = unbounded();
        Self {
            fail_with: None,
            first_frame: None,
            gate: None,
            opened_tx,
            opened_rx,
            stops: Arc::new(AtomicUsize::new(0)),
            sinks: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeStreams {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// `open` delivers `frame` before reporting the stream as started
    pub fn delivering_early(frame: RawFrame) -> Self {
        Self {
            first_frame: Some(frame),
            ..Self::default()
        }
    }

    /// `open` blocks until [`FakeStreams::release`]
    pub fn gated() -> Self {
        Self {
            gate: Some(bounded(1)),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some((tx, _)) = &self.gate {
            let _ = tx.send(());
        }
    }

    pub fn wait_for_open(&self, timeout: Duration) -> bool {
        self.opened_rx.recv_timeout(timeout).is_ok()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn sink_for(&self, id: WindowId) -> Option<FrameSink> {
        self.sinks.lock().get(&id).cloned()
    }
}

impl StreamProvider for FakeStreams {
    fn open(
        &self,
        window: &WindowDescriptor,
        _config: &StreamConfig,
        sink: FrameSink,
    ) -> CaptureResult<Box<dyn VideoStream>> {
        if let Some(frame) = &self.first_frame {
            sink.push(frame.clone());
        }
        self.sinks.lock().insert(window.id, sink);
        let _ = self.opened_tx.send(());

        if let Some((_, rx)) = &self.gate {
            let _ = rx.recv_timeout(Duration::from_secs(5));
        }
        if let Some(msg) = &self.fail_with {
            return Err(CaptureError::PermissionDenied(msg.clone()));
        }
        Ok(Box::new(FakeStream {
            stops: self.stops.clone(),
        }))
    }
}

#[derive(Default)]
struct SurfaceLog {
    next_id: u64,
    live: BTreeSet<SurfaceId>,
    by_window: HashMap<WindowId, (SurfaceId, SurfaceCallbacks)>,
    created: usize,
    presented: usize,
    statuses: Vec<Option<String>>,
    floating: Option<bool>,
    opacity: Option<f32>,
}

#[derive(Default)]
pub struct FakeSurfaces {
    log: Arc<Mutex<SurfaceLog>>,
}

impl FakeSurfaces {
    pub fn created(&self) -> usize {
        self.log.lock().created
    }

    pub fn presented(&self) -> usize {
        self.log.lock().presented
    }

    /// Most recent status line, `None` once cleared
    pub fn last_status(&self) -> Option<String> {
        self.log.lock().statuses.last().cloned().flatten()
    }

    pub fn floating(&self) -> Option<bool> {
        self.log.lock().floating
    }

    pub fn opacity(&self) -> Option<f32> {
        self.log.lock().opacity
    }

    /// Close the window's surface the way a user click would.
    pub fn user_close(&self, window_id: WindowId) -> bool {
        let target = {
            let mut log = self.log.lock();
            let found = log.by_window.get(&window_id).cloned();
            if let Some((id, _)) = &found {
                log.live.remove(id);
            }
            found
        };
        match target {
            Some((_, callbacks)) => callbacks.on_close.notify(),
            None => false,
        }
    }

    pub fn gesture(&self, window_id: WindowId, action: SurfaceAction) {
        let callbacks = self.log.lock().by_window.get(&window_id).map(|(_, c)| c.clone());
        if let Some(callbacks) = callbacks {
            (callbacks.on_action)(window_id, action);
        }
    }

    /// A live surface nobody tracks
    pub fn leak_orphan(&self) -> SurfaceId {
        let mut log = self.log.lock();
        log.next_id += 1;
        let id = SurfaceId(log.next_id);
        log.live.insert(id);
        id
    }
}

struct FakeSurface {
    id: SurfaceId,
    log: Arc<Mutex<SurfaceLog>>,
}

impl PresentationSurface for FakeSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn show(&mut self, _frame: Rect) -> OverlayResult<()> {
        Ok(())
    }

    fn present(&mut self, _frame: &FrameData) -> OverlayResult<()> {
        self.log.lock().presented += 1;
        Ok(())
    }

    fn show_status(&mut self, text: Option<&str>) -> OverlayResult<()> {
        self.log.lock().statuses.push(text.map(String::from));
        Ok(())
    }

    fn set_floating(&mut self, floating: bool) -> OverlayResult<()> {
        self.log.lock().floating = Some(floating);
        Ok(())
    }

    fn set_opacity(&mut self, opacity: f32) -> OverlayResult<()> {
        self.log.lock().opacity = Some(opacity);
        Ok(())
    }

    fn close(&mut self) -> OverlayResult<()> {
        self.log.lock().live.remove(&self.id);
        Ok(())
    }
}

impl SurfaceFactory for FakeSurfaces {
    fn create(
        &self,
        source: &WindowDescriptor,
        _config: &PresentationConfig,
        callbacks: SurfaceCallbacks,
    ) -> OverlayResult<Box<dyn PresentationSurface>> {
        let mut log = self.log.lock();
        log.next_id += 1;
        log.created += 1;
        let id = SurfaceId(log.next_id);
        log.live.insert(id);
        log.by_window.insert(source.id, (id, callbacks));
        Ok(Box::new(FakeSurface {
            id,
            log: self.log.clone(),
        }))
    }

    fn work_area(&self) -> Rect {
        Rect::new(0, 0, 1440, 900)
    }

    fn live_surfaces(&self) -> Vec<SurfaceId> {
        self.log.lock().live.iter().copied().collect()
    }

    fn destroy(&self, id: SurfaceId) -> OverlayResult<()> {
        self.log.lock().live.remove(&id);
        Ok(())
    }
}

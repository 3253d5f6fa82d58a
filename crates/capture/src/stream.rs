//! Platform video stream boundary

use crate::{CaptureResult, FrameSink, WindowDescriptor};
use std::time::Duration;

/// Upper bound on delivered frames per second
pub const TARGET_FPS: u32 = 30;

/// Undelivered frames the platform may buffer
pub const QUEUE_DEPTH: u32 = 5;

/// Capture at twice the logical size to match high-density displays
pub const BACKING_SCALE: u32 = 2;

/// Stream parameters for one source window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub min_frame_interval: Duration,
    pub queue_depth: u32,
    pub shows_cursor: bool,
    pub captures_audio: bool,
}

impl StreamConfig {
    pub fn for_window(window: &WindowDescriptor) -> Self {
        Self {
            width: window.width() * BACKING_SCALE,
            height: window.height() * BACKING_SCALE,
            min_frame_interval: Duration::from_secs(1) / TARGET_FPS,
            queue_depth: QUEUE_DEPTH,
            shows_cursor: true,
            captures_audio: false,
        }
    }
}

/// A running platform stream
pub trait VideoStream: Send {
    /// Stop delivery and release the platform resource.
    ///
    /// Must not return before the resource is released.
    fn stop(&mut self) -> CaptureResult<()>;
}

/// Creates platform streams for single windows
pub trait StreamProvider: Send + Sync {
    /// Open a stream and block until it has started delivering.
    ///
    /// Frames go to `sink` from whatever thread the platform uses.
    fn open(
        &self,
        window: &WindowDescriptor,
        config: &StreamConfig,
        sink: FrameSink,
    ) -> CaptureResult<Box<dyn VideoStream>>;
}

/// Pull everything a platform queue holds and keep only the newest item.
///
/// Older items go to `discard` so the platform can reuse their buffers.
/// At most `limit` items are pulled, so a producer that refills the queue
/// while it drains cannot hold the caller forever.
pub fn drain_latest<T>(
    limit: usize,
    mut next: impl FnMut() -> Option<T>,
    mut discard: impl FnMut(T),
) -> Option<T> {
    let mut newest = None;
    for _ in 0..limit {
        let Some(item) = next() else {
            break;
        };
        if let Some(older) = newest.replace(item) {
            discard(older);
        }
    }
    newest
}

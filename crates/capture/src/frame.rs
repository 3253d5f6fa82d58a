//! Frame hand-off from stream producers to the presentation context
//!
//! A single-slot, latest-value-wins channel: producers overwrite the slot,
//! the session takes whatever is newest. There is never a backlog.

use crate::{CaptureError, CaptureResult};
use image::{ImageBuffer, RgbaImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Layout of raw frame bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
}

/// Undecoded buffer as delivered by the platform stream
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including padding
    pub stride: usize,
    pub format: PixelFormat,
    pub timestamp: Instant,
}

impl RawFrame {
    /// Tightly packed BGRA frame
    pub fn bgra(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            stride: width as usize * 4,
            format: PixelFormat::Bgra8,
            timestamp: Instant::now(),
        }
    }

    /// Strip row padding and convert to RGBA.
    pub fn decode(self) -> CaptureResult<FrameData> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::FrameDecodeFailed(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }

        let row_bytes = self.width as usize * 4;
        if self.stride < row_bytes {
            return Err(CaptureError::FrameDecodeFailed(format!(
                "stride {} shorter than row {}",
                self.stride, row_bytes
            )));
        }

        let needed = self.stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(CaptureError::FrameDecodeFailed(format!(
                "buffer holds {} bytes, {}x{} needs {}",
                self.data.len(),
                self.width,
                self.height,
                needed
            )));
        }

        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        for row in self.data.chunks(self.stride).take(self.height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        if self.format == PixelFormat::Bgra8 {
            for chunk in pixels.chunks_exact_mut(4) {
                chunk.swap(0, 2);
            }
        }

        let image: RgbaImage = ImageBuffer::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| CaptureError::FrameDecodeFailed("pixel buffer size mismatch".into()))?;

        Ok(FrameData {
            image: Arc::new(image),
            timestamp: self.timestamp,
        })
    }
}

/// Decoded frame, cheap to clone
#[derive(Debug, Clone)]
pub struct FrameData {
    pub image: Arc<RgbaImage>,
    pub timestamp: Instant,
}

impl FrameData {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// BGRA copy for GDI blitting
    pub fn to_bgra(&self) -> Vec<u8> {
        let mut data = self.image.as_raw().clone();
        for chunk in data.chunks_exact_mut(4) {
            chunk.swap(0, 2);
        }
        data
    }
}

/// Wakes the presentation context when the slot goes from empty to full
pub type FrameWaker = Arc<dyn Fn() + Send + Sync>;

struct Slot {
    frame: Mutex<Option<RawFrame>>,
    last_accepted: Mutex<Option<Instant>>,
    active: AtomicBool,
}

/// Producer half; handed to the platform stream
#[derive(Clone)]
pub struct FrameSink {
    slot: Arc<Slot>,
    min_interval: Duration,
    waker: FrameWaker,
}

/// Consumer half; owned by the capture session
pub struct FrameReceiver {
    slot: Arc<Slot>,
}

/// Create a latest-value-wins frame channel.
///
/// The sink starts inactive and drops everything until [`FrameSink::activate`].
pub fn latest_frame_channel(min_interval: Duration, waker: FrameWaker) -> (FrameSink, FrameReceiver) {
    let slot = Arc::new(Slot {
        frame: Mutex::new(None),
        last_accepted: Mutex::new(None),
        active: AtomicBool::new(false),
    });

    (
        FrameSink {
            slot: slot.clone(),
            min_interval,
            waker,
        },
        FrameReceiver { slot },
    )
}

impl FrameSink {
    /// Offer a frame. Returns false if it was dropped.
    pub fn push(&self, frame: RawFrame) -> bool {
        if !self.is_active() {
            return false;
        }

        {
            let mut last = self.slot.last_accepted.lock();
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.min_interval {
                    return false;
                }
            }
            *last = Some(now);
        }

        let was_empty = self.slot.frame.lock().replace(frame).is_none();
        if was_empty {
            (self.waker)();
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::SeqCst)
    }

    pub fn activate(&self) {
        self.slot.active.store(true, Ordering::SeqCst);
    }

    /// Reject all further frames and drop any pending one
    pub fn close(&self) {
        self.slot.active.store(false, Ordering::SeqCst);
        self.slot.frame.lock().take();
    }
}

impl FrameReceiver {
    /// Take the newest pending frame, if any
    pub fn take(&self) -> Option<RawFrame> {
        self.slot.frame.lock().take()
    }

    pub fn clear(&self) {
        self.slot.frame.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_channel(min_interval: Duration) -> (FrameSink, FrameReceiver, Arc<AtomicUsize>) {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let (sink, rx) = latest_frame_channel(
            min_interval,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (sink, rx, wakes)
    }

    fn solid(width: u32, height: u32, bgra: [u8; 4]) -> RawFrame {
        let data = bgra.repeat((width * height) as usize);
        RawFrame::bgra(data, width, height)
    }

    #[test]
    fn decode_swaps_channels_and_strips_padding() {
        // 2x2, stride 12 (4 bytes padding per row)
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend_from_slice(&[1, 2, 3, 255, 4, 5, 6, 255]);
            data.extend_from_slice(&[0xEE; 4]);
        }
        let raw = RawFrame {
            data,
            width: 2,
            height: 2,
            stride: 12,
            format: PixelFormat::Bgra8,
            timestamp: Instant::now(),
        };

        let frame = raw.decode().unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.image.get_pixel(0, 0).0, [3, 2, 1, 255]);
        assert_eq!(frame.image.get_pixel(1, 1).0, [6, 5, 4, 255]);
        assert_eq!(&frame.to_bgra()[..4], &[1, 2, 3, 255]);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        let raw = RawFrame::bgra(vec![0; 10], 4, 4);
        assert!(matches!(raw.decode(), Err(CaptureError::FrameDecodeFailed(_))));

        let empty = RawFrame::bgra(Vec::new(), 0, 0);
        assert!(empty.decode().is_err());
    }

    #[test]
    fn inactive_sink_drops_frames() {
        let (sink, rx, wakes) = counting_channel(Duration::ZERO);
        assert!(!sink.push(solid(1, 1, [0; 4])));
        assert!(rx.take().is_none());
        assert_eq!(wakes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn latest_frame_wins_and_wakes_once() {
        let (sink, rx, wakes) = counting_channel(Duration::ZERO);
        sink.activate();

        assert!(sink.push(solid(1, 1, [1, 0, 0, 255])));
        assert!(sink.push(solid(1, 1, [2, 0, 0, 255])));
        assert!(sink.push(solid(1, 1, [3, 0, 0, 255])));
        assert_eq!(wakes.load(Ordering::SeqCst), 1);

        let frame = rx.take().unwrap();
        assert_eq!(frame.data[0], 3);
        assert!(rx.take().is_none());

        sink.push(solid(1, 1, [4, 0, 0, 255]));
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn frames_faster_than_cap_are_dropped() {
        let (sink, rx, _) = counting_channel(Duration::from_secs(60));
        sink.activate();
        assert!(sink.push(solid(1, 1, [1, 0, 0, 255])));
        assert!(!sink.push(solid(1, 1, [2, 0, 0, 255])));
        assert_eq!(rx.take().unwrap().data[0], 1);
    }

    #[test]
    fn close_discards_pending_frame() {
        let (sink, rx, _) = counting_channel(Duration::ZERO);
        sink.activate();
        sink.push(solid(1, 1, [0; 4]));
        sink.close();
        assert!(rx.take().is_none());
        assert!(!sink.push(solid(1, 1, [0; 4])));
    }
}

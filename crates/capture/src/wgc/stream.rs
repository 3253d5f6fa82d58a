//! Windows Graphics Capture stream
//!
//! Each stream owns a pump thread. All WinRT objects are created, polled and
//! closed on that thread; the handle only carries the stop flag.

use super::{hwnd_from_id, D3D11Device};
use crate::stream::drain_latest;
use crate::{
    CaptureError, CaptureResult, FrameSink, PixelFormat, RawFrame, StreamConfig, StreamProvider,
    VideoStream, WindowDescriptor,
};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use windows::{
    Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession},
    Graphics::DirectX::Direct3D11::IDirect3DSurface,
    Graphics::DirectX::DirectXPixelFormat,
    Graphics::SizeInt32,
    Win32::Foundation::HWND,
    Win32::Graphics::Direct3D11::{
        ID3D11Texture2D, D3D11_BOX, D3D11_CPU_ACCESS_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ,
        D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
    },
    Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC},
    Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop,
    Win32::System::WinRT::{RoInitialize, RoUninitialize, RO_INIT_MULTITHREADED},
};

/// Opens one WGC stream per window
#[derive(Debug, Default, Clone, Copy)]
pub struct WgcStreamProvider;

impl StreamProvider for WgcStreamProvider {
    fn open(
        &self,
        window: &WindowDescriptor,
        config: &StreamConfig,
        sink: FrameSink,
    ) -> CaptureResult<Box<dyn VideoStream>> {
        let (ready_tx, ready_rx) = bounded::<CaptureResult<()>>(1);
        let running = Arc::new(AtomicBool::new(true));

        let hwnd_raw = window.id.0;
        let config = config.clone();
        let thread_running = running.clone();
        let thread = thread::Builder::new()
            .name(format!("wgc-pump-{}", window.id))
            .spawn(move || pump(hwnd_raw, config, sink, thread_running, ready_tx))
            .map_err(|e| CaptureError::CaptureStartFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(event = "capture.wgc.stream_started", window_id = %window.id);
                Ok(Box::new(WgcStream {
                    running,
                    thread: Some(thread),
                }))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::CaptureStartFailed("capture thread exited".into()))
            }
        }
    }
}

/// Handle to a running pump thread
pub struct WgcStream {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VideoStream for WgcStream {
    fn stop(&mut self) -> CaptureResult<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| CaptureError::Platform("capture thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for WgcStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct PumpState {
    device: D3D11Device,
    session: GraphicsCaptureSession,
    frame_pool: Direct3D11CaptureFramePool,
}

impl PumpState {
    fn open(hwnd_raw: u64, config: &StreamConfig) -> CaptureResult<Self> {
        let device = D3D11Device::new()?;
        let item = create_capture_item(hwnd_from_id(crate::WindowId(hwnd_raw)))?;

        let item_size = item.Size()?;
        let size = SizeInt32 {
            Width: (config.width as i32).max(item_size.Width),
            Height: (config.height as i32).max(item_size.Height),
        };

        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            device.d3d_device(),
            DirectXPixelFormat::B8G8R8A8UIntNormalized,
            config.queue_depth as i32,
            size,
        )?;

        let session = frame_pool.CreateCaptureSession(&item)?;
        if let Err(e) = session.SetIsCursorCaptureEnabled(config.shows_cursor) {
            // not available before Windows 10 2004
            debug!(event = "capture.wgc.cursor_toggle_unsupported", error = %e);
        }
        session.StartCapture()?;

        Ok(Self {
            device,
            session,
            frame_pool,
        })
    }

    /// Newest pooled frame; older ones go back to the pool unread.
    fn latest_frame(&self, queue_depth: u32) -> Option<RawFrame> {
        let frame = drain_latest(
            queue_depth as usize + 1,
            || self.frame_pool.TryGetNextFrame().ok(),
            |older| {
                let _ = older.Close();
            },
        )?;
        let size = frame.ContentSize().ok()?;
        let surface = frame.Surface().ok()?;
        let read = read_surface(&self.device, &surface, size);
        let _ = frame.Close();
        match read {
            Ok(raw) => Some(raw),
            Err(e) => {
                debug!(event = "capture.wgc.frame_read_failed", error = %e);
                None
            }
        }
    }

    fn close(self) {
        let _ = self.session.Close();
        let _ = self.frame_pool.Close();
    }
}

fn pump(
    hwnd_raw: u64,
    config: StreamConfig,
    sink: FrameSink,
    running: Arc<AtomicBool>,
    ready: Sender<CaptureResult<()>>,
) {
    if let Err(e) = unsafe { RoInitialize(RO_INIT_MULTITHREADED) } {
        let _ = ready.send(Err(CaptureError::CaptureStartFailed(format!(
            "WinRT init failed: {}",
            e
        ))));
        return;
    }

    let state = match PumpState::open(hwnd_raw, &config) {
        Ok(state) => state,
        Err(e) => {
            let _ = ready.send(Err(CaptureError::CaptureStartFailed(e.detail())));
            unsafe { RoUninitialize() };
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut last_frame_time: Option<Instant> = None;
    while running.load(Ordering::SeqCst) {
        let due = last_frame_time.map_or(true, |t| t.elapsed() >= config.min_frame_interval);
        if due {
            if let Some(raw) = state.latest_frame(config.queue_depth) {
                if sink.push(raw) {
                    last_frame_time = Some(Instant::now());
                }
            }
        }
        thread::sleep(Duration::from_millis(1));
    }

    state.close();
    unsafe { RoUninitialize() };
    debug!(event = "capture.wgc.pump_exited", hwnd = hwnd_raw);
}

fn create_capture_item(hwnd: HWND) -> CaptureResult<GraphicsCaptureItem> {
    let interop: IGraphicsCaptureItemInterop =
        windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()?;
    let item: GraphicsCaptureItem = unsafe { interop.CreateForWindow(hwnd) }.map_err(|e| {
        warn!(event = "capture.wgc.item_failed", error = %e);
        CaptureError::CaptureStartFailed(e.to_string())
    })?;
    Ok(item)
}

/// Copy the frame surface to CPU memory as padded BGRA rows.
fn read_surface(device: &D3D11Device, surface: &IDirect3DSurface, size: SizeInt32) -> CaptureResult<RawFrame> {
    let texture: ID3D11Texture2D = D3D11Device::get_d3d11_interface(surface)?;

    let mut source_desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut source_desc) };

    let width = (size.Width.max(0) as u32).min(source_desc.Width);
    let height = (size.Height.max(0) as u32).min(source_desc.Height);
    if width == 0 || height == 0 {
        return Err(CaptureError::FrameDecodeFailed("empty content".into()));
    }

    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: 0,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: 0,
    };

    unsafe {
        let mut staging: Option<ID3D11Texture2D> = None;
        device.device().CreateTexture2D(&desc, None, Some(&mut staging))?;
        let staging =
            staging.ok_or_else(|| CaptureError::Platform("staging texture not created".into()))?;

        let src_box = D3D11_BOX {
            left: 0,
            top: 0,
            front: 0,
            right: width,
            bottom: height,
            back: 1,
        };
        device
            .context()
            .CopySubresourceRegion(&staging, 0, 0, 0, 0, &texture, 0, Some(&src_box));

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        device
            .context()
            .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;

        let stride = mapped.RowPitch as usize;
        let len = stride * (height as usize - 1) + width as usize * 4;
        let data = std::slice::from_raw_parts(mapped.pData as *const u8, len).to_vec();

        device.context().Unmap(&staging, 0);

        Ok(RawFrame {
            data,
            width,
            height,
            stride,
            format: PixelFormat::Bgra8,
            timestamp: Instant::now(),
        })
    }
}

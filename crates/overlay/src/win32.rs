//! Win32 PiP surface
//!
//! Every surface runs its own message loop thread. Window state lives in
//! that thread's thread-local slot; other threads only touch the shared
//! paint buffer and post messages.

use crate::{
    fit_within, OverlayError, OverlayResult, PresentationConfig, PresentationSurface,
    SurfaceAction, SurfaceCallbacks, SurfaceFactory, SurfaceId,
};
use capture::{FrameData, Rect, WindowDescriptor, WindowId};
use crossbeam_channel::{bounded, Sender};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashSet;
use std::ffi::c_void;
use std::mem::size_of;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    BeginPaint, CreateSolidBrush, DeleteObject, EndPaint, FillRect, InvalidateRect, SetBkMode,
    SetStretchBltMode, SetTextColor, StretchDIBits, TextOutW, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, HALFTONE, HDC, PAINTSTRUCT, SRCCOPY, TRANSPARENT,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetClientRect, GetMessageW,
    GetSystemMetrics, GetWindowRect, LoadCursorW, PostMessageW, PostQuitMessage,
    RegisterClassExW, SetLayeredWindowAttributes, SetWindowPos, SystemParametersInfoW,
    TranslateMessage, HTBOTTOMRIGHT, HTCAPTION, HWND_NOTOPMOST, HWND_TOPMOST, IDC_ARROW,
    LWA_ALPHA, MINMAXINFO, MSG, SM_CXSCREEN, SM_CYSCREEN, SPI_GETWORKAREA, SWP_NOACTIVATE,
    SWP_NOMOVE, SWP_NOSIZE, SWP_SHOWWINDOW, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, WM_APP, WM_CLOSE,
    WM_DESTROY, WM_ERASEBKGND, WM_GETMINMAXINFO, WM_KEYDOWN, WM_MOUSEWHEEL, WM_NCHITTEST,
    WM_NCRBUTTONUP, WM_PAINT, WM_SIZING, WMSZ_BOTTOM, WMSZ_TOP, WMSZ_TOPLEFT, WMSZ_TOPRIGHT,
    WNDCLASSEXW, WS_EX_LAYERED, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_OVERLAPPEDWINDOW, WS_POPUP,
};

const CLASS_NAME: PCWSTR = w!("LivePiPSurface");
/// Owner-initiated close; does not report to the close notifier
const WM_APP_CLOSE: u32 = WM_APP + 1;
const RESIZE_GRIP: i32 = 16;
const OPACITY_STEP: f32 = 0.05;
const VK_ESCAPE: usize = 0x1B;

static CLASS: OnceCell<()> = OnceCell::new();

type LiveSurfaces = Arc<Mutex<HashSet<SurfaceId>>>;

#[derive(Default)]
struct PaintBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    status: Option<String>,
}

thread_local! {
    static SURFACE_STATE: RefCell<Option<SurfaceState>> = RefCell::new(None);
}

struct SurfaceState {
    id: SurfaceId,
    window_id: WindowId,
    paint: Arc<Mutex<PaintBuffer>>,
    callbacks: SurfaceCallbacks,
    aspect: f64,
    aspect_locked: bool,
    min_size: (i32, i32),
    live: LiveSurfaces,
}

fn with_state<R>(f: impl FnOnce(&SurfaceState) -> R) -> Option<R> {
    SURFACE_STATE.with(|s| s.borrow().as_ref().map(f))
}

fn hwnd_of(raw: isize) -> HWND {
    HWND(raw as *mut c_void)
}

/// Creates top-most, borderless, layered PiP windows
#[derive(Default)]
pub struct Win32SurfaceFactory {
    live: LiveSurfaces,
}

impl Win32SurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

struct SurfaceInit {
    title: String,
    window_id: WindowId,
    config: PresentationConfig,
    aspect: f64,
    paint: Arc<Mutex<PaintBuffer>>,
    callbacks: SurfaceCallbacks,
    live: LiveSurfaces,
}

impl SurfaceFactory for Win32SurfaceFactory {
    fn create(
        &self,
        source: &WindowDescriptor,
        config: &PresentationConfig,
        callbacks: SurfaceCallbacks,
    ) -> OverlayResult<Box<dyn PresentationSurface>> {
        let paint = Arc::new(Mutex::new(PaintBuffer::default()));
        let init = SurfaceInit {
            title: format!("LivePiP - {}", source.title),
            window_id: source.id,
            config: config.clone(),
            aspect: source.aspect_ratio(),
            paint: paint.clone(),
            callbacks,
            live: self.live.clone(),
        };

        let (ready_tx, ready_rx) = bounded::<OverlayResult<isize>>(1);
        let thread = thread::Builder::new()
            .name(format!("pip-surface-{}", source.id))
            .spawn(move || surface_thread(init, ready_tx))
            .map_err(|e| OverlayError::SurfaceUnavailable(e.to_string()))?;

        let hwnd = match ready_rx.recv() {
            Ok(Ok(hwnd)) => hwnd,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(OverlayError::SurfaceUnavailable("surface thread exited".into()));
            }
        };

        let id = SurfaceId(hwnd as u64);
        self.live.lock().insert(id);

        Ok(Box::new(Win32Surface {
            hwnd,
            id,
            paint,
            floating: config.always_on_top,
            thread: Some(thread),
        }))
    }

    fn work_area(&self) -> Rect {
        let mut rect = RECT::default();
        let queried = unsafe {
            SystemParametersInfoW(
                SPI_GETWORKAREA,
                0,
                Some(&mut rect as *mut RECT as *mut c_void),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
        };

        match queried {
            Ok(()) => Rect::new(
                rect.left,
                rect.top,
                (rect.right - rect.left).max(0) as u32,
                (rect.bottom - rect.top).max(0) as u32,
            ),
            Err(e) => {
                debug!(event = "overlay.win32.work_area_fallback", error = %e);
                let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
                Rect::new(0, 0, w.max(0) as u32, h.max(0) as u32)
            }
        }
    }

    fn live_surfaces(&self) -> Vec<SurfaceId> {
        self.live.lock().iter().copied().collect()
    }

    fn destroy(&self, id: SurfaceId) -> OverlayResult<()> {
        if !self.live.lock().contains(&id) {
            return Ok(());
        }
        unsafe { PostMessageW(hwnd_of(id.0 as isize), WM_APP_CLOSE, WPARAM(0), LPARAM(0))? };
        Ok(())
    }
}

/// Handle to a surface thread
pub struct Win32Surface {
    hwnd: isize,
    id: SurfaceId,
    paint: Arc<Mutex<PaintBuffer>>,
    floating: bool,
    thread: Option<JoinHandle<()>>,
}

impl Win32Surface {
    fn redraw(&self) {
        unsafe {
            let _ = InvalidateRect(hwnd_of(self.hwnd), None, false);
        }
    }

    fn ensure_open(&self) -> OverlayResult<()> {
        match &self.thread {
            Some(thread) if !thread.is_finished() => Ok(()),
            _ => Err(OverlayError::Closed),
        }
    }
}

impl PresentationSurface for Win32Surface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn show(&mut self, frame: Rect) -> OverlayResult<()> {
        self.ensure_open()?;
        let after = if self.floating { HWND_TOPMOST } else { HWND_NOTOPMOST };
        unsafe {
            SetWindowPos(
                hwnd_of(self.hwnd),
                after,
                frame.x,
                frame.y,
                frame.width as i32,
                frame.height as i32,
                SWP_NOACTIVATE | SWP_SHOWWINDOW,
            )?;
        }
        Ok(())
    }

    fn present(&mut self, frame: &FrameData) -> OverlayResult<()> {
        self.ensure_open()?;
        {
            let mut paint = self.paint.lock();
            paint.pixels = frame.to_bgra();
            paint.width = frame.width();
            paint.height = frame.height();
        }
        self.redraw();
        Ok(())
    }

    fn show_status(&mut self, text: Option<&str>) -> OverlayResult<()> {
        self.ensure_open()?;
        self.paint.lock().status = text.map(String::from);
        self.redraw();
        Ok(())
    }

    fn set_floating(&mut self, floating: bool) -> OverlayResult<()> {
        self.ensure_open()?;
        let after = if floating { HWND_TOPMOST } else { HWND_NOTOPMOST };
        unsafe {
            SetWindowPos(
                hwnd_of(self.hwnd),
                after,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )?;
        }
        self.floating = floating;
        Ok(())
    }

    fn set_opacity(&mut self, opacity: f32) -> OverlayResult<()> {
        self.ensure_open()?;
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        unsafe { SetLayeredWindowAttributes(hwnd_of(self.hwnd), COLORREF(0), alpha, LWA_ALPHA)? };
        Ok(())
    }

    fn close(&mut self) -> OverlayResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        if !thread.is_finished() {
            if let Err(e) = unsafe { PostMessageW(hwnd_of(self.hwnd), WM_APP_CLOSE, WPARAM(0), LPARAM(0)) } {
                // already destroyed by the user; the thread is exiting
                debug!(event = "overlay.win32.close_post_failed", surface_id = %self.id, error = %e);
            }
        }

        thread
            .join()
            .map_err(|_| OverlayError::Platform("surface thread panicked".into()))
    }
}

impl Drop for Win32Surface {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn register_class() -> OverlayResult<()> {
    CLASS
        .get_or_try_init(|| unsafe {
            let hmodule = GetModuleHandleW(None)?;
            let wc = WNDCLASSEXW {
                cbSize: size_of::<WNDCLASSEXW>() as u32,
                lpfnWndProc: Some(wnd_proc),
                hInstance: HINSTANCE(hmodule.0),
                hCursor: LoadCursorW(None, IDC_ARROW)?,
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };
            if RegisterClassExW(&wc) == 0 {
                return Err(OverlayError::SurfaceUnavailable("window class registration failed".into()));
            }
            Ok(())
        })
        .map(|_| ())
}

unsafe fn create_window(init: &SurfaceInit) -> OverlayResult<HWND> {
    register_class()?;
    let hmodule = GetModuleHandleW(None)?;

    let mut ex_style = WS_EX_LAYERED | WS_EX_TOOLWINDOW;
    if init.config.always_on_top {
        ex_style |= WS_EX_TOPMOST;
    }
    let style = if init.config.borderless { WS_POPUP } else { WS_OVERLAPPEDWINDOW };

    let title: Vec<u16> = init.title.encode_utf16().chain(std::iter::once(0)).collect();
    let hwnd = CreateWindowExW(
        ex_style,
        CLASS_NAME,
        PCWSTR(title.as_ptr()),
        style,
        0,
        0,
        init.config.min_width as i32,
        init.config.min_height as i32,
        None,
        None,
        HINSTANCE(hmodule.0),
        None,
    )?;

    SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA)?;
    Ok(hwnd)
}

fn surface_thread(init: SurfaceInit, ready: Sender<OverlayResult<isize>>) {
    let hwnd = match unsafe { create_window(&init) } {
        Ok(hwnd) => hwnd,
        Err(e) => {
            warn!(event = "overlay.win32.create_failed", window_id = %init.window_id, error = %e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let raw = hwnd.0 as isize;
    SURFACE_STATE.with(|s| {
        *s.borrow_mut() = Some(SurfaceState {
            id: SurfaceId(raw as u64),
            window_id: init.window_id,
            paint: init.paint,
            callbacks: init.callbacks,
            aspect: init.aspect,
            aspect_locked: init.config.aspect_locked,
            min_size: (init.config.min_width as i32, init.config.min_height as i32),
            live: init.live,
        });
    });
    let _ = ready.send(Ok(raw));

    unsafe {
        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    SURFACE_STATE.with(|s| s.borrow_mut().take());
    debug!(event = "overlay.win32.thread_exited", window_id = %init.window_id);
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_PAINT => {
            paint(hwnd);
            LRESULT(0)
        }

        WM_ERASEBKGND => LRESULT(1),

        WM_NCHITTEST => LRESULT(hit_test(hwnd, lparam)),

        WM_NCRBUTTONUP => {
            send_action(SurfaceAction::TogglePin);
            LRESULT(0)
        }

        WM_MOUSEWHEEL => {
            let delta = ((wparam.0 >> 16) & 0xFFFF) as u16 as i16;
            let step = if delta > 0 { OPACITY_STEP } else { -OPACITY_STEP };
            send_action(SurfaceAction::AdjustOpacity(step));
            LRESULT(0)
        }

        WM_KEYDOWN if wparam.0 == VK_ESCAPE => {
            user_close(hwnd);
            LRESULT(0)
        }

        WM_CLOSE => {
            user_close(hwnd);
            LRESULT(0)
        }

        WM_APP_CLOSE => {
            let _ = DestroyWindow(hwnd);
            LRESULT(0)
        }

        WM_GETMINMAXINFO => {
            if let Some((w, h)) = with_state(|s| s.min_size) {
                let info = &mut *(lparam.0 as *mut MINMAXINFO);
                info.ptMinTrackSize = POINT { x: w, y: h };
            }
            LRESULT(0)
        }

        WM_SIZING => match with_state(|s| (s.aspect_locked, s.aspect)) {
            Some((true, aspect)) => {
                lock_aspect(&mut *(lparam.0 as *mut RECT), wparam.0 as u32, aspect);
                LRESULT(1)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        },

        WM_DESTROY => {
            with_state(|s| {
                s.live.lock().remove(&s.id);
            });
            PostQuitMessage(0);
            LRESULT(0)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

fn send_action(action: SurfaceAction) {
    let target = with_state(|s| (s.window_id, s.callbacks.on_action.clone()));
    if let Some((window_id, on_action)) = target {
        on_action(window_id, action);
    }
}

unsafe fn user_close(hwnd: HWND) {
    let notifier = with_state(|s| s.callbacks.on_close.clone());
    if let Some(notifier) = notifier {
        notifier.notify();
    }
    let _ = DestroyWindow(hwnd);
}

/// Drag anywhere; resize from the bottom-right grip.
unsafe fn hit_test(hwnd: HWND, lparam: LPARAM) -> isize {
    let x = (lparam.0 & 0xFFFF) as u16 as i16 as i32;
    let y = ((lparam.0 >> 16) & 0xFFFF) as u16 as i16 as i32;

    let mut rect = RECT::default();
    if GetWindowRect(hwnd, &mut rect).is_ok()
        && x >= rect.right - RESIZE_GRIP
        && y >= rect.bottom - RESIZE_GRIP
    {
        return HTBOTTOMRIGHT as isize;
    }
    HTCAPTION as isize
}

fn lock_aspect(rect: &mut RECT, edge: u32, aspect: f64) {
    if !(aspect.is_finite() && aspect > 0.0) {
        return;
    }

    let width = rect.right - rect.left;
    let height = rect.bottom - rect.top;

    if edge == WMSZ_TOP || edge == WMSZ_BOTTOM {
        rect.right = rect.left + (height as f64 * aspect).round() as i32;
        return;
    }

    let new_height = (width as f64 / aspect).round() as i32;
    if edge == WMSZ_TOPLEFT || edge == WMSZ_TOPRIGHT {
        rect.top = rect.bottom - new_height;
    } else {
        rect.bottom = rect.top + new_height;
    }
}

unsafe fn paint(hwnd: HWND) {
    let mut ps = PAINTSTRUCT::default();
    let hdc = BeginPaint(hwnd, &mut ps);

    let mut client = RECT::default();
    let _ = GetClientRect(hwnd, &mut client);

    let background = CreateSolidBrush(COLORREF(0x00202020));
    FillRect(hdc, &client, background);
    let _ = DeleteObject(background);

    with_state(|state| {
        let buffer = state.paint.lock();
        if buffer.width > 0 && buffer.height > 0 && !buffer.pixels.is_empty() {
            draw_frame(hdc, &client, &buffer);
        }
        if let Some(status) = &buffer.status {
            draw_status(hdc, &client, status);
        }
    });

    let _ = EndPaint(hwnd, &ps);
}

unsafe fn draw_frame(hdc: HDC, client: &RECT, buffer: &PaintBuffer) {
    let outer = Rect::new(
        0,
        0,
        (client.right - client.left).max(0) as u32,
        (client.bottom - client.top).max(0) as u32,
    );
    let dest = fit_within(outer, buffer.width, buffer.height);

    let bmi = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: buffer.width as i32,
            biHeight: -(buffer.height as i32), // top-down
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        bmiColors: [Default::default()],
    };

    SetStretchBltMode(hdc, HALFTONE);
    StretchDIBits(
        hdc,
        dest.x,
        dest.y,
        dest.width as i32,
        dest.height as i32,
        0,
        0,
        buffer.width as i32,
        buffer.height as i32,
        Some(buffer.pixels.as_ptr() as *const c_void),
        &bmi,
        DIB_RGB_COLORS,
        SRCCOPY,
    );
}

unsafe fn draw_status(hdc: HDC, client: &RECT, status: &str) {
    let text: Vec<u16> = status.encode_utf16().collect();

    SetBkMode(hdc, TRANSPARENT);
    SetTextColor(hdc, COLORREF(0x00FFFFFF));
    let _ = TextOutW(hdc, client.left + 8, client.bottom - 24, &text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::UI::WindowsAndMessaging::WMSZ_BOTTOMRIGHT;

    #[test]
    fn sizing_keeps_aspect() {
        let mut rect = RECT {
            left: 0,
            top: 0,
            right: 400,
            bottom: 100,
        };
        lock_aspect(&mut rect, WMSZ_BOTTOMRIGHT, 2.0);
        assert_eq!(rect.bottom, 200);

        lock_aspect(&mut rect, WMSZ_BOTTOM, 2.0);
        assert_eq!(rect.right, 400);

        rect.bottom = 300;
        lock_aspect(&mut rect, WMSZ_TOP, 2.0);
        assert_eq!(rect.right, 600);
    }
}

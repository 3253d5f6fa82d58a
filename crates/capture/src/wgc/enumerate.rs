//! Top-level window enumeration via Win32

use super::id_from_hwnd;
use crate::{CaptureError, CaptureResult, Rect, WindowDescriptor, WindowSource};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::path::Path;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, RECT};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetForegroundWindow, GetWindow, GetWindowLongW, GetWindowRect,
    GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible, GA_ROOT,
    GWL_EXSTYLE, GWL_STYLE, GW_OWNER, WS_DISABLED, WS_EX_TOOLWINDOW,
};

/// Enumerates visible, unowned, uncloaked root windows in Z-order
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32WindowSource;

impl WindowSource for Win32WindowSource {
    fn windows(&self) -> CaptureResult<Vec<WindowDescriptor>> {
        let mut handles: Vec<HWND> = Vec::new();

        unsafe {
            EnumWindows(
                Some(enum_window_callback),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            )
            .map_err(|e| CaptureError::CatalogUnavailable(e.to_string()))?;
        }

        Ok(handles
            .into_iter()
            .filter_map(|hwnd| unsafe { describe_window(hwnd) })
            .collect())
    }

    fn frontmost_pid(&self) -> Option<u32> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_invalid() {
                return None;
            }
            let mut pid = 0u32;
            GetWindowThreadProcessId(hwnd, Some(&mut pid));
            (pid != 0).then_some(pid)
        }
    }
}

unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);

    if should_include_window(hwnd) {
        handles.push(hwnd);
    }

    BOOL(1)
}

unsafe fn should_include_window(hwnd: HWND) -> bool {
    if !IsWindowVisible(hwnd).as_bool() {
        return false;
    }

    let style = GetWindowLongW(hwnd, GWL_STYLE) as u32;
    if style & WS_DISABLED.0 != 0 {
        return false;
    }

    let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
    if ex_style & WS_EX_TOOLWINDOW.0 != 0 {
        return false;
    }

    // Cloaked windows live on another virtual desktop
    let mut cloaked: u32 = 0;
    if DwmGetWindowAttribute(
        hwnd,
        DWMWA_CLOAKED,
        &mut cloaked as *mut _ as *mut _,
        std::mem::size_of::<u32>() as u32,
    )
    .is_ok()
        && cloaked != 0
    {
        return false;
    }

    if let Ok(owner) = GetWindow(hwnd, GW_OWNER) {
        if !owner.is_invalid() {
            return false;
        }
    }

    GetAncestor(hwnd, GA_ROOT) == hwnd
}

unsafe fn describe_window(hwnd: HWND) -> Option<WindowDescriptor> {
    let mut rect = RECT::default();
    GetWindowRect(hwnd, &mut rect).ok()?;

    let mut pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));

    Some(WindowDescriptor {
        id: id_from_hwnd(hwnd),
        title: window_title(hwnd),
        owner_pid: pid,
        owner_app_name: process_name(pid).unwrap_or_default(),
        bounds: Rect::new(
            rect.left,
            rect.top,
            (rect.right - rect.left).max(0) as u32,
            (rect.bottom - rect.top).max(0) as u32,
        ),
    })
}

unsafe fn window_title(hwnd: HWND) -> String {
    let len = GetWindowTextLengthW(hwnd);
    if len <= 0 {
        return String::new();
    }

    let mut buf = vec![0u16; len as usize + 1];
    let copied = GetWindowTextW(hwnd, &mut buf);
    OsString::from_wide(&buf[..copied.max(0) as usize])
        .to_string_lossy()
        .into_owned()
}

/// Executable stem of the owning process, e.g. `chrome`
unsafe fn process_name(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }

    let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
    let mut buf = [0u16; 1024];
    let mut size = buf.len() as u32;
    let queried = QueryFullProcessImageNameW(process, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut size);
    let _ = CloseHandle(process);
    queried.ok()?;

    let path = OsString::from_wide(&buf[..size as usize]);
    Path::new(&path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}


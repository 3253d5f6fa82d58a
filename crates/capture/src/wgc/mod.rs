//! Windows backends: Win32 window enumeration and Windows Graphics Capture

pub mod d3d11;
pub mod enumerate;
pub mod stream;

pub use d3d11::D3D11Device;
pub use enumerate::Win32WindowSource;
pub use stream::{WgcStream, WgcStreamProvider};

use crate::WindowId;
use windows::Win32::Foundation::HWND;

pub(crate) fn hwnd_from_id(id: WindowId) -> HWND {
    HWND(id.0 as isize as *mut std::ffi::c_void)
}

pub(crate) fn id_from_hwnd(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as isize as u64)
}

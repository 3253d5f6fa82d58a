//! Native backends behind the capture, overlay and hotkey traits

use crate::AppResult;
use capture::{StreamProvider, WindowCatalog, WindowSource};
use hotkey::KeySink;
use overlay::SurfaceFactory;
use std::sync::Arc;
use tracing::info;

#[cfg(target_os = "windows")]
use hotkey::KeyboardHook;

#[derive(Clone)]
pub struct Platform {
    pub source: Arc<dyn WindowSource>,
    pub streams: Arc<dyn StreamProvider>,
    pub surfaces: Arc<dyn SurfaceFactory>,
}

impl Platform {
    #[cfg(target_os = "windows")]
    pub fn native() -> AppResult<Self> {
        use capture::wgc::{Win32WindowSource, WgcStreamProvider};
        use overlay::win32::Win32SurfaceFactory;
        use windows::Win32::UI::HiDpi::{
            SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
        };

        // physical pixels for window bounds and surface placement
        unsafe {
            let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
        }

        info!(event = "app.platform.native", os = std::env::consts::OS);
        Ok(Self {
            source: Arc::new(Win32WindowSource),
            streams: Arc::new(WgcStreamProvider),
            surfaces: Arc::new(Win32SurfaceFactory::new()),
        })
    }

    #[cfg(not(target_os = "windows"))]
    pub fn native() -> AppResult<Self> {
        info!(event = "app.platform.unsupported", os = std::env::consts::OS);
        Err(crate::AppError::UnsupportedPlatform(std::env::consts::OS))
    }

    pub fn catalog(&self) -> WindowCatalog {
        WindowCatalog::new(self.source.clone())
    }
}

/// Keeps the global key source installed while alive
pub struct KeySource {
    #[cfg(target_os = "windows")]
    _hook: KeyboardHook,
}

#[cfg(target_os = "windows")]
pub fn install_key_source(sink: KeySink) -> AppResult<KeySource> {
    let hook = KeyboardHook::spawn(sink)?;
    info!(event = "app.platform.key_source_installed");
    Ok(KeySource { _hook: hook })
}

#[cfg(not(target_os = "windows"))]
pub fn install_key_source(_sink: KeySink) -> AppResult<KeySource> {
    Err(crate::AppError::UnsupportedPlatform(std::env::consts::OS))
}

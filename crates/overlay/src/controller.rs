//! Presentation controller: one per tracked capture

use crate::{
    initial_frame, OverlayError, OverlayResult, PresentationConfig, PresentationSurface,
    SurfaceCallbacks, SurfaceFactory, SurfaceId,
};
use capture::{FrameData, WindowDescriptor, WindowId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shown until the first frame arrives
pub const PLACEHOLDER_TEXT: &str = "Waiting for frames...";

/// Reports a direct user close at most once
#[derive(Clone)]
pub struct CloseNotifier {
    window_id: WindowId,
    fired: Arc<AtomicBool>,
    callback: Arc<dyn Fn(WindowId) + Send + Sync>,
}

impl CloseNotifier {
    pub fn new(window_id: WindowId, callback: Arc<dyn Fn(WindowId) + Send + Sync>) -> Self {
        Self {
            window_id,
            fired: Arc::new(AtomicBool::new(false)),
            callback,
        }
    }

    /// Returns false if already fired or disarmed.
    pub fn notify(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        (self.callback)(self.window_id);
        true
    }

    /// Swallow any later notification
    pub fn disarm(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    pub fn window_id(&self) -> WindowId {
        self.window_id
    }
}

pub struct PresentationController {
    window_id: WindowId,
    config: PresentationConfig,
    surface: Option<Box<dyn PresentationSurface>>,
    notifier: CloseNotifier,
    pinned: bool,
    opacity: f32,
    has_frame: bool,
}

impl PresentationController {
    /// Create the surface for `source` and show it with the placeholder.
    pub fn open(
        factory: &dyn SurfaceFactory,
        source: &WindowDescriptor,
        config: PresentationConfig,
        callbacks: SurfaceCallbacks,
    ) -> OverlayResult<Self> {
        let notifier = callbacks.on_close.clone();
        let mut surface = factory.create(source, &config, callbacks)?;

        let frame = initial_frame(&config, source, factory.work_area());
        surface.show(frame)?;
        surface.show_status(Some(PLACEHOLDER_TEXT))?;

        let opacity = config.clamp_opacity(config.opacity);
        if opacity < 1.0 {
            surface.set_opacity(opacity)?;
        }

        info!(
            event = "overlay.controller.opened",
            window_id = %source.id,
            surface_id = %surface.id(),
            width = frame.width,
            height = frame.height
        );

        Ok(Self {
            window_id: source.id,
            pinned: config.always_on_top,
            opacity,
            config,
            surface: Some(surface),
            notifier,
            has_frame: false,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.surface.as_ref().map(|s| s.id())
    }

    pub fn is_open(&self) -> bool {
        self.surface.is_some()
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    fn surface(&mut self) -> OverlayResult<&mut Box<dyn PresentationSurface>> {
        self.surface.as_mut().ok_or(OverlayError::Closed)
    }

    pub fn present(&mut self, frame: &FrameData) -> OverlayResult<()> {
        let first = !self.has_frame;
        let surface = self.surface()?;
        if first {
            surface.show_status(None)?;
        }
        surface.present(frame)?;
        self.has_frame = true;
        Ok(())
    }

    /// Status line for a failed start or a decode warning.
    pub fn show_error(&mut self, message: &str) -> OverlayResult<()> {
        self.surface()?.show_status(Some(message))
    }

    pub fn clear_error(&mut self) -> OverlayResult<()> {
        let status = if self.has_frame { None } else { Some(PLACEHOLDER_TEXT) };
        self.surface()?.show_status(status)
    }

    /// Flip between floating and normal level; returns the new state.
    pub fn toggle_pin(&mut self) -> OverlayResult<bool> {
        let pinned = !self.pinned;
        self.surface()?.set_floating(pinned)?;
        self.pinned = pinned;
        debug!(event = "overlay.controller.pin_toggled", window_id = %self.window_id, pinned);
        Ok(pinned)
    }

    /// Set opacity within the configured range; returns the applied value.
    pub fn set_opacity(&mut self, opacity: f32) -> OverlayResult<f32> {
        let opacity = self.config.clamp_opacity(opacity);
        self.surface()?.set_opacity(opacity)?;
        self.opacity = opacity;
        Ok(opacity)
    }

    pub fn adjust_opacity(&mut self, delta: f32) -> OverlayResult<f32> {
        self.set_opacity(self.opacity + delta)
    }

    /// Close from the owner. Never reports through the close notifier.
    pub fn close(&mut self) -> OverlayResult<()> {
        self.notifier.disarm();
        match self.surface.take() {
            Some(mut surface) => {
                let id = surface.id();
                let result = surface.close();
                match &result {
                    Ok(()) => debug!(event = "overlay.controller.closed", window_id = %self.window_id, surface_id = %id),
                    Err(e) => warn!(event = "overlay.controller.close_failed", window_id = %self.window_id, error = %e),
                }
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for PresentationController {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

//! Platform surface boundary

use crate::{CloseNotifier, OverlayResult, PresentationConfig};
use capture::{FrameData, Rect, WindowDescriptor, WindowId};
use std::fmt;
use std::sync::Arc;

/// Platform handle of one live surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// In-surface user gestures the owner should apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceAction {
    TogglePin,
    AdjustOpacity(f32),
}

pub type ActionHandler = Arc<dyn Fn(WindowId, SurfaceAction) + Send + Sync>;

/// Callbacks a surface raises from its own thread
#[derive(Clone)]
pub struct SurfaceCallbacks {
    pub on_close: CloseNotifier,
    pub on_action: ActionHandler,
}

pub trait PresentationSurface: Send {
    fn id(&self) -> SurfaceId;

    /// Make the surface visible at `frame`.
    fn show(&mut self, frame: Rect) -> OverlayResult<()>;

    fn present(&mut self, frame: &FrameData) -> OverlayResult<()>;

    /// Status line over the content; `None` clears it.
    fn show_status(&mut self, text: Option<&str>) -> OverlayResult<()>;

    fn set_floating(&mut self, floating: bool) -> OverlayResult<()>;

    fn set_opacity(&mut self, opacity: f32) -> OverlayResult<()>;

    /// Close without reporting through the close notifier.
    fn close(&mut self) -> OverlayResult<()>;
}

pub trait SurfaceFactory: Send + Sync {
    fn create(
        &self,
        source: &WindowDescriptor,
        config: &PresentationConfig,
        callbacks: SurfaceCallbacks,
    ) -> OverlayResult<Box<dyn PresentationSurface>>;

    /// Area new surfaces are placed in
    fn work_area(&self) -> Rect;

    /// Every surface this factory created that is still open
    fn live_surfaces(&self) -> Vec<SurfaceId>;

    fn destroy(&self, id: SurfaceId) -> OverlayResult<()>;
}

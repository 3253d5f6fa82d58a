//! Capturable window listing
//!
//! Filters raw OS window lists down to what the picker and the hotkey path
//! may target, collapsing duplicates of the same logical window.

use crate::{CaptureError, CaptureResult, WindowDescriptor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Windows with either side at or below this size are treated as noise.
pub const MIN_WINDOW_DIMENSION: u32 = 100;

/// Live OS window state
pub trait WindowSource: Send + Sync {
    /// All windows the platform can capture, in enumeration order.
    fn windows(&self) -> CaptureResult<Vec<WindowDescriptor>>;

    /// Process id of the application that currently has focus.
    fn frontmost_pid(&self) -> Option<u32>;
}

/// Check title, ownership and size filters.
pub fn is_capturable(window: &WindowDescriptor, self_pid: u32) -> bool {
    if window.title.is_empty() {
        return false;
    }
    if window.owner_pid == self_pid {
        return false;
    }
    window.width() > MIN_WINDOW_DIMENSION && window.height() > MIN_WINDOW_DIMENSION
}

/// Keep the largest window per dedup key, preserving first-seen order.
///
/// Ties keep the earlier window.
pub fn dedupe_by_largest(windows: Vec<WindowDescriptor>) -> Vec<WindowDescriptor> {
    let mut slots: HashMap<_, usize> = HashMap::new();
    let mut unique: Vec<WindowDescriptor> = Vec::with_capacity(windows.len());

    for window in windows {
        let key = window.dedup_key();
        match slots.get(&key) {
            Some(&idx) => {
                debug!(
                    event = "capture.catalog.duplicate_found",
                    app = %key.app_name,
                    title = %key.title,
                    kept = %unique[idx].size_label(),
                    candidate = %window.size_label(),
                );
                if window.area() > unique[idx].area() {
                    unique[idx] = window;
                }
            }
            None => {
                slots.insert(key, unique.len());
                unique.push(window);
            }
        }
    }

    unique
}

/// Filter, dedupe and sort a raw enumeration.
pub fn catalog_windows(raw: Vec<WindowDescriptor>, self_pid: u32) -> Vec<WindowDescriptor> {
    let filtered: Vec<_> = raw
        .into_iter()
        .filter(|w| is_capturable(w, self_pid))
        .collect();

    let mut unique = dedupe_by_largest(filtered);
    // Stable, so equal titles keep first-seen order
    unique.sort_by(|a, b| a.title.cmp(&b.title));
    unique
}

/// Picker search: case-insensitive match on title or app name.
pub fn search<'a>(windows: &'a [WindowDescriptor], query: &str) -> Vec<&'a WindowDescriptor> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return windows.iter().collect();
    }

    windows
        .iter()
        .filter(|w| {
            w.title.to_lowercase().contains(&needle)
                || w.owner_app_name.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Window catalog over a platform source
pub struct WindowCatalog {
    source: Arc<dyn WindowSource>,
    self_pid: u32,
    snapshot: Mutex<Vec<WindowDescriptor>>,
}

impl WindowCatalog {
    /// Create a catalog that hides windows owned by the current process
    pub fn new(source: Arc<dyn WindowSource>) -> Self {
        Self::with_self_pid(source, std::process::id())
    }

    pub fn with_self_pid(source: Arc<dyn WindowSource>, self_pid: u32) -> Self {
        Self {
            source,
            self_pid,
            snapshot: Mutex::new(Vec::new()),
        }
    }

    /// Query the source and return the current capturable windows.
    ///
    /// On failure the previous snapshot is left untouched.
    pub fn list_capturable_windows(&self) -> CaptureResult<Vec<WindowDescriptor>> {
        let raw = self.source.windows().map_err(|e| {
            warn!(event = "capture.catalog.query_failed", error = %e);
            CaptureError::CatalogUnavailable(e.detail())
        })?;

        let raw_count = raw.len();
        let windows = catalog_windows(raw, self.self_pid);
        info!(
            event = "capture.catalog.refreshed",
            raw = raw_count,
            capturable = windows.len()
        );

        *self.snapshot.lock() = windows.clone();
        Ok(windows)
    }

    /// Last successful listing
    pub fn snapshot(&self) -> Vec<WindowDescriptor> {
        self.snapshot.lock().clone()
    }

    /// Largest capturable window of the application that has focus right now.
    ///
    /// Best effort: focus may change between the trigger and this query.
    pub fn frontmost_window(&self) -> CaptureResult<Option<WindowDescriptor>> {
        let Some(pid) = self.source.frontmost_pid() else {
            debug!(event = "capture.catalog.no_frontmost_app");
            return Ok(None);
        };

        let raw = self
            .source
            .windows()
            .map_err(|e| CaptureError::CatalogUnavailable(e.detail()))?;

        let owned: Vec<_> = raw
            .into_iter()
            .filter(|w| w.owner_pid == pid && is_capturable(w, self.self_pid))
            .collect();

        let mut best: Option<WindowDescriptor> = None;
        for window in dedupe_by_largest(owned) {
            if best.as_ref().map_or(true, |b| window.area() > b.area()) {
                best = Some(window);
            }
        }

        debug!(
            event = "capture.catalog.frontmost_resolved",
            pid = pid,
            window_id = ?best.as_ref().map(|w| w.id)
        );
        Ok(best)
    }
}

//! Window snapshots produced by the catalog

use crate::Rect;
use std::fmt;

/// Opaque OS window identifier, stable for the lifetime of the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable snapshot of one on-screen window.
///
/// Never updated in place; re-query the catalog to observe changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescriptor {
    pub id: WindowId,
    /// May be empty; such windows are filtered out of the catalog.
    pub title: String,
    pub owner_pid: u32,
    pub owner_app_name: String,
    /// Frame in logical pixels
    pub bounds: Rect,
}

impl WindowDescriptor {
    pub fn width(&self) -> u32 {
        self.bounds.width
    }

    pub fn height(&self) -> u32 {
        self.bounds.height
    }

    pub fn area(&self) -> u64 {
        self.bounds.area()
    }

    /// Width over height, 1.0 for degenerate frames
    pub fn aspect_ratio(&self) -> f64 {
        if self.bounds.height == 0 {
            return 1.0;
        }
        self.bounds.width as f64 / self.bounds.height as f64
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            app_name: self.owner_app_name.clone(),
            title: self.title.clone(),
        }
    }

    /// Dimensions for list rows, e.g. `1280×720`
    pub fn size_label(&self) -> String {
        format!("{}×{}", self.bounds.width, self.bounds.height)
    }
}

/// Collapses the same logical window surfaced at several resolutions.
///
/// Two distinct windows of one app sharing a title collapse as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub app_name: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(width: u32, height: u32) -> WindowDescriptor {
        WindowDescriptor {
            id: WindowId(1),
            title: "Notes".into(),
            owner_pid: 42,
            owner_app_name: "Editor".into(),
            bounds: Rect::new(0, 0, width, height),
        }
    }

    #[test]
    fn size_label_and_aspect() {
        let w = descriptor(1280, 720);
        assert_eq!(w.size_label(), "1280×720");
        assert!((w.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);
        assert_eq!(descriptor(10, 0).aspect_ratio(), 1.0);
    }

    #[test]
    fn dedup_key_ignores_pid_and_id() {
        let a = descriptor(200, 200);
        let mut b = descriptor(300, 300);
        b.id = WindowId(2);
        b.owner_pid = 7;
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}

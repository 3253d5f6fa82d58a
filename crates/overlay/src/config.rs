//! Presentation configuration and initial placement

use capture::{Rect, WindowDescriptor};
use std::ops::RangeInclusive;

/// How a PiP surface looks and where it first appears
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationConfig {
    pub always_on_top: bool,
    pub borderless: bool,
    pub aspect_locked: bool,
    /// Initial width; height follows the source aspect ratio
    pub base_width: u32,
    pub min_width: u32,
    pub min_height: u32,
    /// Inset from the work-area corner
    pub margin: u32,
    pub opacity: f32,
    pub opacity_range: RangeInclusive<f32>,
    /// Source pixels per surface pixel
    pub frame_scale: f32,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            always_on_top: true,
            borderless: true,
            aspect_locked: true,
            base_width: 400,
            min_width: 200,
            min_height: 150,
            margin: 20,
            opacity: 1.0,
            opacity_range: 0.3..=1.0,
            frame_scale: 2.0,
        }
    }
}

impl PresentationConfig {
    pub fn clamp_opacity(&self, opacity: f32) -> f32 {
        opacity.clamp(*self.opacity_range.start(), *self.opacity_range.end())
    }
}

/// Bottom-right placement inside `work_area`, sized from the source aspect.
pub fn initial_frame(config: &PresentationConfig, source: &WindowDescriptor, work_area: Rect) -> Rect {
    let aspect = source.aspect_ratio();
    let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 4.0 / 3.0 };

    let mut width = config.base_width.max(config.min_width) as f64;
    let mut height = width / aspect;

    if height < config.min_height as f64 {
        height = config.min_height as f64;
        if config.aspect_locked {
            width = (height * aspect).max(config.min_width as f64);
        }
    }

    // very tall sources must still fit on screen
    let max_height = work_area.height.saturating_sub(config.margin * 2) as f64;
    if max_height >= config.min_height as f64 && height > max_height {
        height = max_height;
        if config.aspect_locked {
            width = (height * aspect).max(config.min_width as f64);
        }
    }

    let width = width.round() as u32;
    let height = height.round() as u32;
    let x = work_area.right() - config.margin as i32 - width as i32;
    let y = work_area.bottom() - config.margin as i32 - height as i32;

    Rect::new(x.max(work_area.x), y.max(work_area.y), width, height)
}

/// Largest rect with the content's aspect ratio centred in `outer`
pub fn fit_within(outer: Rect, content_width: u32, content_height: u32) -> Rect {
    if content_width == 0 || content_height == 0 || outer.width == 0 || outer.height == 0 {
        return outer;
    }

    let scale = f64::min(
        outer.width as f64 / content_width as f64,
        outer.height as f64 / content_height as f64,
    );
    let width = ((content_width as f64 * scale).round() as u32).min(outer.width);
    let height = ((content_height as f64 * scale).round() as u32).min(outer.height);

    Rect::new(
        outer.x + ((outer.width - width) / 2) as i32,
        outer.y + ((outer.height - height) / 2) as i32,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::WindowId;

    fn source(width: u32, height: u32) -> WindowDescriptor {
        WindowDescriptor {
            id: WindowId(1),
            title: "Editor".into(),
            owner_pid: 10,
            owner_app_name: "Code".into(),
            bounds: Rect::new(0, 0, width, height),
        }
    }

    const SCREEN: Rect = Rect {
        x: 0,
        y: 0,
        width: 1920,
        height: 1040,
    };

    #[test]
    fn follows_source_aspect_at_bottom_right() {
        let config = PresentationConfig::default();
        let frame = initial_frame(&config, &source(1600, 900), SCREEN);

        assert_eq!(frame.width, 400);
        assert_eq!(frame.height, 225);
        assert_eq!(frame.right(), 1920 - 20);
        assert_eq!(frame.bottom(), 1040 - 20);
    }

    #[test]
    fn wide_source_respects_min_height() {
        let config = PresentationConfig::default();
        let frame = initial_frame(&config, &source(3200, 400), SCREEN);

        assert_eq!(frame.height, 150);
        assert_eq!(frame.width, 1200);
    }

    #[test]
    fn tall_source_fits_work_area() {
        let config = PresentationConfig::default();
        let frame = initial_frame(&config, &source(200, 2000), SCREEN);

        assert!(frame.height <= 1000);
        assert!(frame.width >= config.min_width);
        assert!(frame.y >= 0);
    }

    #[test]
    fn letterboxes_content() {
        let outer = Rect::new(0, 0, 400, 300);
        assert_eq!(fit_within(outer, 1600, 900), Rect::new(0, 37, 400, 225));
        assert_eq!(fit_within(outer, 300, 600), Rect::new(125, 0, 150, 300));
        assert_eq!(fit_within(outer, 0, 10), outer);
    }

    #[test]
    fn opacity_is_clamped() {
        let config = PresentationConfig::default();
        assert_eq!(config.clamp_opacity(0.1), 0.3);
        assert_eq!(config.clamp_opacity(1.4), 1.0);
        assert_eq!(config.clamp_opacity(0.55), 0.55);
    }
}

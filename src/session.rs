use std::collections::VecDeque;
use std::path::PathBuf;

use image::RgbaImage;

use crate::ops::mosaic::{Region, apply_dual};

pub const BLOCK_SIZE_MIN: u32 = 2;
pub const BLOCK_SIZE_MAX: u32 = 50;
pub const DEFAULT_BLOCK_SIZE: u32 = 5;

/// Pointer state over the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { start: (u32, u32) },
}

/// Pointer positions waiting for the next redraw tick.
///
/// Moves are queued as they arrive; a tick takes only the newest one and
/// drops the rest, so the rectangle overlay is redrawn at most once per tick.
#[derive(Debug, Default)]
pub struct RedrawQueue {
    pending: VecDeque<(u32, u32)>,
    tick_scheduled: bool,
}

impl RedrawQueue {
    /// Queue a point. Returns `true` when no tick is pending yet and the
    /// caller has to schedule one.
    pub fn push(&mut self, point: (u32, u32)) -> bool {
        self.pending.push_back(point);
        if self.tick_scheduled {
            false
        } else {
            self.tick_scheduled = true;
            true
        }
    }

    /// Drain the queue, returning the most recent point.
    pub fn drain_latest(&mut self) -> Option<(u32, u32)> {
        self.tick_scheduled = false;
        let latest = self.pending.pop_back();
        self.pending.clear();
        latest
    }

    pub fn is_tick_scheduled(&self) -> bool {
        self.tick_scheduled
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.tick_scheduled = false;
    }
}

/// One opened image: the on-screen copy, the full-resolution original and
/// everything the canvas needs to turn drags into mosaics.
pub struct MosaicSession {
    display: RgbaImage,
    source: RgbaImage,
    /// source width / display width, fixed at load.
    scale: f64,
    block_size: u32,
    drag: DragState,
    redraw: RedrawQueue,
    /// Rectangle outline currently shown over the display image.
    preview: Option<((u32, u32), (u32, u32))>,
    /// Bumped whenever display pixels change (texture re-upload trigger).
    display_generation: u64,

    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name (file name or "Untitled")
    pub name: String,
}

impl MosaicSession {
    /// Build a session from a decoded image, shrinking a display copy to fit
    /// `viewport`.
    pub fn new(source: RgbaImage, viewport: (u32, u32), block_size: u32) -> Self {
        let display = crate::io::fit_to_viewport(&source, viewport.0, viewport.1);
        Self::from_buffers(display, source, block_size)
    }

    /// Build a session from an already-prepared display/source pair.
    pub fn from_buffers(display: RgbaImage, source: RgbaImage, block_size: u32) -> Self {
        let scale = if display.width() == 0 {
            1.0
        } else {
            source.width() as f64 / display.width() as f64
        };
        Self {
            display,
            source,
            scale,
            block_size: block_size.clamp(BLOCK_SIZE_MIN, BLOCK_SIZE_MAX),
            drag: DragState::Idle,
            redraw: RedrawQueue::default(),
            preview: None,
            display_generation: 1,
            path: None,
            is_dirty: false,
            name: "Untitled".to_string(),
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        self.path = Some(path);
        self
    }

    pub fn display(&self) -> &RgbaImage {
        &self.display
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size.clamp(BLOCK_SIZE_MIN, BLOCK_SIZE_MAX);
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    pub fn display_generation(&self) -> u64 {
        self.display_generation
    }

    /// Corners of the rubber-band rectangle to draw, if any.
    pub fn preview_rect(&self) -> Option<((u32, u32), (u32, u32))> {
        self.preview
    }

    pub fn redraw_queue(&self) -> &RedrawQueue {
        &self.redraw
    }

    /// Primary button pressed at `point` (display coordinates).
    pub fn press(&mut self, point: (u32, u32)) {
        self.drag = DragState::Dragging { start: point };
        self.redraw.clear();
        self.preview = None;
    }

    /// Pointer moved. Returns `true` when a redraw tick must be scheduled.
    /// Ignored unless a drag is in progress.
    pub fn drag_to(&mut self, point: (u32, u32)) -> bool {
        if !self.is_dragging() {
            return false;
        }
        self.redraw.push(point)
    }

    /// Redraw tick: consume queued moves and update the rectangle outline to
    /// the newest one. Returns the outline when it changed.
    pub fn redraw_tick(&mut self) -> Option<((u32, u32), (u32, u32))> {
        let DragState::Dragging { start } = self.drag else {
            self.redraw.clear();
            return None;
        };
        let latest = self.redraw.drain_latest()?;
        self.preview = Some((start, latest));
        self.preview
    }

    /// Primary button released at `point`. Mosaics both buffers when the drag
    /// spans a well-formed rectangle. Returns whether anything was applied.
    pub fn release(&mut self, point: (u32, u32)) -> bool {
        let DragState::Dragging { start } = self.drag else {
            return false;
        };
        self.drag = DragState::Idle;
        self.redraw.clear();
        self.preview = None;

        let region = Region::new(start, point);
        if !region.is_well_formed() {
            crate::log_info!(
                "Ignored drag {:?} -> {:?} (not a down-right rectangle)",
                start,
                point
            );
            return false;
        }
        let applied = apply_dual(
            &mut self.display,
            &mut self.source,
            region,
            self.block_size,
            self.scale,
        );
        if applied {
            self.display_generation += 1;
            self.is_dirty = true;
            crate::log_info!(
                "Mosaic {:?} -> {:?} block {} (source x{:.3})",
                start,
                point,
                self.block_size,
                self.scale
            );
        }
        applied
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::mosaic::{Region, mosaic, resize_nearest};
    use image::Rgba;

    fn unique_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([x as u8, y as u8, ((x * 3 + y * 5) % 256) as u8, 255])
        })
    }

    fn session_at_half_scale() -> MosaicSession {
        let source = unique_image(200, 160);
        let display = resize_nearest(&source, 100, 80);
        MosaicSession::from_buffers(display, source, 4)
    }

    #[test]
    fn redraw_queue_schedules_once_and_keeps_last_point() {
        let mut q = RedrawQueue::default();
        assert!(q.push((1, 1)));
        assert!(!q.push((2, 2)));
        assert!(!q.push((3, 4)));
        assert_eq!(q.len(), 3);
        assert!(q.is_tick_scheduled());

        assert_eq!(q.drain_latest(), Some((3, 4)));
        assert!(q.is_empty());
        assert!(!q.is_tick_scheduled());
        assert_eq!(q.drain_latest(), None);

        assert!(q.push((9, 9)));
    }

    #[test]
    fn drag_preview_follows_latest_point_without_mutating() {
        let mut s = session_at_half_scale();
        let display_before = s.display().clone();
        let generation = s.display_generation();

        s.press((10, 10));
        assert!(s.is_dragging());
        assert!(s.drag_to((20, 20)));
        assert!(!s.drag_to((25, 22)));
        assert!(!s.drag_to((30, 31)));

        assert_eq!(s.redraw_tick(), Some(((10, 10), (30, 31))));
        assert_eq!(s.preview_rect(), Some(((10, 10), (30, 31))));
        assert_eq!(s.redraw_tick(), None);

        assert_eq!(s.display(), &display_before);
        assert_eq!(s.display_generation(), generation);
        assert!(!s.is_dirty);
    }

    #[test]
    fn moves_while_idle_are_ignored() {
        let mut s = session_at_half_scale();
        assert!(!s.drag_to((5, 5)));
        assert!(s.redraw_queue().is_empty());
        assert_eq!(s.redraw_tick(), None);
        assert!(!s.release((40, 40)));
        assert!(!s.is_dirty);
    }

    #[test]
    fn release_applies_to_both_buffers() {
        let mut s = session_at_half_scale();
        let mut expected_display = s.display().clone();
        let mut expected_source = s.source().clone();
        assert_eq!(s.scale(), 2.0);

        s.press((0, 0));
        s.drag_to((5, 5));
        assert!(s.release((10, 10)));

        mosaic(&mut expected_display, Region::new((0, 0), (10, 10)), 4);
        mosaic(&mut expected_source, Region::new((0, 0), (20, 20)), 8);
        assert_eq!(s.display(), &expected_display);
        assert_eq!(s.source(), &expected_source);

        assert_eq!(s.drag_state(), DragState::Idle);
        assert!(s.redraw_queue().is_empty());
        assert_eq!(s.preview_rect(), None);
        assert_eq!(s.display_generation(), 2);
        assert!(s.is_dirty);
    }

    #[test]
    fn inverted_drag_is_discarded() {
        let mut s = session_at_half_scale();
        let display_before = s.display().clone();
        let source_before = s.source().clone();

        s.press((50, 50));
        s.drag_to((30, 30));
        assert!(!s.release((10, 10)));
        assert_eq!(s.display(), &display_before);
        assert_eq!(s.source(), &source_before);
        assert_eq!(s.drag_state(), DragState::Idle);
        assert!(!s.is_dirty);

        // Mixed orientation is rejected too.
        s.press((10, 50));
        assert!(!s.release((40, 20)));
        assert_eq!(s.display(), &display_before);
    }

    #[test]
    fn block_size_is_clamped_to_ui_range() {
        let mut s = session_at_half_scale();
        s.set_block_size(1);
        assert_eq!(s.block_size(), BLOCK_SIZE_MIN);
        s.set_block_size(500);
        assert_eq!(s.block_size(), BLOCK_SIZE_MAX);
        s.set_block_size(12);
        assert_eq!(s.block_size(), 12);
    }

    #[test]
    fn new_fits_display_and_computes_scale() {
        let s = MosaicSession::new(unique_image(1600, 900), (800, 600), DEFAULT_BLOCK_SIZE);
        assert_eq!(s.display().dimensions(), (800, 450));
        assert_eq!(s.source().dimensions(), (1600, 900));
        assert_eq!(s.scale(), 2.0);
        assert_eq!(s.block_size(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn title_tracks_dirty_state() {
        let mut s = session_at_half_scale().with_path(PathBuf::from("/tmp/cat.png"));
        assert_eq!(s.display_title(), "cat.png");
        s.press((0, 0));
        s.release((8, 8));
        assert_eq!(s.display_title(), "cat.png*");
        s.mark_clean();
        assert_eq!(s.display_title(), "cat.png");
    }
}

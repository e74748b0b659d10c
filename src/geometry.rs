//! Tile geometry: mapping between linear item indices and tile rectangles.
//!
//! Tiles are laid out row-major, `columns` per row. Tile width is the
//! viewport width divided by the column count; tile height equals the width
//! but is capped by the viewport height, so one tile never exceeds the
//! viewport. There is no horizontal scrolling; the vertical scroll offset
//! shifts every rectangle up by `scroll_y`.
//!
//! All rectangles are in viewport coordinates (origin at the top-left of the
//! visible area). Coordinates are `i64` so that rows far below the viewport
//! never overflow.

use std::ops::Range;

/// A point in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle. `right()` and `bottom()` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Last pixel inside the rectangle (inclusive corner).
    pub fn bottom_right(&self) -> Point {
        Point::new(self.right() - 1, self.bottom() - 1)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Bounding rectangle of both. An empty rectangle is the identity.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }
}

/// Size and scroll position of the visible area, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scroll_y: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scroll_y: 0,
        }
    }

    pub fn with_scroll(self, scroll_y: u32) -> Self {
        Self { scroll_y, ..self }
    }

    /// The viewport itself, in viewport coordinates.
    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i64, self.height as i64)
    }
}

/// Half-open index range `[first, end)` of the items currently visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibleRange {
    pub first: usize,
    pub end: usize,
}

impl VisibleRange {
    pub const EMPTY: VisibleRange = VisibleRange { first: 0, end: 0 };

    pub fn new(first: usize, end: usize) -> Self {
        Self {
            first,
            end: end.max(first),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.end
    }

    pub fn indices(&self) -> Range<usize> {
        self.first..self.end
    }
}

/// Tile layout for one viewport size, column count and scroll offset.
///
/// Constructed only for non-degenerate parameters: a zero column count, or a
/// viewport too small to give tiles a non-zero size, yields `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    viewport: Viewport,
    columns: usize,
    tile_width: u32,
    tile_height: u32,
}

impl TileGeometry {
    pub fn new(viewport: Viewport, columns: usize) -> Option<Self> {
        let cols = u32::try_from(columns).ok().filter(|&c| c > 0)?;
        let tile_width = viewport.width / cols;
        let tile_height = tile_width.min(viewport.height);
        if tile_width == 0 || tile_height == 0 {
            return None;
        }
        Some(Self {
            viewport,
            columns,
            tile_width,
            tile_height,
        })
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Width covered by whole tiles (may be narrower than the viewport).
    fn grid_width(&self) -> i64 {
        self.columns as i64 * self.tile_width as i64
    }

    /// Rectangle of the tile at `index`, in viewport coordinates.
    pub fn rect_for_index(&self, index: usize) -> Rect {
        let col = (index % self.columns) as i64;
        let row = (index / self.columns) as i64;
        let w = self.tile_width as i64;
        let h = self.tile_height as i64;
        Rect::new(col * w, row * h - self.viewport.scroll_y as i64, w, h)
    }

    /// Index of the tile under `point`, or `None` outside `[0, row_count)`.
    pub fn index_for_point(&self, point: Point, row_count: usize) -> Option<usize> {
        let x = point.x;
        let y = point.y + self.viewport.scroll_y as i64;
        if x < 0 || y < 0 {
            return None;
        }
        let col = (x / self.tile_width as i64) as usize;
        if col >= self.columns {
            return None;
        }
        let row = (y / self.tile_height as i64) as usize;
        let index = row.checked_mul(self.columns)?.checked_add(col)?;
        (index < row_count).then_some(index)
    }

    /// Items touched by `rect`.
    ///
    /// Partially covered leading and trailing rows are included. Both corners
    /// are first clamped horizontally into the tiled area, so a strip of
    /// viewport right of the last column does not read as "past the end". A
    /// corner that then hits no item lies either above the content, which
    /// resolves to index 0, or past the last item, which resolves to
    /// `row_count`. Widening the rect therefore never shrinks the range.
    pub fn range_for_rect(&self, rect: Rect, row_count: usize) -> VisibleRange {
        if rect.is_empty() || row_count == 0 {
            return VisibleRange::EMPTY;
        }
        let first = match self.corner_index(rect.top_left(), row_count) {
            Ok(index) => index,
            Err(bound) => bound,
        };
        let end = match self.corner_index(rect.bottom_right(), row_count) {
            Ok(index) => index + 1,
            Err(bound) => bound,
        };
        VisibleRange::new(first, end)
    }

    /// Item under `point` clamped into the tiled width, or the boundary the
    /// point falls beyond.
    fn corner_index(&self, point: Point, row_count: usize) -> Result<usize, usize> {
        let clamped = Point::new(point.x.clamp(0, self.grid_width() - 1), point.y);
        match self.index_for_point(clamped, row_count) {
            Some(index) => Ok(index),
            None if clamped.y + (self.viewport.scroll_y as i64) < 0 => Err(0),
            None => Err(row_count),
        }
    }

    /// Items touched by the whole viewport.
    pub fn visible_range(&self, row_count: usize) -> VisibleRange {
        self.range_for_rect(self.viewport.rect(), row_count)
    }

    /// Number of tiles the viewport can show at once, counting a partially
    /// visible trailing row.
    pub fn visible_capacity(&self) -> usize {
        let rows = self.viewport.height.div_ceil(self.tile_height) as usize;
        rows * self.columns
    }

    /// Total height of the grid for `row_count` items.
    pub fn content_height(&self, row_count: usize) -> u64 {
        let rows = row_count.div_ceil(self.columns) as u64;
        rows * self.tile_height as u64
    }

    /// Maximum scroll offset.
    pub fn max_scroll(&self, row_count: usize) -> u32 {
        let max = self
            .content_height(row_count)
            .saturating_sub(self.viewport.height as u64);
        u32::try_from(max).unwrap_or(u32::MAX)
    }
}

/// Range visible in `viewport`, or empty when the geometry is degenerate.
pub fn visible_range(viewport: Viewport, columns: usize, row_count: usize) -> VisibleRange {
    TileGeometry::new(viewport, columns)
        .map(|g| g.visible_range(row_count))
        .unwrap_or(VisibleRange::EMPTY)
}

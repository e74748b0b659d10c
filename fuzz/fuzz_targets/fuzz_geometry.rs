#![no_main]

use gridload::geometry::{Point, Rect, TileGeometry, Viewport};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (u16, u16, u32, u8, u16, (i32, i32, i32, i32))| {
    let (width, height, scroll_y, columns, row_count, (x, y, w, h)) = data;
    let viewport = Viewport::new(width as u32, height as u32).with_scroll(scroll_y);
    let Some(geometry) = TileGeometry::new(viewport, columns as usize) else {
        return;
    };
    let row_count = row_count as usize;

    let rect = Rect::new(x as i64, y as i64, w as i64, h as i64);
    let range = geometry.range_for_rect(rect, row_count);
    assert!(range.first <= range.end);
    assert!(range.end <= row_count);
    let _ = geometry.index_for_point(Point::new(x as i64, y as i64), row_count);

    let visible = geometry.visible_range(row_count);
    assert!(visible.end <= row_count);

    // Every item maps back to itself through the center of its tile.
    for index in visible.indices() {
        let center = geometry.rect_for_index(index).center();
        assert_eq!(geometry.index_for_point(center, row_count), Some(index));
    }
});

#![no_main]

use gridload::cache::{ImageCache, Resolved};
use gridload::decode::Image;
use image::{DynamicImage, RgbaImage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (u8, Vec<(u8, u8, bool)>)| {
    let (capacity, ops) = data;
    let image = Image::new(DynamicImage::ImageRgba8(RgbaImage::new(1, 1)));
    let mut cache = ImageCache::new(capacity as usize);

    for (key, cost, resize) in ops {
        if resize {
            // Shrinking never evicts by itself; only the next insert trims.
            cache.set_capacity(cost as usize);
            continue;
        }
        let value = if key % 7 == 0 {
            Resolved::Failed("fuzz".into())
        } else {
            Resolved::Loaded(image.clone())
        };
        cache.insert_with_cost(format!("k{key}"), value, (cost % 8) as usize);
        assert!(cache.total_cost() <= cache.capacity());
        assert_eq!(cache.keys().count(), cache.len());
    }
});

// ============================================================================
// MOSAIC — region pixelation by nearest-neighbour down/up resampling
// ============================================================================
//
// The region is cropped, shrunk to (w / block, h / block) and blown back up to
// (w, h), both passes sampling the pixel whose centre is nearest. The result is
// pasted over the original rectangle. Nothing outside the rectangle is read
// back or written.
//
// `apply_dual` runs the same transform on the on-screen copy and on the
// full-resolution original so the two never drift apart.
// ============================================================================

use image::{RgbaImage, imageops};

/// Axis-aligned rectangle in pixel coordinates. `start` is inclusive, `end`
/// exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl Region {
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        Self { start, end }
    }

    /// True when `end` lies strictly right of and below `start`.
    /// Inverted or zero-area drags are not normalized; they are rejected.
    pub fn is_well_formed(&self) -> bool {
        self.end.0 > self.start.0 && self.end.1 > self.start.1
    }

    pub fn width(&self) -> u32 {
        self.end.0.saturating_sub(self.start.0)
    }

    pub fn height(&self) -> u32 {
        self.end.1.saturating_sub(self.start.1)
    }

    /// Multiply every coordinate by `scale`, truncating toward zero.
    pub fn scaled(&self, scale: f64) -> Region {
        let s = |v: u32| (v as f64 * scale) as u32;
        Region {
            start: (s(self.start.0), s(self.start.1)),
            end: (s(self.end.0), s(self.end.1)),
        }
    }

    /// Clip to a `width`×`height` buffer. `None` when the region is malformed
    /// or nothing of it is left inside the buffer.
    pub fn clipped(&self, width: u32, height: u32) -> Option<Region> {
        if !self.is_well_formed() {
            return None;
        }
        let clipped = Region {
            start: (self.start.0.min(width), self.start.1.min(height)),
            end: (self.end.0.min(width), self.end.1.min(height)),
        };
        clipped.is_well_formed().then_some(clipped)
    }
}

/// Size of the intermediate grid for a `width`×`height` region.
/// Each axis is at least one block even when `block_size` exceeds it.
pub fn reduced_size(width: u32, height: u32, block_size: u32) -> (u32, u32) {
    let bs = block_size.max(1);
    ((width / bs).max(1), (height / bs).max(1))
}

/// Block size on the source buffer for a display-space `block_size`.
pub fn scaled_block_size(block_size: u32, scale: f64) -> u32 {
    ((block_size as f64 * scale) as u32).max(1)
}

/// Index of the source pixel whose centre is nearest to the centre of
/// destination pixel `dst` when stretching `src_len` pixels over `dst_len`.
fn nearest_index(dst: u32, dst_len: u32, src_len: u32) -> u32 {
    let idx = ((2 * dst as u64 + 1) * src_len as u64) / (2 * dst_len as u64);
    idx.min(src_len as u64 - 1) as u32
}

/// Nearest-neighbour resample of `src` to `new_w`×`new_h`.
pub fn resize_nearest(src: &RgbaImage, new_w: u32, new_h: u32) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 || new_w == 0 || new_h == 0 {
        return RgbaImage::new(new_w, new_h);
    }
    RgbaImage::from_fn(new_w, new_h, |x, y| {
        *src.get_pixel(nearest_index(x, new_w, w), nearest_index(y, new_h, h))
    })
}

/// Pixelate `region` of `buffer` in place with cells of `block_size` pixels.
///
/// Malformed regions leave the buffer untouched, regions reaching past the
/// edge are clipped, and a `block_size` of 0 behaves like 1.
pub fn mosaic(buffer: &mut RgbaImage, region: Region, block_size: u32) -> &mut RgbaImage {
    let Some(r) = region.clipped(buffer.width(), buffer.height()) else {
        return buffer;
    };
    let (w, h) = (r.width(), r.height());
    let (small_w, small_h) = reduced_size(w, h, block_size);

    let patch = imageops::crop_imm(&*buffer, r.start.0, r.start.1, w, h).to_image();
    let small = resize_nearest(&patch, small_w, small_h);
    let blocky = resize_nearest(&small, w, h);
    imageops::replace(buffer, &blocky, r.start.0 as i64, r.start.1 as i64);
    buffer
}

/// Mosaic the same area of the display buffer and the full-resolution source.
///
/// `region` and `block_size` are in display pixels; `scale` is
/// source width / display width. Returns `false` (and touches neither buffer)
/// when the region is malformed.
pub fn apply_dual(
    display: &mut RgbaImage,
    source: &mut RgbaImage,
    region: Region,
    block_size: u32,
    scale: f64,
) -> bool {
    if !region.is_well_formed() {
        return false;
    }
    mosaic(display, region, block_size);
    mosaic(source, region.scaled(scale), scaled_block_size(block_size, scale));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::collections::HashSet;

    /// Every pixel a different colour.
    fn unique_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([x as u8, y as u8, ((x * 7 + y * 13) % 256) as u8, 255])
        })
    }

    fn solid_image(w: u32, h: u32, c: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(c))
    }

    fn assert_outside_unchanged(before: &RgbaImage, after: &RgbaImage, r: Region) {
        for (x, y, px) in after.enumerate_pixels() {
            let inside = x >= r.start.0 && x < r.end.0 && y >= r.start.1 && y < r.end.1;
            if !inside {
                assert_eq!(px, before.get_pixel(x, y), "pixel ({x},{y}) outside region changed");
            }
        }
    }

    #[test]
    fn pixels_outside_region_untouched() {
        let before = unique_image(64, 48);
        for (r, b) in [
            (Region::new((5, 7), (30, 40)), 4),
            (Region::new((0, 0), (64, 48)), 9),
            (Region::new((63, 47), (64, 48)), 3),
            (Region::new((10, 3), (11, 45)), 1),
        ] {
            let mut img = before.clone();
            mosaic(&mut img, r, b);
            assert_outside_unchanged(&before, &img, r);
        }
    }

    /// Widths 1..=60 against a few heights and every block size up to 25,
    /// including sizes that do not divide the region evenly.
    fn region_grid() -> impl Iterator<Item = (Region, u32)> {
        (1..=60u32).flat_map(|w| {
            [1u32, 7, 23, 60].into_iter().flat_map(move |h| {
                (1..=25u32).map(move |b| (Region::new((2, 1), (2 + w, 1 + h)), b))
            })
        })
    }

    #[test]
    fn region_has_bounded_number_of_colours() {
        let before = unique_image(64, 64);
        for (r, b) in region_grid() {
            let mut img = before.clone();
            mosaic(&mut img, r, b);

            let mut colours = HashSet::new();
            for y in r.start.1..r.end.1 {
                for x in r.start.0..r.end.0 {
                    colours.insert(img.get_pixel(x, y).0);
                }
            }
            let bound = r.width().div_ceil(b) * r.height().div_ceil(b);
            assert!(
                colours.len() as u32 <= bound,
                "{}x{} block {}: {} colours > {}",
                r.width(),
                r.height(),
                b,
                colours.len(),
                bound
            );
        }
    }

    #[test]
    fn second_application_is_a_no_op() {
        let before = unique_image(64, 64);
        for (r, b) in region_grid() {
            let mut img = before.clone();
            mosaic(&mut img, r, b);
            let once = img.clone();
            mosaic(&mut img, r, b);
            assert!(img == once, "{}x{} block {} changed on reapply", r.width(), r.height(), b);
        }
    }

    #[test]
    fn solid_image_twenty_pixel_region_block_ten() {
        let colour = [200, 30, 90, 255];
        let mut img = solid_image(100, 100, colour);
        mosaic(&mut img, Region::new((0, 0), (20, 20)), 10);
        assert_eq!(reduced_size(20, 20, 10), (2, 2));
        assert!(img.pixels().all(|p| p.0 == colour));
    }

    #[test]
    fn twenty_pixel_region_block_ten_forms_four_uniform_blocks() {
        let mut img = unique_image(100, 100);
        mosaic(&mut img, Region::new((0, 0), (20, 20)), 10);

        let mut block_colours = Vec::new();
        for by in 0..2 {
            for bx in 0..2 {
                let c = *img.get_pixel(bx * 10, by * 10);
                for y in by * 10..by * 10 + 10 {
                    for x in bx * 10..bx * 10 + 10 {
                        assert_eq!(
                            *img.get_pixel(x, y),
                            c,
                            "block ({bx},{by}) not uniform at ({x},{y})"
                        );
                    }
                }
                block_colours.push(c);
            }
        }
        // Each block takes the colour at its centre sample.
        let src = unique_image(100, 100);
        assert_eq!(block_colours[0], *src.get_pixel(5, 5));
        assert_eq!(block_colours[1], *src.get_pixel(15, 5));
        assert_eq!(block_colours[2], *src.get_pixel(5, 15));
        assert_eq!(block_colours[3], *src.get_pixel(15, 15));
    }

    #[test]
    fn block_larger_than_region_collapses_to_one_colour() {
        let mut img = unique_image(40, 40);
        let r = Region::new((10, 10), (16, 13));
        assert_eq!(reduced_size(6, 3, 50), (1, 1));
        mosaic(&mut img, r, 50);
        let c = *img.get_pixel(10, 10);
        for y in 10..13 {
            for x in 10..16 {
                assert_eq!(*img.get_pixel(x, y), c);
            }
        }
    }

    #[test]
    fn zero_block_size_behaves_like_one() {
        let before = unique_image(20, 20);
        let mut img = before.clone();
        mosaic(&mut img, Region::new((2, 2), (18, 18)), 0);
        assert_eq!(img, before);
    }

    #[test]
    fn region_past_edge_is_clipped() {
        let before = unique_image(30, 30);
        let mut img = before.clone();
        mosaic(&mut img, Region::new((20, 20), (90, 90)), 5);
        assert_outside_unchanged(&before, &img, Region::new((20, 20), (30, 30)));
        assert_ne!(img, before);
    }

    #[test]
    fn malformed_regions_are_rejected() {
        assert!(!Region::new((50, 50), (10, 10)).is_well_formed());
        assert!(!Region::new((10, 10), (10, 30)).is_well_formed());
        assert!(!Region::new((10, 30), (40, 30)).is_well_formed());
        assert!(Region::new((10, 10), (11, 11)).is_well_formed());

        let before = unique_image(60, 60);
        let mut img = before.clone();
        mosaic(&mut img, Region::new((50, 50), (10, 10)), 4);
        assert_eq!(img, before);
    }

    #[test]
    fn apply_dual_rejects_inverted_region() {
        let display_before = unique_image(60, 60);
        let source_before = unique_image(120, 120);
        let mut display = display_before.clone();
        let mut source = source_before.clone();

        let inverted = Region::new((50, 50), (10, 10));
        let applied = apply_dual(&mut display, &mut source, inverted, 5, 2.0);
        assert!(!applied);
        assert_eq!(display, display_before);
        assert_eq!(source, source_before);
    }

    #[test]
    fn apply_dual_scales_region_and_block() {
        let source_before = unique_image(200, 200);
        let display_before = resize_nearest(&source_before, 100, 100);
        let mut display = display_before.clone();
        let mut source = source_before.clone();

        let r = Region::new((0, 0), (10, 10));
        assert!(apply_dual(&mut display, &mut source, r, 4, 2.0));

        let source_region = r.scaled(2.0);
        assert_eq!(source_region, Region::new((0, 0), (20, 20)));
        assert_eq!(scaled_block_size(4, 2.0), 8);

        let mut expected_source = source_before.clone();
        mosaic(&mut expected_source, source_region, 8);
        assert_eq!(source, expected_source);
        assert_outside_unchanged(&source_before, &source, source_region);

        let mut expected_display = display_before.clone();
        mosaic(&mut expected_display, r, 4);
        assert_eq!(display, expected_display);
    }

    #[test]
    fn fractional_scale_truncates() {
        let r = Region::new((3, 7), (11, 13)).scaled(1.5);
        assert_eq!(r, Region::new((4, 10), (16, 19)));
        assert_eq!(scaled_block_size(5, 1.5), 7);
        assert_eq!(scaled_block_size(1, 0.4), 1);
    }

    #[test]
    fn resize_nearest_picks_centre_samples() {
        let src = unique_image(20, 1);
        let small = resize_nearest(&src, 2, 1);
        assert_eq!(*small.get_pixel(0, 0), *src.get_pixel(5, 0));
        assert_eq!(*small.get_pixel(1, 0), *src.get_pixel(15, 0));

        let big = resize_nearest(&small, 20, 1);
        for x in 0..10 {
            assert_eq!(*big.get_pixel(x, 0), *small.get_pixel(0, 0));
        }
        for x in 10..20 {
            assert_eq!(*big.get_pixel(x, 0), *small.get_pixel(1, 0));
        }
    }
}

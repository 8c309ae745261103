//! Star centroid extraction from a raster (C2).
//!
//! Grounded on the reference repo's own threshold + connected-component +
//! moment-centroid detector (`domain::plate_solve::detect_stars`), adapted
//! from float FITS planes to 8-bit RGBA pixels per-channel thresholding.

use std::collections::VecDeque;

use ndarray::Array2;

use crate::raster::Raster;

/// Default per-channel detection threshold (§4.2).
pub const DEFAULT_THRESHOLD: u8 = 180;
const DEFAULT_MIN_SIZE: usize = 2;
const DEFAULT_MAX_SIZE: usize = 500;
const ADAPTIVE_FLOOR: u8 = 150;
const ADAPTIVE_STEP: u8 = 10;
const BRIGHTEST_PIXEL_FLOOR: u8 = 200;

const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1), (0, 1),
    (1, -1), (1, 0), (1, 1),
];

/// A detected stellar centroid.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Star {
    pub x: f64,
    pub y: f64,
    pub brightness: f64,
    pub size: u32,
}

impl Star {
    pub fn point(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

fn qualifies(raster: &Raster, x: u32, y: u32, threshold: u8) -> bool {
    let px = raster.rgba(x, y);
    px[0] > threshold && px[1] > threshold && px[2] > threshold
}

fn pixel_brightness(px: [u8; 4]) -> f64 {
    (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0
}

/// Threshold + 8-connectivity flood fill + moment-centroid detector (§4.2).
///
/// Never fails: an image with no qualifying blob yields an empty list.
pub fn detect(raster: &Raster, threshold: u8) -> Vec<Star> {
    detect_bounded(raster, threshold, DEFAULT_MIN_SIZE, DEFAULT_MAX_SIZE)
}

fn detect_bounded(raster: &Raster, threshold: u8, min_size: usize, max_size: usize) -> Vec<Star> {
    let (w, h) = raster.dims();
    let (w, h) = (w as usize, h as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let mut visited = Array2::<bool>::from_elem((h, w), false);
    let mut stars = Vec::new();

    for y0 in 0..h {
        for x0 in 0..w {
            if visited[[y0, x0]] || !qualifies(raster, x0 as u32, y0 as u32, threshold) {
                continue;
            }

            let mut queue = VecDeque::new();
            let mut member_x = Vec::new();
            let mut member_y = Vec::new();
            let mut member_b = Vec::new();

            queue.push_back((x0, y0));
            visited[[y0, x0]] = true;

            while let Some((cx, cy)) = queue.pop_front() {
                let px = raster.rgba(cx as u32, cy as u32);
                member_x.push(cx as f64);
                member_y.push(cy as f64);
                member_b.push(pixel_brightness(px));

                for (dx, dy) in NEIGHBORS_8 {
                    let nx = cx as i32 + dx;
                    let ny = cy as i32 + dy;
                    if nx < 0 || ny < 0 || nx as usize >= w || ny as usize >= h {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    if visited[[ny, nx]] {
                        continue;
                    }
                    if qualifies(raster, nx as u32, ny as u32, threshold) {
                        visited[[ny, nx]] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            let size = member_b.len();
            if size < min_size || size > max_size {
                continue;
            }

            let total_brightness: f64 = member_b.iter().sum();
            if total_brightness <= 0.0 {
                continue;
            }

            let cx = member_x
                .iter()
                .zip(&member_b)
                .map(|(x, b)| x * b)
                .sum::<f64>()
                / total_brightness;
            let cy = member_y
                .iter()
                .zip(&member_b)
                .map(|(y, b)| y * b)
                .sum::<f64>()
                / total_brightness;

            stars.push(Star {
                x: cx,
                y: cy,
                brightness: total_brightness,
                size: size as u32,
            });
        }
    }

    stars.sort_by(|a, b| {
        b.brightness
            .partial_cmp(&a.brightness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    stars
}

/// Repeats detection at decreasing thresholds until at least `min_stars` are
/// found or the threshold floor is reached (§4.2 adaptive variant).
pub fn detect_adaptive(raster: &Raster, start_threshold: u8, min_stars: usize) -> Vec<Star> {
    let mut threshold = start_threshold;
    let mut result = detect(raster, threshold);

    while result.len() < min_stars && threshold > ADAPTIVE_FLOOR {
        threshold = threshold.saturating_sub(ADAPTIVE_STEP).max(ADAPTIVE_FLOOR);
        let next = detect(raster, threshold);
        result = next;
        if threshold == ADAPTIVE_FLOOR {
            break;
        }
    }

    result
}

/// Degenerate single-pixel detector used by the minimal-assumption strategy:
/// accepts only pixels where R=G=B=threshold, walking the threshold down
/// from 255 to a floor of 200 until at least one pixel is found.
pub fn detect_brightest_pixels(raster: &Raster) -> Vec<Star> {
    let (w, h) = raster.dims();
    let mut threshold = 255u8;

    loop {
        let mut stars = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let px = raster.rgba(x, y);
                if px[0] == threshold && px[1] == threshold && px[2] == threshold {
                    stars.push(Star {
                        x: x as f64,
                        y: y as f64,
                        brightness: pixel_brightness(px),
                        size: 1,
                    });
                }
            }
        }
        if !stars.is_empty() || threshold == BRIGHTEST_PIXEL_FLOOR {
            stars.sort_by(|a, b| {
                b.brightness
                    .partial_cmp(&a.brightness)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            return stars;
        }
        threshold -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_raster(w: u32, h: u32) -> Raster {
        Raster::new(w, h)
    }

    fn draw_square(raster: &mut Raster, cx: u32, cy: u32, half: u32, value: u8) {
        let (w, h) = raster.dims();
        for dy in 0..=2 * half {
            for dx in 0..=2 * half {
                let x = cx as i64 - half as i64 + dx as i64;
                let y = cy as i64 - half as i64 + dy as i64;
                if x < 0 || y < 0 || x as u32 >= w || y as u32 >= h {
                    continue;
                }
                raster.set_rgba(x as u32, y as u32, [value, value, value, 255]);
            }
        }
    }

    #[test]
    fn empty_image_yields_no_stars() {
        let raster = flat_raster(32, 32);
        assert!(detect(&raster, DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn single_square_centroid_is_exact() {
        let mut raster = flat_raster(40, 40);
        draw_square(&mut raster, 20, 15, 2, 255);
        let stars = detect(&raster, DEFAULT_THRESHOLD);
        assert_eq!(stars.len(), 1);
        assert!((stars[0].x - 20.0).abs() < 0.01);
        assert!((stars[0].y - 15.0).abs() < 0.01);
        assert_eq!(stars[0].size, 25);
    }

    #[test]
    fn brighter_blob_sorts_first() {
        let mut raster = flat_raster(60, 30);
        draw_square(&mut raster, 10, 10, 1, 190);
        draw_square(&mut raster, 45, 20, 1, 255);
        let stars = detect(&raster, DEFAULT_THRESHOLD);
        assert_eq!(stars.len(), 2);
        assert!(stars[0].brightness > stars[1].brightness);
        assert!((stars[0].x - 45.0).abs() < 0.01);
    }

    #[test]
    fn size_outside_bounds_is_discarded() {
        let mut raster = flat_raster(10, 10);
        raster.set_rgba(5, 5, [255, 255, 255, 255]);
        // size 1 < DEFAULT_MIN_SIZE(2) is discarded
        assert!(detect(&raster, DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn adaptive_detector_lowers_threshold_until_target_met() {
        let mut raster = flat_raster(50, 50);
        draw_square(&mut raster, 10, 10, 1, 255);
        draw_square(&mut raster, 30, 30, 1, 165);
        let stars = detect_adaptive(&raster, 180, 2);
        assert!(stars.len() >= 2);
    }

    #[test]
    fn brightest_pixel_variant_finds_saturated_pixels() {
        let mut raster = flat_raster(10, 10);
        raster.set_rgba(3, 3, [255, 255, 255, 255]);
        raster.set_rgba(7, 7, [255, 255, 255, 255]);
        let stars = detect_brightest_pixels(&raster);
        assert_eq!(stars.len(), 2);
        assert!(stars.iter().all(|s| s.size == 1));
    }

    #[test]
    fn brightest_pixel_variant_walks_threshold_down() {
        let mut raster = flat_raster(10, 10);
        raster.set_rgba(4, 4, [210, 210, 210, 255]);
        let stars = detect_brightest_pixels(&raster);
        assert_eq!(stars.len(), 1);
        assert!((stars[0].x - 4.0).abs() < 1e-9);
    }
}

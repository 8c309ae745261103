//! Stack reducers (C5): combine aligned rasters into one output raster.
//!
//! Grounded on the reference repo's `domain::stacking::sigma_clip_combine`
//! for the iterative-clip shape, adjusted to use population standard
//! deviation rather than the reference's sample variance, per the exact
//! clipping rule this pipeline requires. The per-pixel-column median scan
//! follows the `select_nth_unstable_by` idiom from `domain::stats` and
//! `domain::calibration`'s master-frame combine.

use crate::error::StackError;
use crate::raster::Raster;

/// Which reducer to apply when combining an aligned stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reducer {
    Average,
    Median,
    Sigma { k: f32 },
    Laplacian,
}

impl Default for Reducer {
    fn default() -> Self {
        Reducer::Sigma { k: 2.0 }
    }
}

const ALPHA_VALID_THRESHOLD: u8 = 128;

/// Combines `frames` (aligned to a common grid, some entries possibly
/// absent because a strategy excluded them) into one raster.
pub fn reduce(frames: &[Option<Raster>], reducer: Reducer) -> Result<Raster, StackError> {
    let (w, h) = frames
        .iter()
        .flatten()
        .next()
        .map(|r| r.dims())
        .ok_or(StackError::NoValidInput)?;

    if frames.iter().flatten().any(|r| r.dims() != (w, h)) {
        return Err(StackError::InvalidInput("frame dimension mismatch in reducer".into()));
    }

    match reducer {
        Reducer::Average => reduce_average(frames, w, h),
        Reducer::Median => reduce_median(frames, w, h),
        Reducer::Sigma { k } => reduce_sigma(frames, w, h, k),
        Reducer::Laplacian => reduce_laplacian(frames, w, h),
    }
}

fn contributing_values(frames: &[Option<Raster>], x: u32, y: u32, channel: usize) -> Vec<f32> {
    frames
        .iter()
        .flatten()
        .filter(|r| r.alpha(x, y) > ALPHA_VALID_THRESHOLD)
        .map(|r| r.rgba(x, y)[channel] as f32)
        .collect()
}

fn reduce_average(frames: &[Option<Raster>], w: u32, h: u32) -> Result<Raster, StackError> {
    let mut out = Raster::new(w, h);
    let mut any_contributor = false;

    for y in 0..h {
        for x in 0..w {
            let mut px = [0u8; 4];
            let mut contributed = false;
            for c in 0..3 {
                let values = contributing_values(frames, x, y, c);
                if values.is_empty() {
                    continue;
                }
                contributed = true;
                let mean = values.iter().sum::<f32>() / values.len() as f32;
                px[c] = mean.round().clamp(0.0, 255.0) as u8;
            }
            if contributed {
                px[3] = 255;
                out.set_rgba(x, y, px);
                any_contributor = true;
            }
        }
    }

    if !any_contributor {
        return Err(StackError::NoValidInput);
    }
    Ok(out)
}

fn median_of(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn reduce_median(frames: &[Option<Raster>], w: u32, h: u32) -> Result<Raster, StackError> {
    let mut out = Raster::new(w, h);
    let mut any_contributor = false;

    for y in 0..h {
        for x in 0..w {
            let mut px = [0u8; 4];
            let mut contributed = false;
            for c in 0..3 {
                let mut values = contributing_values(frames, x, y, c);
                if values.is_empty() {
                    continue;
                }
                contributed = true;
                px[c] = median_of(&mut values).round().clamp(0.0, 255.0) as u8;
            }
            if contributed {
                px[3] = 255;
                out.set_rgba(x, y, px);
                any_contributor = true;
            }
        }
    }

    if !any_contributor {
        return Err(StackError::NoValidInput);
    }
    Ok(out)
}

fn sigma_clip_channel(values: &[f32], k: f32) -> f32 {
    let n = values.len();
    if n < 3 {
        return values.iter().sum::<f32>() / n as f32;
    }

    let mean = values.iter().sum::<f32>() / n as f32;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32;
    let sigma = variance.sqrt();

    if sigma == 0.0 {
        return mean;
    }

    let kept: Vec<f32> = values.iter().copied().filter(|v| (v - mean).abs() < k * sigma).collect();

    if kept.is_empty() {
        let mut sorted = values.to_vec();
        return median_of(&mut sorted);
    }

    kept.iter().sum::<f32>() / kept.len() as f32
}

fn reduce_sigma(frames: &[Option<Raster>], w: u32, h: u32, k: f32) -> Result<Raster, StackError> {
    let mut out = Raster::new(w, h);
    let mut any_contributor = false;

    for y in 0..h {
        for x in 0..w {
            let mut px = [0u8; 4];
            let mut contributed = false;
            for c in 0..3 {
                let values = contributing_values(frames, x, y, c);
                if values.is_empty() {
                    continue;
                }
                contributed = true;
                px[c] = sigma_clip_channel(&values, k).round().clamp(0.0, 255.0) as u8;
            }
            if contributed {
                px[3] = 255;
                out.set_rgba(x, y, px);
                any_contributor = true;
            }
        }
    }

    if !any_contributor {
        return Err(StackError::NoValidInput);
    }
    Ok(out)
}

fn luminance(px: [u8; 4]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

/// 8-neighborhood Laplacian magnitude map for one frame's grayscale plane.
fn laplacian_map(raster: &Raster) -> Vec<f32> {
    let (w, h) = raster.dims();
    let (w, h) = (w as i64, h as i64);
    let mut map = vec![0.0f32; (w * h) as usize];

    let lum_at = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, w - 1) as u32;
        let cy = y.clamp(0, h - 1) as u32;
        luminance(raster.rgba(cx, cy))
    };

    for y in 0..h {
        for x in 0..w {
            let center = lum_at(x, y);
            let mut sum_neighbors = 0.0;
            for (dx, dy) in [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)] {
                sum_neighbors += lum_at(x + dx, y + dy);
            }
            let laplacian = 8.0 * center - sum_neighbors;
            map[(y * w + x) as usize] = laplacian.abs();
        }
    }

    map
}

fn reduce_laplacian(frames: &[Option<Raster>], w: u32, h: u32) -> Result<Raster, StackError> {
    let maps: Vec<Option<Vec<f32>>> = frames.iter().map(|f| f.as_ref().map(laplacian_map)).collect();

    let mut out = Raster::new(w, h);
    let mut any_contributor = false;

    for y in 0..h {
        for x in 0..w {
            let idx = (y as i64 * w as i64 + x as i64) as usize;
            let mut best: Option<(f32, [u8; 3])> = None;

            for (frame, map) in frames.iter().zip(maps.iter()) {
                let (Some(raster), Some(map)) = (frame, map) else { continue };
                if raster.alpha(x, y) <= ALPHA_VALID_THRESHOLD {
                    continue;
                }
                let score = map[idx];
                let rgb = raster.rgba(x, y);
                let rgb3 = [rgb[0], rgb[1], rgb[2]];
                if best.map(|(b, _)| score > b).unwrap_or(true) {
                    best = Some((score, rgb3));
                }
            }

            if let Some((_, rgb)) = best {
                out.set_rgba(x, y, [rgb[0], rgb[1], rgb[2], 255]);
                any_contributor = true;
            }
        }
    }

    if !any_contributor {
        return Err(StackError::NoValidInput);
    }
    Ok(out)
}

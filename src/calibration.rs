//! Calibration-frame arithmetic (§4.7, pre-core, optional).
//!
//! Grounded on the reference repo's `domain::calibration` master-frame
//! combine (per-pixel median over a column of same-sized frames via
//! `select_nth_unstable_by`) and bias/dark/flat correction chain, adapted
//! from `Array2<f32>` FITS planes to `Raster`/RGBA. Pure functions; not
//! part of the `stack()` contract.

use crate::error::StackError;
use crate::raster::Raster;

fn require_matching_dims(rasters: &[Raster]) -> Result<(u32, u32), StackError> {
    let first = rasters.first().ok_or_else(|| StackError::InvalidInput("no frames to combine".into()))?;
    let dims = first.dims();
    if rasters.iter().any(|r| r.dims() != dims) {
        return Err(StackError::InvalidInput("calibration frame dimension mismatch".into()));
    }
    Ok(dims)
}

fn median_combine(rasters: &[Raster]) -> Result<Raster, StackError> {
    let (w, h) = require_matching_dims(rasters)?;
    let mut out = Raster::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut px = [0u8; 4];
            for c in 0..3 {
                let mut column: Vec<u8> = rasters.iter().map(|r| r.rgba(x, y)[c]).collect();
                let mid = column.len() / 2;
                let (_, median, _) = column.select_nth_unstable(mid);
                px[c] = *median;
            }
            px[3] = 255;
            out.set_rgba(x, y, px);
        }
    }
    Ok(out)
}

/// Builds a master bias from a stack of bias frames (per-pixel median).
pub fn create_master_bias(frames: &[Raster]) -> Result<Raster, StackError> {
    median_combine(frames)
}

/// Builds a master dark from a stack of dark frames (per-pixel median).
pub fn create_master_dark(frames: &[Raster]) -> Result<Raster, StackError> {
    median_combine(frames)
}

/// Builds a master flat from a stack of flat frames, normalized so its mean
/// channel value is 128 (mid-gray) after the median combine.
pub fn create_master_flat(frames: &[Raster]) -> Result<Raster, StackError> {
    let combined = median_combine(frames)?;
    let (w, h) = combined.dims();
    let mut sum = 0.0f64;
    let mut count = 0u64;
    for y in 0..h {
        for x in 0..w {
            let px = combined.rgba(x, y);
            sum += (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0;
            count += 1;
        }
    }
    if count == 0 || sum == 0.0 {
        return Ok(combined);
    }
    let mean = sum / count as f64;
    let scale = 128.0 / mean;

    let mut normalized = Raster::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let px = combined.rgba(x, y);
            let mut out = [0u8; 4];
            for c in 0..3 {
                out[c] = (px[c] as f64 * scale).round().clamp(0.0, 255.0) as u8;
            }
            out[3] = 255;
            normalized.set_rgba(x, y, out);
        }
    }
    Ok(normalized)
}

/// Subtracts a master bias from a raw frame, clamping at black.
pub fn subtract_bias(raw: &Raster, bias: &Raster) -> Result<Raster, StackError> {
    subtract(raw, bias)
}

/// Subtracts a master dark from a raw frame, clamping at black.
pub fn subtract_dark(raw: &Raster, dark: &Raster) -> Result<Raster, StackError> {
    subtract(raw, dark)
}

fn subtract(raw: &Raster, frame: &Raster) -> Result<Raster, StackError> {
    if raw.dims() != frame.dims() {
        return Err(StackError::InvalidInput("calibration frame dimension mismatch".into()));
    }
    let (w, h) = raw.dims();
    let mut out = Raster::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let a = raw.rgba(x, y);
            let b = frame.rgba(x, y);
            let mut px = [0u8; 4];
            for c in 0..3 {
                px[c] = a[c].saturating_sub(b[c]);
            }
            px[3] = 255;
            out.set_rgba(x, y, px);
        }
    }
    Ok(out)
}

/// Divides a raw frame by a normalized master flat (flat-fielding).
pub fn divide_flat(raw: &Raster, flat: &Raster) -> Result<Raster, StackError> {
    if raw.dims() != flat.dims() {
        return Err(StackError::InvalidInput("calibration frame dimension mismatch".into()));
    }
    let (w, h) = raw.dims();
    let mut out = Raster::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let a = raw.rgba(x, y);
            let f = flat.rgba(x, y);
            let mut px = [0u8; 4];
            for c in 0..3 {
                let divisor = (f[c] as f64 / 128.0).max(0.01);
                px[c] = (a[c] as f64 / divisor).round().clamp(0.0, 255.0) as u8;
            }
            px[3] = 255;
            out.set_rgba(x, y, px);
        }
    }
    Ok(out)
}

/// Full calibration chain: bias subtraction, dark subtraction, flat
/// division, in that order. Any master omitted (`None`) is skipped.
pub fn calibrate(raw: &Raster, bias: Option<&Raster>, dark: Option<&Raster>, flat: Option<&Raster>) -> Result<Raster, StackError> {
    let mut current = raw.clone();
    if let Some(bias) = bias {
        current = subtract_bias(&current, bias)?;
    }
    if let Some(dark) = dark {
        current = subtract_dark(&current, dark)?;
    }
    if let Some(flat) = flat {
        current = divide_flat(&current, flat)?;
    }
    Ok(current)
}

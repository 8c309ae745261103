//! Orchestrator entry point (§2, §6): ties the detector, strategies, warp
//! and reducer together behind the single `stack()` call.
//!
//! Grounded on the reference repo's `domain::pipeline::run_pipeline`
//! orchestration shape (detect -> align -> combine, reporting progress
//! between stages) and `commands::helpers`' anyhow-to-boundary-error
//! conversion idiom, adapted to the thiserror `StackError` boundary.

use crate::config::StackConfig;
use crate::error::{StackError, StackResult};
use crate::progress::{CancelToken, NullObserver, Observer};
use crate::raster::Raster;
use crate::reduce::{self, Reducer};
use crate::strategies::{self, Registration};
use crate::warp;

/// Registers and reduces `frames` into a single raster.
///
/// `frames.len() >= 2` is required. Progress and log messages are reported
/// on `observer` and never affect the result. `cancel` is polled between
/// frames and between reducer bands (§5); a cancellation mid-call aborts
/// with [`StackError::Cancelled`] and discards all partial state.
pub fn stack(
    frames: &[Raster],
    alignment: crate::config::AlignmentStrategy,
    reducer: Reducer,
    cfg: &StackConfig,
    observer: &dyn Observer,
    cancel: &CancelToken,
) -> StackResult<Raster> {
    if frames.len() < 2 {
        return Err(StackError::InvalidInput("stack requires at least 2 frames".into()));
    }
    if frames.iter().any(|f| f.width() == 0 || f.height() == 0) {
        return Err(StackError::InvalidInput("empty frame in input".into()));
    }
    cfg.validate()?;

    observer.log("registering frames");
    let Registration { reference_index, transforms } = strategies::register(frames, alignment, cfg)?;
    observer.progress(0.4);

    let (ref_w, ref_h) = frames[reference_index].dims();

    let mut warped: Vec<Option<Raster>> = Vec::with_capacity(frames.len());
    for (i, maybe_xf) in transforms.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(StackError::Cancelled);
        }

        match maybe_xf {
            None => {
                observer.log(&format!("frame {i} excluded: no usable transform"));
                warped.push(None);
            }
            Some(xf) if i == reference_index => {
                warped.push(Some(frames[i].clone()));
                let _ = xf;
            }
            Some(xf) => {
                warped.push(Some(warp::warp(&frames[i], xf, ref_w, ref_h)));
            }
        }

        observer.progress(0.4 + 0.4 * (i + 1) as f32 / frames.len() as f32);
    }

    if cancel.is_cancelled() {
        return Err(StackError::Cancelled);
    }

    observer.log("reducing aligned stack");
    let reducer = cfg.reducer_for(reducer);
    let result = reduce::reduce(&warped, reducer)?;
    observer.progress(1.0);

    Ok(result)
}

/// Convenience wrapper for callers with no progress UI or cancellation need.
pub fn stack_default(
    frames: &[Raster],
    alignment: crate::config::AlignmentStrategy,
    reducer: Reducer,
) -> StackResult<Raster> {
    stack(frames, alignment, reducer, &StackConfig::default(), &NullObserver, &CancelToken::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlignmentStrategy;

    fn starfield(w: u32, h: u32, stars: &[(u32, u32)]) -> Raster {
        let mut r = Raster::new(w, h);
        for &(cx, cy) in stars {
            for dy in 0..=2i64 {
                for dx in 0..=2i64 {
                    let x = (cx as i64 - 1 + dx) as u32;
                    let y = (cy as i64 - 1 + dy) as u32;
                    r.set_rgba(x, y, [255, 255, 255, 255]);
                }
            }
        }
        r
    }

    #[test]
    fn s1_null_identical_frames_median_equals_input() {
        let frame = starfield(64, 64, &[(10, 10), (50, 40)]);
        let frames = vec![frame.clone(), frame.clone()];
        let out = stack_default(&frames, AlignmentStrategy::Standard, Reducer::Median).unwrap();
        for y in 0..64 {
            for x in 0..64 {
                assert_eq!(out.rgba(x, y), frame.rgba(x, y));
            }
        }
    }

    #[test]
    fn s6_alignment_failure_surfaces_without_raster() {
        let frames = vec![Raster::new(20, 20), Raster::new(20, 20)];
        let result = stack_default(&frames, AlignmentStrategy::Standard, Reducer::Average);
        assert!(matches!(result, Err(StackError::AlignmentFailed { strategy: "Standard", .. })));
    }

    #[test]
    fn fewer_than_two_frames_is_invalid_input() {
        let frames = vec![starfield(10, 10, &[(5, 5), (7, 7)])];
        let result = stack_default(&frames, AlignmentStrategy::Standard, Reducer::Average);
        assert!(matches!(result, Err(StackError::InvalidInput(_))));
    }

    #[test]
    fn s2_translated_frame_aligns_back_onto_reference() {
        let reference = starfield(80, 80, &[(15, 15), (60, 45)]);
        let shifted = starfield(80, 80, &[(21, 19), (66, 49)]);
        let frames = vec![reference.clone(), shifted];
        let out = stack_default(&frames, AlignmentStrategy::Standard, Reducer::Median).unwrap();
        assert_eq!(out.rgba(15, 15), [255, 255, 255, 255]);
        assert_eq!(out.rgba(60, 45), [255, 255, 255, 255]);
    }

    #[test]
    fn s3_rotated_frame_aligns_back_onto_reference() {
        let center = (50.0, 50.0);
        let angle: f64 = 6.0f64.to_radians();
        let ref_points = [(20.0, 50.0), (70.0, 65.0)];
        let rotate = |(x, y): (f64, f64)| {
            let (dx, dy) = (x - center.0, y - center.1);
            let (sin_a, cos_a) = angle.sin_cos();
            (
                (center.0 + cos_a * dx - sin_a * dy).round() as u32,
                (center.1 + sin_a * dx + cos_a * dy).round() as u32,
            )
        };
        let rotated_points: Vec<(u32, u32)> = ref_points.iter().map(|&p| rotate(p)).collect();
        let ref_points_u32: Vec<(u32, u32)> =
            ref_points.iter().map(|&(x, y)| (x as u32, y as u32)).collect();

        let reference = starfield(100, 100, &ref_points_u32);
        let rotated = starfield(100, 100, &rotated_points);
        let frames = vec![reference.clone(), rotated];
        let out = stack_default(&frames, AlignmentStrategy::Standard, Reducer::Median).unwrap();
        for &(x, y) in &ref_points_u32 {
            assert_eq!(out.rgba(x, y), [255, 255, 255, 255], "star at ({x},{y}) missing after de-rotation");
        }
    }

    /// Fully opaque frame (so every pixel is a valid reducer contributor)
    /// with two bright star blobs for registration.
    fn opaque_starfield(w: u32, h: u32, stars: &[(u32, u32)]) -> Raster {
        let mut r = Raster::new(w, h);
        for y in 0..h {
            for x in 0..w {
                r.set_rgba(x, y, [40, 40, 40, 255]);
            }
        }
        for &(cx, cy) in stars {
            for dy in 0..=2i64 {
                for dx in 0..=2i64 {
                    let x = (cx as i64 - 1 + dx) as u32;
                    let y = (cy as i64 - 1 + dy) as u32;
                    r.set_rgba(x, y, [255, 255, 255, 255]);
                }
            }
        }
        r
    }

    #[test]
    fn s4_sigma_clip_rejects_a_hot_pixel_outlier() {
        let base = opaque_starfield(40, 40, &[(10, 10), (28, 22)]);
        let mut hot = base.clone();
        hot.set_rgba(5, 5, [250, 10, 10, 255]);
        let frames = vec![base.clone(), base.clone(), base.clone(), hot];

        let mut cfg = StackConfig::default();
        cfg.sigma_k = 1.5;
        let out = stack(
            &frames,
            AlignmentStrategy::Standard,
            Reducer::Sigma { k: cfg.sigma_k },
            &cfg,
            &NullObserver,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(out.rgba(5, 5), base.rgba(5, 5), "hot pixel outlier leaked into the sigma-clipped result");
    }

    #[test]
    fn s5_planetary_laplacian_prefers_the_sharpest_frame() {
        // Both frames carry the same feature centered at (30, 30); only its
        // sharpness differs, so phase correlation should find zero shift and
        // the Laplacian reducer should pick the crisp frame's edge pixels.
        let sharp = starfield(60, 60, &[(30, 30)]);

        let mut blurry = Raster::new(60, 60);
        for y in 26..=34u32 {
            for x in 26..=34u32 {
                blurry.set_rgba(x, y, [120, 120, 120, 255]);
            }
        }

        let frames = vec![blurry, sharp.clone()];
        let out = stack_default(
            &frames,
            AlignmentStrategy::Planetary { quality_percent: 100 },
            Reducer::Laplacian,
        )
        .unwrap();
        // (29, 29) sits on the sharp frame's blob edge but deep inside the
        // blurry frame's wider, flat patch, so only the sharp frame's score
        // is nonzero there.
        assert_eq!(out.rgba(29, 29), sharp.rgba(29, 29));
    }

    #[test]
    fn cancellation_before_warp_aborts_with_cancelled() {
        let frame = starfield(40, 40, &[(10, 10), (30, 25)]);
        let frames = vec![frame.clone(), frame];
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = stack(
            &frames,
            AlignmentStrategy::Standard,
            Reducer::Average,
            &StackConfig::default(),
            &NullObserver,
            &cancel,
        );
        assert_eq!(result, Err(StackError::Cancelled));
    }
}

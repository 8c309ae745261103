//! Registration strategies (C4): one module, one enum, one dispatch point.
//!
//! The redesign notes call out "duplicated strategy implementations across
//! files" in the source as an anti-pattern to collapse rather than carry
//! forward, so all four strategies live here behind [`AlignmentStrategy`]
//! and share the detector (§4.2), solver (§4.3) and consensus-matching
//! helpers below. None of this module's callees (detector, solver, warp,
//! reducer) depend back on it.

use crate::config::{AlignmentStrategy, StackConfig};
use crate::error::StackError;
use crate::raster::Raster;
use crate::star::{self, Star};
use crate::transform::{self, Transform};

/// Output of a registration pass: which input frame is the reference, and
/// the per-frame transform (`None` where the frame was excluded).
#[derive(Debug, Clone)]
pub struct Registration {
    pub reference_index: usize,
    pub transforms: Vec<Option<Transform>>,
}

pub fn register(frames: &[Raster], strategy: AlignmentStrategy, cfg: &StackConfig) -> Result<Registration, StackError> {
    let name = strategy.name();
    match strategy {
        AlignmentStrategy::Standard => register_two_star(frames, cfg, name),
        AlignmentStrategy::Consensus => register_consensus(frames, cfg, name),
        AlignmentStrategy::Planetary { quality_percent } => register_planetary(frames, cfg, quality_percent, name),
        AlignmentStrategy::Minimal => register_minimal(frames, cfg, name),
    }
}

// ---------------------------------------------------------------------
// 4.4.1 Two-star (default)
// ---------------------------------------------------------------------

fn register_two_star(frames: &[Raster], cfg: &StackConfig, name: &'static str) -> Result<Registration, StackError> {
    let min_stars = cfg.detect_min_stars.max(2);
    let reference_stars = star::detect_adaptive(&frames[0], cfg.detect_threshold, min_stars);
    if reference_stars.len() < 2 {
        return Err(StackError::AlignmentFailed { strategy: name, reason: "reference".into() });
    }
    let (p0, p1) = (reference_stars[0].point(), reference_stars[1].point());

    let mut transforms = Vec::with_capacity(frames.len());
    for (i, frame) in frames.iter().enumerate() {
        if i == 0 {
            transforms.push(Some(Transform::IDENTITY));
            continue;
        }
        let stars = star::detect_adaptive(frame, cfg.detect_threshold, min_stars);
        if stars.len() < 2 {
            transforms.push(None);
            continue;
        }
        let (q0, q1) = (stars[0].point(), stars[1].point());
        // solve_two_point(a, b, c, d) yields a transform mapping a/b -> c/d;
        // the reducer warp needs target -> reference, so target points lead.
        transforms.push(transform::solve_two_point(q0, q1, p0, p1).ok());
    }

    Ok(Registration { reference_index: 0, transforms })
}

// ---------------------------------------------------------------------
// 4.4.2 Geometric consensus
// ---------------------------------------------------------------------

const CONSENSUS_STAR_CAP: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Triangle {
    i: usize,
    j: usize,
    k: usize,
    signature: (f64, f64),
}

fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn triangle_signature(stars: &[Star], i: usize, j: usize, k: usize) -> Option<(f64, f64)> {
    let mut sides = [
        dist(stars[i].point(), stars[j].point()),
        dist(stars[j].point(), stars[k].point()),
        dist(stars[i].point(), stars[k].point()),
    ];
    sides.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let [s0, s1, s2] = sides;
    if s0 <= f64::EPSILON {
        return None;
    }
    Some((s1 / s0, s2 / s0))
}

fn enumerate_triangles(stars: &[Star]) -> Vec<Triangle> {
    let n = stars.len().min(CONSENSUS_STAR_CAP);
    let mut triangles = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                if let Some(signature) = triangle_signature(stars, i, j, k) {
                    triangles.push(Triangle { i, j, k, signature });
                }
            }
        }
    }
    triangles
}

fn signatures_match(a: (f64, f64), b: (f64, f64), tolerance: f64) -> bool {
    (a.0 - b.0).abs() <= tolerance && (a.1 - b.1).abs() <= tolerance
}

/// Finds, for each frame's star list, the consensus triangle: the
/// reference-frame triangle matched by the greatest number of other frames,
/// requiring at least 2 total participating frames.
fn find_consensus(star_lists: &[Vec<Star>], tolerance: f64) -> Option<(Triangle, Vec<Option<Triangle>>)> {
    let reference_triangles = enumerate_triangles(&star_lists[0]);
    let other_triangles: Vec<Vec<Triangle>> = star_lists[1..].iter().map(|s| enumerate_triangles(s)).collect();

    let mut best: Option<(Triangle, Vec<Option<Triangle>>, usize)> = None;

    for candidate in &reference_triangles {
        let mut matches = vec![None; other_triangles.len()];
        let mut count = 1; // reference frame itself always "participates"
        for (idx, frame_triangles) in other_triangles.iter().enumerate() {
            if let Some(found) = frame_triangles
                .iter()
                .find(|t| signatures_match(t.signature, candidate.signature, tolerance))
            {
                matches[idx] = Some(*found);
                count += 1;
            }
        }
        let better = match &best {
            None => true,
            Some((_, _, best_count)) => count > *best_count,
        };
        if better {
            best = Some((*candidate, matches, count));
        }
    }

    best.and_then(|(triangle, matches, count)| if count >= 2 { Some((triangle, matches)) } else { None })
}

fn register_consensus(frames: &[Raster], cfg: &StackConfig, name: &'static str) -> Result<Registration, StackError> {
    let star_lists: Vec<Vec<Star>> = frames.iter().map(|f| star::detect(f, cfg.detect_threshold)).collect();

    let (reference_triangle, other_matches) = find_consensus(&star_lists, cfg.consensus_tolerance)
        .ok_or(StackError::AlignmentFailed { strategy: name, reason: "no consensus triangle".into() })?;

    let ref_stars = &star_lists[0];
    let p0 = ref_stars[reference_triangle.i].point();
    let p1 = ref_stars[reference_triangle.j].point();

    let mut transforms = vec![Some(Transform::IDENTITY)];
    for (frame_idx, matched) in other_matches.into_iter().enumerate() {
        let stars = &star_lists[frame_idx + 1];
        let xf = matched.and_then(|t| transform::solve_two_point(stars[t.i].point(), stars[t.j].point(), p0, p1).ok());
        transforms.push(xf);
    }

    let _ = frames;
    Ok(Registration { reference_index: 0, transforms })
}

// ---------------------------------------------------------------------
// 4.4.3 Planetary (phase correlation)
// ---------------------------------------------------------------------

fn to_grayscale_plane(raster: &Raster, fft_size: usize) -> ndarray::Array2<f64> {
    let (w, h) = raster.dims();
    let mut plane = ndarray::Array2::<f64>::zeros((fft_size, fft_size));
    for oy in 0..fft_size {
        for ox in 0..fft_size {
            let sx = (ox * w as usize / fft_size).min(w as usize - 1) as u32;
            let sy = (oy * h as usize / fft_size).min(h as usize - 1) as u32;
            let px = raster.rgba(sx, sy);
            let l = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
            plane[[oy, ox]] = l;
        }
    }
    plane
}

/// Mean squared 4-neighborhood Laplacian over the plane's central half.
fn sharpness(plane: &ndarray::Array2<f64>) -> f64 {
    let (h, w) = plane.dim();
    let (y0, y1) = (h / 4, h - h / 4);
    let (x0, x1) = (w / 4, w - w / 4);

    let mut sum = 0.0;
    let mut count = 0usize;
    for y in y0..y1 {
        for x in x0..x1 {
            if y == 0 || x == 0 || y + 1 >= h || x + 1 >= w {
                continue;
            }
            let lap = 4.0 * plane[[y, x]] - plane[[y - 1, x]] - plane[[y + 1, x]] - plane[[y, x - 1]] - plane[[y, x + 1]];
            sum += lap * lap;
            count += 1;
        }
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn register_planetary(frames: &[Raster], cfg: &StackConfig, quality_percent: u8, name: &'static str) -> Result<Registration, StackError> {
    let fft_size = cfg.planetary_fft_size;
    let planes: Vec<ndarray::Array2<f64>> = frames.iter().map(|f| to_grayscale_plane(f, fft_size)).collect();
    let sharpness_scores: Vec<f64> = planes.iter().map(sharpness).collect();

    let mut order: Vec<usize> = (0..frames.len()).collect();
    order.sort_by(|&a, &b| sharpness_scores[b].partial_cmp(&sharpness_scores[a]).unwrap());

    let reference_index = order[0];
    let keep_count = ((frames.len() as f64 * quality_percent as f64 / 100.0).round() as usize).max(2).min(frames.len());
    let kept: std::collections::HashSet<usize> = order.into_iter().take(keep_count).collect();

    if kept.len() < 2 {
        return Err(StackError::AlignmentFailed { strategy: name, reason: "no sharp reference".into() });
    }

    let reference_plane = &planes[reference_index];
    let (orig_w, orig_h) = frames[reference_index].dims();

    let mut transforms = vec![None; frames.len()];
    transforms[reference_index] = Some(Transform::IDENTITY);

    for idx in 0..frames.len() {
        if idx == reference_index || !kept.contains(&idx) {
            continue;
        }
        let surface = crate::fft::phase_correlation_surface(reference_plane, &planes[idx]);
        let (peak_y, peak_x) = crate::fft::find_peak(&surface);

        let scale_x = orig_w as f64 / fft_size as f64;
        let scale_y = orig_h as f64 / fft_size as f64;

        transforms[idx] = Some(Transform {
            dx: -(peak_x as f64) * scale_x,
            dy: -(peak_y as f64) * scale_y,
            theta: 0.0,
            s: 1.0,
        });
    }

    Ok(Registration { reference_index, transforms })
}

// ---------------------------------------------------------------------
// 4.4.4 Minimal-assumption ("dumb")
// ---------------------------------------------------------------------

fn register_minimal(frames: &[Raster], cfg: &StackConfig, name: &'static str) -> Result<Registration, StackError> {
    let star_lists: Vec<Vec<Star>> = frames.iter().map(star::detect_brightest_pixels).collect();

    let (reference_triangle, other_matches) = find_consensus(&star_lists, cfg.consensus_tolerance)
        .ok_or(StackError::AlignmentFailed { strategy: name, reason: "no consensus triangle".into() })?;

    let ref_stars = &star_lists[0];
    let p0 = ref_stars[reference_triangle.i].point();
    let p1 = ref_stars[reference_triangle.j].point();

    let mut transforms = vec![Some(Transform::IDENTITY)];
    for (frame_idx, matched) in other_matches.into_iter().enumerate() {
        let stars = &star_lists[frame_idx + 1];
        let xf = matched.and_then(|t| transform::solve_two_point(stars[t.i].point(), stars[t.j].point(), p0, p1).ok());
        transforms.push(xf);
    }

    Ok(Registration { reference_index: 0, transforms })
}

//! 2D FFT and phase-correlation helpers used by the planetary strategy.
//!
//! Grounded on the reference repo's `domain::fft` (rustfft-based row/column
//! transform and `fft_shift`) and the `phase_correlation.rs` example's
//! cross-power-spectrum peak search with paraboloid subpixel refinement.
//! The reference's rayon row-parallelism is dropped: the cooperative
//! scheduler runs everything on the caller's thread (§5).

use ndarray::Array2;
use num_complex::Complex64;
use rustfft::FftPlanner;

/// In-place 2D forward FFT over a complex grid, rows then columns.
pub fn fft2d_forward(grid: &mut Array2<Complex64>) {
    fft_rows(grid, false);
    fft_cols(grid, false);
}

/// In-place 2D inverse FFT, unnormalized scaling divided out at the end.
pub fn fft2d_inverse(grid: &mut Array2<Complex64>) {
    fft_rows(grid, true);
    fft_cols(grid, true);
    let (h, w) = grid.dim();
    let scale = 1.0 / (h * w) as f64;
    grid.mapv_inplace(|c| c * scale);
}

fn fft_rows(grid: &mut Array2<Complex64>, inverse: bool) {
    let (h, w) = grid.dim();
    let mut planner = FftPlanner::<f64>::new();
    let fft = if inverse { planner.plan_fft_inverse(w) } else { planner.plan_fft_forward(w) };

    for mut row in grid.rows_mut() {
        let mut buf: Vec<Complex64> = row.iter().copied().collect();
        fft.process(&mut buf);
        for x in 0..w {
            row[x] = buf[x];
        }
    }
    let _ = h;
}

fn fft_cols(grid: &mut Array2<Complex64>, inverse: bool) {
    let (h, w) = grid.dim();
    let mut planner = FftPlanner::<f64>::new();
    let fft = if inverse { planner.plan_fft_inverse(h) } else { planner.plan_fft_forward(h) };

    for mut col in grid.columns_mut() {
        let mut buf: Vec<Complex64> = col.iter().copied().collect();
        fft.process(&mut buf);
        for y in 0..h {
            col[y] = buf[y];
        }
    }
    let _ = w;
}

/// Converts a grayscale f64 plane into a zero-imaginary complex grid.
pub fn to_complex_grid(plane: &Array2<f64>) -> Array2<Complex64> {
    plane.mapv(|v| Complex64::new(v, 0.0))
}

/// Normalized cross-power spectrum of two equally-sized grayscale planes,
/// followed by an inverse FFT, yielding the phase-correlation surface whose
/// peak locates the best-fit translation.
pub fn phase_correlation_surface(reference: &Array2<f64>, target: &Array2<f64>) -> Array2<f64> {
    let mut fa = to_complex_grid(reference);
    let mut fb = to_complex_grid(target);
    fft2d_forward(&mut fa);
    fft2d_forward(&mut fb);

    let mut cross = Array2::<Complex64>::zeros(fa.dim());
    for ((c, a), b) in cross.iter_mut().zip(fa.iter()).zip(fb.iter()) {
        let prod = a * b.conj();
        let mag = prod.norm();
        *c = if mag > 1e-12 { prod / mag } else { Complex64::new(0.0, 0.0) };
    }

    fft2d_inverse(&mut cross);
    cross.mapv(|c| c.re)
}

/// Locates the integer-pixel peak of a correlation surface, expressed as a
/// signed `(dy, dx)` shift (wrap-around halves are folded to negative).
pub fn find_peak(surface: &Array2<f64>) -> (i64, i64) {
    let (h, w) = surface.dim();
    let mut best = f64::MIN;
    let mut peak = (0usize, 0usize);
    for ((y, x), &v) in surface.indexed_iter() {
        if v > best {
            best = v;
            peak = (y, x);
        }
    }

    let dy = if peak.0 > h / 2 { peak.0 as i64 - h as i64 } else { peak.0 as i64 };
    let dx = if peak.1 > w / 2 { peak.1 as i64 - w as i64 } else { peak.1 as i64 };
    (dy, dx)
}

/// Quadratic (paraboloid) subpixel refinement around an integer peak,
/// fitting independent 1D parabolas along each axis.
pub fn refine_peak_paraboloid(surface: &Array2<f64>, peak: (i64, i64)) -> (f64, f64) {
    let (h, w) = surface.dim();
    let (py, px) = peak;

    let wrap = |v: i64, n: usize| -> usize { v.rem_euclid(n as i64) as usize };
    let sample = |dy: i64, dx: i64| surface[[wrap(py + dy, h), wrap(px + dx, w)]];

    let c = sample(0, 0);
    let refine_axis = |prev: f64, next: f64| {
        let denom = prev - 2.0 * c + next;
        if denom.abs() <= 1e-12 {
            0.0
        } else {
            0.5 * (prev - next) / denom
        }
    };

    let dy_sub = refine_axis(sample(-1, 0), sample(1, 0));
    let dx_sub = refine_axis(sample(0, -1), sample(0, 1));

    (py as f64 + dy_sub, px as f64 + dx_sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(h: usize, w: usize, y: usize, x: usize) -> Array2<f64> {
        let mut grid = Array2::<f64>::zeros((h, w));
        grid[[y, x]] = 1.0;
        grid
    }

    #[test]
    fn forward_then_inverse_is_identity() {
        let plane = Array2::<f64>::from_shape_fn((8, 8), |(y, x)| (y * 8 + x) as f64);
        let mut grid = to_complex_grid(&plane);
        let original = grid.clone();
        fft2d_forward(&mut grid);
        fft2d_inverse(&mut grid);
        for (a, b) in grid.iter().zip(original.iter()) {
            assert!((a.re - b.re).abs() < 1e-8);
            assert!((a.im - b.im).abs() < 1e-8);
        }
    }

    #[test]
    fn phase_correlation_recovers_pure_shift() {
        let reference = impulse(16, 16, 8, 8);
        let target = impulse(16, 16, 10, 5);
        let surface = phase_correlation_surface(&reference, &target);
        let (dy, dx) = find_peak(&surface);
        assert_eq!((dy, dx), (2, -3));
    }

    #[test]
    fn find_peak_wraps_negative_shifts() {
        let reference = impulse(16, 16, 8, 8);
        let target = impulse(16, 16, 2, 14);
        let surface = phase_correlation_surface(&reference, &target);
        let (dy, dx) = find_peak(&surface);
        assert_eq!((dy, dx), (-6, 6));
    }

    #[test]
    fn subpixel_refinement_stays_near_integer_peak() {
        let reference = impulse(16, 16, 8, 8);
        let target = impulse(16, 16, 9, 9);
        let surface = phase_correlation_surface(&reference, &target);
        let peak = find_peak(&surface);
        let (y, x) = refine_peak_paraboloid(&surface, peak);
        assert!((y - peak.0 as f64).abs() < 1.0);
        assert!((x - peak.1 as f64).abs() < 1.0);
    }
}

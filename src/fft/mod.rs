//! FFT plumbing shared by the spectrum cache and the result interpolator.
//!
//! Plans are cached per transform length in an `FftPool` owned by each worker,
//! so repeated patch transforms at one kernel size reuse the same plan and
//! window. 2-D transforms run as a row pass, a transpose, a second row pass,
//! and a transpose back.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::HashMap;
use std::sync::Arc;

use crate::util::{TrackError, TrackResult};

/// Per-worker FFT plan and window cache keyed by transform length.
pub struct FftPool {
    planner: FftPlanner<f32>,
    forward: HashMap<usize, Arc<dyn Fft<f32>>>,
    inverse: HashMap<usize, Arc<dyn Fft<f32>>>,
    windows: HashMap<usize, Arc<Vec<f32>>>,
}

impl Default for FftPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FftPool {
    /// Creates an empty pool; plans are built lazily on first use.
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            forward: HashMap::new(),
            inverse: HashMap::new(),
            windows: HashMap::new(),
        }
    }

    fn forward_plan(&mut self, len: usize) -> Arc<dyn Fft<f32>> {
        self.forward
            .entry(len)
            .or_insert_with(|| self.planner.plan_fft_forward(len))
            .clone()
    }

    fn inverse_plan(&mut self, len: usize) -> Arc<dyn Fft<f32>> {
        self.inverse
            .entry(len)
            .or_insert_with(|| self.planner.plan_fft_inverse(len))
            .clone()
    }

    /// Returns the cached periodic Hann window of length `len`.
    pub fn window(&mut self, len: usize) -> Arc<Vec<f32>> {
        self.windows
            .entry(len)
            .or_insert_with(|| Arc::new(hann_window(len)))
            .clone()
    }

    /// Forward 2-D FFT, unnormalized.
    pub fn fft_2d_forward(&mut self, data: &mut Vec<Complex<f32>>, width: usize, height: usize) {
        let row = self.forward_plan(width);
        row.process(data);
        transpose(data, width, height);
        let col = self.forward_plan(height);
        col.process(data);
        transpose(data, height, width);
    }

    /// Inverse 2-D FFT, normalized by `width * height`.
    pub fn fft_2d_inverse(&mut self, data: &mut Vec<Complex<f32>>, width: usize, height: usize) {
        let row = self.inverse_plan(width);
        row.process(data);
        transpose(data, width, height);
        let col = self.inverse_plan(height);
        col.process(data);
        transpose(data, height, width);
        let norm = 1.0 / (width * height) as f32;
        for v in data.iter_mut() {
            *v *= norm;
        }
    }
}

/// Periodic Hann window of length `len`.
pub fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / len as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Out-of-place transpose of a `width x height` row-major buffer.
///
/// After the call the buffer is `height x width` row-major.
fn transpose(data: &mut Vec<Complex<f32>>, width: usize, height: usize) {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = data[y * width + x];
        }
    }
    *data = out;
}

/// Quadrant swap moving DC to the center (and back).
///
/// Swaps quadrants 1/4 and 2/3 over the lower half of the array, exactly the
/// operation the correlation mask coordinates assume. Applying it twice is
/// the identity. Odd trailing rows/columns are left in place.
pub fn fft_shift<T: Copy>(data: &mut [T], width: usize, height: usize) {
    let half_w = width / 2;
    let half_h = height / 2;
    for y in 0..half_h {
        for x in 0..half_w {
            let q1 = y * width + x;
            let q2 = y * width + (x + half_w);
            let q3 = (y + half_h) * width + x;
            let q4 = (y + half_h) * width + (x + half_w);
            data.swap(q1, q4);
            data.swap(q2, q3);
        }
    }
}

/// Maps an unshifted source frequency index into the zero-padded grid.
///
/// The Nyquist bin of an even-length axis is split half/half between its two
/// aliases so the padded spectrum stays Hermitian and the output stays real.
fn pad_destinations(k: usize, n: usize, padded: usize) -> [(usize, f32); 2] {
    if n % 2 == 0 && k == n / 2 {
        [(n / 2, 0.5), (padded - n / 2, 0.5)]
    } else if k <= n / 2 {
        [(k, 1.0), (0, 0.0)]
    } else {
        [(k + padded - n, 1.0), (0, 0.0)]
    }
}

/// Up-samples a real grid by an integer factor via spectrum zero-padding.
///
/// Returns a `width*factor x height*factor` row-major grid. Any non-finite
/// output sample is reported as an interpolation failure.
pub fn spectral_upsample(
    src: &[f32],
    width: usize,
    height: usize,
    factor: usize,
    pool: &mut FftPool,
) -> TrackResult<Vec<f32>> {
    if width == 0 || height == 0 || src.len() != width * height {
        return Err(TrackError::InvalidDimensions { width, height });
    }
    if factor == 0 {
        return Err(TrackError::InvalidSchedule(
            "interpolation factor must be positive".into(),
        ));
    }
    if factor == 1 {
        return Ok(src.to_vec());
    }

    let mut spectrum: Vec<Complex<f32>> =
        src.iter().map(|&v| Complex::new(v, 0.0)).collect();
    pool.fft_2d_forward(&mut spectrum, width, height);

    let out_w = width * factor;
    let out_h = height * factor;
    let mut padded = vec![Complex::new(0.0f32, 0.0); out_w * out_h];
    for ky in 0..height {
        let ys = pad_destinations(ky, height, out_h);
        for kx in 0..width {
            let xs = pad_destinations(kx, width, out_w);
            let value = spectrum[ky * width + kx];
            for &(yd, wy) in &ys {
                if wy == 0.0 {
                    continue;
                }
                for &(xd, wx) in &xs {
                    if wx == 0.0 {
                        continue;
                    }
                    padded[yd * out_w + xd] += value * (wx * wy);
                }
            }
        }
    }

    pool.fft_2d_inverse(&mut padded, out_w, out_h);

    let gain = (factor * factor) as f32;
    let mut out = Vec::with_capacity(out_w * out_h);
    for (index, v) in padded.iter().enumerate() {
        let sample = v.re * gain;
        if !sample.is_finite() {
            return Err(TrackError::NonFiniteInterpolation { index });
        }
        out.push(sample);
    }
    Ok(out)
}

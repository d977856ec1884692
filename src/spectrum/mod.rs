//! Windowed patch spectra and their per-worker cache.
//!
//! A patch spectrum is the 2-D Fourier transform of a square, Hann-windowed,
//! mean-removed neighborhood of an image, quadrant-shifted so the zero
//! frequency sits at the center. Spectra are owned by the cache entries that
//! produced them.

pub mod cache;

pub use cache::{CacheStats, SpectrumCache};

use rustfft::num_complex::Complex;

use crate::fft::{fft_shift, FftPool};
use crate::image::ImageView;
use crate::util::{TrackError, TrackResult};

/// Quadrant-shifted spectrum of one kernel-sized patch.
#[derive(Clone)]
pub struct PatchSpectrum {
    kernel_width: usize,
    bins: Vec<Complex<f32>>,
}

impl PatchSpectrum {
    /// Kernel width the spectrum was computed with.
    pub fn kernel_width(&self) -> usize {
        self.kernel_width
    }

    /// Row-major shifted bins (`kernel_width` squared of them).
    pub fn bins(&self) -> &[Complex<f32>] {
        &self.bins
    }

    /// Returns the bin at centered frequency coordinates.
    ///
    /// `fx`/`fy` range over `-k/2 .. k/2`; the DC bin is `(0, 0)`.
    #[inline]
    pub fn bin(&self, fx: i32, fy: i32) -> Complex<f32> {
        let half = (self.kernel_width / 2) as i32;
        debug_assert!(fx >= -half && fx < half && fy >= -half && fy < half);
        let row = (fy + half) as usize;
        let col = (fx + half) as usize;
        self.bins[row * self.kernel_width + col]
    }
}

/// Computes the windowed, shifted spectrum of the patch centered at `center`.
///
/// The patch covers `kernel_width x kernel_width` pixels with its top-left at
/// `center - kernel_width/2`. The patch mean is removed before windowing so
/// window leakage from the DC pedestal does not swamp the low-frequency bins.
pub fn compute_patch_spectrum(
    image: ImageView<'_, f32>,
    center: (usize, usize),
    kernel_width: usize,
    pool: &mut FftPool,
) -> TrackResult<PatchSpectrum> {
    let img_width = image.width();
    let img_height = image.height();
    if kernel_width < 4 || kernel_width % 2 != 0 {
        return Err(TrackError::InvalidSchedule(format!(
            "kernel width {kernel_width} must be even and at least 4"
        )));
    }
    if kernel_width > img_width || kernel_width > img_height {
        return Err(TrackError::KernelTooLarge {
            kernel_width,
            img_width,
            img_height,
        });
    }

    let half = kernel_width / 2;
    let (cx, cy) = center;
    if cx < half || cy < half || cx - half + kernel_width > img_width
        || cy - half + kernel_width > img_height
    {
        return Err(TrackError::RoiOutOfBounds {
            x: cx.saturating_sub(half),
            y: cy.saturating_sub(half),
            width: kernel_width,
            height: kernel_width,
            img_width,
            img_height,
        });
    }

    let x0 = cx - half;
    let y0 = cy - half;
    let mut patch = Vec::with_capacity(kernel_width * kernel_width);
    let mut mean = 0.0f32;
    for y in 0..kernel_width {
        let row = image.row(y0 + y).ok_or(TrackError::BufferTooSmall {
            needed: (y0 + y + 1) * image.stride(),
            got: image.as_slice().len(),
        })?;
        let span = &row[x0..x0 + kernel_width];
        mean += span.iter().sum::<f32>();
        patch.extend_from_slice(span);
    }
    mean /= (kernel_width * kernel_width) as f32;

    let window = pool.window(kernel_width);
    let mut bins = Vec::with_capacity(kernel_width * kernel_width);
    for y in 0..kernel_width {
        let wy = window[y];
        for x in 0..kernel_width {
            let sample = (patch[y * kernel_width + x] - mean) * window[x] * wy;
            bins.push(Complex::new(sample, 0.0));
        }
    }

    pool.fft_2d_forward(&mut bins, kernel_width, kernel_width);
    fft_shift(&mut bins, kernel_width, kernel_width);

    Ok(PatchSpectrum { kernel_width, bins })
}

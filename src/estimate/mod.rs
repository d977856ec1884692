//! Single-patch displacement estimation from a cross-spectrum phase plane.
//!
//! Given the spectra of a reference patch and a candidate patch, the shift
//! between them appears as a linear phase ramp in the cross-spectrum. A
//! weighted least-squares plane fit to the masked phase recovers the ramp
//! slopes, which convert directly to a sub-pixel pixel shift. There is no
//! retry logic here; callers retry by estimating at different centers.

pub mod mask;

pub use mask::SpectrumMask;

use crate::spectrum::PatchSpectrum;
use crate::util::{TrackError, TrackResult};

/// Guard threshold for the 2x2 normal-equations determinant.
const DET_EPS: f64 = 1e-10;

/// Threshold below which the weighted phase energy counts as numerically zero.
const ENERGY_TINY: f64 = 1e-9;

/// Coherence weight variant for the plane fit.
///
/// No selection criterion between the two is defined; callers choose per
/// request. The convergence search only trusts the objective scale under
/// `Coherence`, whose weights are normalized to unit sum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Weighting {
    /// Cross-spectrum power normalized over the mask (unit-sum weights).
    #[default]
    Coherence,
    /// Raw cross-spectrum magnitude squared.
    Magnitude,
}

/// Outcome of one plane fit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchFit {
    /// Fitted sub-pixel shift along x, in pixels.
    pub dx: f32,
    /// Fitted sub-pixel shift along y, in pixels.
    pub dy: f32,
    /// Weighted residual sum of squares of the fit; lower is better.
    pub objective: f32,
    /// Percent variance accounted for; 100 is perfect, -1 poor fit, -2 degenerate.
    pub vaf: f32,
    /// True when the normal equations were too ill-conditioned to solve.
    pub overflowed: bool,
}

/// Fits a phase plane to the cross-spectrum of two patch spectra.
///
/// On an ill-conditioned fit the shift falls back to a quarter kernel width
/// on both axes and `overflowed` is set; the condition is never an error.
pub fn estimate(
    a: &PatchSpectrum,
    b: &PatchSpectrum,
    mask: &SpectrumMask,
    weighting: Weighting,
) -> TrackResult<PatchFit> {
    let kernel_width = mask.kernel_width();
    if a.kernel_width() != kernel_width || b.kernel_width() != kernel_width {
        return Err(TrackError::SizeMismatch {
            width_a: a.kernel_width(),
            height_a: a.kernel_width(),
            width_b: b.kernel_width(),
            height_b: b.kernel_width(),
        });
    }

    let fallback = kernel_width as f32 / 4.0;
    if mask.is_empty() {
        return Ok(PatchFit {
            dx: fallback,
            dy: fallback,
            objective: 0.0,
            vaf: -2.0,
            overflowed: true,
        });
    }

    // Phase and raw cross-power per masked bin.
    let bins = mask.bins();
    let mut phases = Vec::with_capacity(bins.len());
    let mut powers = Vec::with_capacity(bins.len());
    let mut total_power = 0.0f64;
    for &(fx, fy) in bins {
        let cross = a.bin(fx, fy) * b.bin(fx, fy).conj();
        let phase = f64::from(cross.im.atan2(cross.re));
        let power = f64::from(cross.norm_sqr());
        total_power += power;
        phases.push(phase);
        powers.push(power);
    }

    let weight_of = |power: f64| -> f64 {
        match weighting {
            Weighting::Magnitude => power,
            Weighting::Coherence => {
                if total_power > 0.0 {
                    power / total_power
                } else {
                    0.0
                }
            }
        }
    };

    // Weighted normal equations for phase = u*fx + v*fy.
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    let mut syy = 0.0f64;
    let mut sxp = 0.0f64;
    let mut syp = 0.0f64;
    for (i, &(fx, fy)) in bins.iter().enumerate() {
        let w = weight_of(powers[i]);
        let x = f64::from(fx);
        let y = f64::from(fy);
        sxx += w * x * x;
        sxy += w * x * y;
        syy += w * y * y;
        sxp += w * x * phases[i];
        syp += w * y * phases[i];
    }

    let total_energy: f64 = bins
        .iter()
        .enumerate()
        .map(|(i, _)| weight_of(powers[i]) * phases[i] * phases[i])
        .sum();
    let underflowed = total_energy <= ENERGY_TINY;

    let det = sxx * syy - sxy * sxy;
    if det.abs() < DET_EPS {
        return Ok(PatchFit {
            dx: fallback,
            dy: fallback,
            objective: total_energy as f32,
            vaf: if underflowed { -2.0 } else { -1.0 },
            overflowed: true,
        });
    }

    let u = (syy * sxp - sxy * syp) / det;
    let v = (sxx * syp - sxy * sxp) / det;

    let mut objective = 0.0f64;
    for (i, &(fx, fy)) in bins.iter().enumerate() {
        let w = weight_of(powers[i]);
        let residual = phases[i] - u * f64::from(fx) - v * f64::from(fy);
        objective += w * residual * residual;
    }

    let vaf = if underflowed {
        100.0
    } else {
        let value = 100.0 * (1.0 - objective / total_energy);
        if value < 0.0 {
            -1.0
        } else {
            value as f32
        }
    };

    let scale = kernel_width as f64 / (2.0 * std::f64::consts::PI);
    Ok(PatchFit {
        dx: (u * scale) as f32,
        dy: (v * scale) as f32,
        objective: objective as f32,
        vaf,
        overflowed: false,
    })
}

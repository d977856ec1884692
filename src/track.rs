//! Tracked-point requests and the single-point tracking driver.
//!
//! A `TrackRequest` is created once per point per processed image pair,
//! mutated in place by the estimator/search, consumed by the error-recovery
//! controller, and discarded after the pair; the next pair re-seeds fresh
//! requests from the previous result.

use crate::context::RunContext;
use crate::estimate::{estimate, SpectrumMask, Weighting};
use crate::fft::FftPool;
use crate::image::ImageView;
use crate::search::{converge_search, SearchOutcome, SearchParams};
use crate::spectrum::SpectrumCache;
use crate::trace::{trace_event, trace_span};
use crate::util::{math::round_to_pixel, TrackResult};

/// Stereo view tag for a tracked point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Left,
    Right,
}

/// One tracked point on one view of one image pair.
#[derive(Clone, Debug)]
pub struct TrackRequest {
    /// Point index, shared between the two views of the same node.
    pub point: usize,
    /// Which stereo view this request tracks.
    pub view: View,
    /// Target coordinates in the reference image, full resolution.
    pub target: (f32, f32),
    /// Initial guess offset applied before searching.
    pub guess: (f32, f32),
    /// Coherence weight variant for the plane fit.
    pub weighting: Weighting,
    /// Center-of-mass filter radius carried from the point file; applied by
    /// the external pre-filter stage, passed through untouched here.
    pub cm_radius: f32,
    /// Set once the point has been tracked this cycle.
    pub done: bool,
    /// Output: estimated shift in pixels at full resolution.
    pub shift: (f32, f32),
    /// Output: residual objective of the accepted fit.
    pub objective: f32,
    /// Output: percent variance accounted for by the accepted fit.
    pub vaf: f32,
}

impl TrackRequest {
    /// Creates a request with no guess and cleared outputs.
    pub fn new(point: usize, view: View, target: (f32, f32), weighting: Weighting) -> Self {
        Self {
            point,
            view,
            target,
            guess: (0.0, 0.0),
            weighting,
            cm_radius: 0.0,
            done: false,
            shift: (0.0, 0.0),
            objective: 0.0,
            vaf: 0.0,
        }
    }

    /// Sets the initial guess offset.
    pub fn with_guess(mut self, guess: (f32, f32)) -> Self {
        self.guess = guess;
        self
    }

    /// Sets the CM-filter radius.
    pub fn with_cm_radius(mut self, radius: f32) -> Self {
        self.cm_radius = radius;
        self
    }

    /// Clears outputs and the done flag before a rerun.
    pub fn reset(&mut self) {
        self.done = false;
        self.shift = (0.0, 0.0);
        self.objective = 0.0;
        self.vaf = 0.0;
    }
}

/// Per-pass tracking parameters shared by every point of the pass.
#[derive(Clone, Debug)]
pub struct TrackParams {
    kernel_width: usize,
    search: SearchParams,
    mask: SpectrumMask,
}

impl TrackParams {
    /// Builds the parameters, applying the default fit-radius rule.
    ///
    /// A `fit_radius` of 0 selects `kernel_width * 10 / 32`, the ratio the
    /// legacy parameter files leave implicit.
    pub fn new(kernel_width: usize, fit_radius: usize, search: SearchParams) -> Self {
        let radius = if fit_radius == 0 {
            kernel_width * 10 / 32
        } else {
            fit_radius
        };
        Self {
            kernel_width,
            search,
            mask: SpectrumMask::annular_half_plane(kernel_width, radius),
        }
    }

    /// Kernel width in pixels.
    pub fn kernel_width(&self) -> usize {
        self.kernel_width
    }

    /// Search parameters for the convergence search.
    pub fn search(&self) -> &SearchParams {
        &self.search
    }

    /// Overrides the fit weighting, for reruns that reuse the parameters.
    pub fn set_weighting(&mut self, weighting: Weighting) {
        self.search.weighting = weighting;
    }

    /// Frequency mask for the plane fit.
    pub fn mask(&self) -> &SpectrumMask {
        &self.mask
    }
}

/// Per-worker mutable state: FFT plans and one spectrum cache per image.
///
/// Workers never share this; each owns its caches, so lookups need no locks.
pub struct WorkerState {
    pub pool: FftPool,
    pub reference_cache: SpectrumCache,
    pub moving_cache: SpectrumCache,
}

impl WorkerState {
    /// Creates worker state for images of the given size.
    pub fn new(width: usize, height: usize, cache_size: usize) -> TrackResult<Self> {
        Ok(Self {
            pool: FftPool::new(),
            reference_cache: SpectrumCache::new(width, height, cache_size)?,
            moving_cache: SpectrumCache::new(width, height, cache_size)?,
        })
    }
}

fn clamp_center(
    x: i64,
    y: i64,
    half: usize,
    width: usize,
    height: usize,
) -> Option<(usize, usize)> {
    let half = half as i64;
    if x < half || y < half {
        return None;
    }
    if x + half > width as i64 || y + half > height as i64 {
        return None;
    }
    Some((x as usize, y as usize))
}

/// Tracks one point: patch spectrum at the target, convergence search over
/// candidate centers in the moving image, request outputs updated in place.
///
/// The target is rounded to the nearest integer pixel; sub-pixel residuals
/// come out of the plane fit, not the patch placement.
pub fn track_point(
    reference: ImageView<'_, f32>,
    moving: ImageView<'_, f32>,
    request: &mut TrackRequest,
    params: &TrackParams,
    state: &mut WorkerState,
    ctx: &RunContext,
) -> TrackResult<()> {
    let _span = trace_span!("track_point", point = request.point).entered();
    ctx.checkpoint()?;

    let WorkerState {
        pool,
        reference_cache,
        moving_cache,
    } = state;

    let kernel = params.kernel_width();
    let half = kernel / 2;
    let width = moving.width();
    let height = moving.height();

    let tx = round_to_pixel(request.target.0);
    let ty = round_to_pixel(request.target.1);
    let (tx, ty) = clamp_center(tx, ty, half, reference.width(), reference.height()).ok_or(
        crate::util::TrackError::RoiOutOfBounds {
            x: tx.max(0) as usize,
            y: ty.max(0) as usize,
            width: kernel,
            height: kernel,
            img_width: reference.width(),
            img_height: reference.height(),
        },
    )?;

    let spectrum_a = reference_cache.lookup(reference, (tx, ty), kernel, pool)?;

    let base_x = tx as i64 + round_to_pixel(request.guess.0);
    let base_y = ty as i64 + round_to_pixel(request.guess.1);

    let outcome: SearchOutcome = converge_search(params.search(), ctx, |(dx, dy)| {
        let cx = base_x + i64::from(dx);
        let cy = base_y + i64::from(dy);
        let Some(center) = clamp_center(cx, cy, half, width, height) else {
            return Ok(None);
        };
        let spectrum_b = moving_cache.lookup(moving, center, kernel, pool)?;
        estimate(spectrum_a, spectrum_b, params.mask(), request.weighting).map(Some)
    })?;

    let integer_x = (base_x + i64::from(outcome.offset.0) - tx as i64) as f32;
    let integer_y = (base_y + i64::from(outcome.offset.1) - ty as i64) as f32;
    request.shift = (integer_x + outcome.fit.dx, integer_y + outcome.fit.dy);
    request.objective = outcome.fit.objective;
    request.vaf = outcome.fit.vaf;
    request.done = true;

    trace_event!(
        "point_tracked",
        point = request.point,
        evaluations = outcome.evaluations,
        converged = outcome.converged
    );
    Ok(())
}

//! Multi-resolution pass descriptors and the coarse-to-fine controller.

pub mod controller;

pub use controller::{run_grid, track_cycle, GridRun, OutputSpec, PassResult, ViewPair};

use crate::util::{math::is_power_of_two, TrackError, TrackResult};

/// One pass of the coarse-to-fine hierarchy.
///
/// Field order matches the legacy parameter file: index, decimation, search
/// lags, sampling increment, kernel width, fit radius, residual threshold,
/// cache size, then the filter and output flags.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassDescriptor {
    /// Pass index, informational only.
    pub index: usize,
    /// Power-of-two decimation applied to both images before tracking.
    pub decimation: usize,
    /// Maximum search radius along x, in decimated pixels.
    pub lags_x: usize,
    /// Maximum search radius along y, in decimated pixels.
    pub lags_y: usize,
    /// Grid cell spacing on the decimated image.
    pub sampling_increment: usize,
    /// Correlation kernel width, even, at least 4.
    pub kernel_width: usize,
    /// Plane-fit frequency radius; 0 selects the default rule.
    pub max_fit_radius: usize,
    /// Convergence objective threshold for the search.
    pub objective_threshold: f32,
    /// Spectrum cache capacity per worker per image; 0 disables caching.
    pub cache_size: usize,
    /// Apply the caller's smoothing filter to this pass's grid.
    pub filter_enable: bool,
    /// Persist each worker's partial arrays.
    pub write_intermediate: bool,
    /// Persist the interpolated seed field built from this pass.
    pub write_secondary: bool,
}

impl PassDescriptor {
    /// Effective plane-fit radius, `kernel_width * 10 / 32` when unset.
    pub fn fit_radius(&self) -> usize {
        if self.max_fit_radius == 0 {
            self.kernel_width * 10 / 32
        } else {
            self.max_fit_radius
        }
    }

    fn validate(&self) -> TrackResult<()> {
        if self.decimation == 0 || !is_power_of_two(self.decimation) {
            return Err(TrackError::InvalidSchedule(format!(
                "pass {}: decimation {} is not a power of two",
                self.index, self.decimation
            )));
        }
        if self.kernel_width < 4 || self.kernel_width % 2 != 0 {
            return Err(TrackError::InvalidSchedule(format!(
                "pass {}: kernel width {} must be even and at least 4",
                self.index, self.kernel_width
            )));
        }
        if self.sampling_increment == 0 {
            return Err(TrackError::InvalidSchedule(format!(
                "pass {}: zero sampling increment",
                self.index
            )));
        }
        if self.lags_x == 0 && self.lags_y == 0 {
            return Err(TrackError::InvalidSchedule(format!(
                "pass {}: zero search radius on both axes",
                self.index
            )));
        }
        if self.fit_radius() * 2 > self.kernel_width {
            return Err(TrackError::InvalidSchedule(format!(
                "pass {}: fit radius {} exceeds the kernel's Nyquist radius",
                self.index,
                self.fit_radius()
            )));
        }
        Ok(())
    }
}

/// Validated, ordered list of passes with non-increasing decimation.
#[derive(Clone, Debug)]
pub struct PassSchedule {
    passes: Vec<PassDescriptor>,
}

impl PassSchedule {
    pub fn new(passes: Vec<PassDescriptor>) -> TrackResult<Self> {
        if passes.is_empty() {
            return Err(TrackError::InvalidSchedule("no passes".into()));
        }
        for pass in &passes {
            pass.validate()?;
        }
        for pair in passes.windows(2) {
            if pair[1].decimation > pair[0].decimation {
                return Err(TrackError::InvalidSchedule(format!(
                    "decimation increases from {} to {} between passes {} and {}",
                    pair[0].decimation, pair[1].decimation, pair[0].index, pair[1].index
                )));
            }
        }
        Ok(Self { passes })
    }

    pub fn passes(&self) -> &[PassDescriptor] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

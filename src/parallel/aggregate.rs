//! Recombination of worker outputs into per-pass result grids.

use crate::fft::{spectral_upsample, FftPool};
use crate::trace::trace_span;
use crate::util::{TrackError, TrackResult};

/// One worker's slice of the pass grid.
///
/// Cell coordinates are relative to the worker's rectangle; `origin` places
/// them in the full grid. Cells the worker never tracked keep their zero
/// fill and `tracked` flag cleared.
#[derive(Clone, Debug)]
pub struct PartialGrid {
    pub origin: (usize, usize),
    pub width: usize,
    pub height: usize,
    pub shifts_x: Vec<f32>,
    pub shifts_y: Vec<f32>,
    pub objective: Vec<f32>,
    pub vaf: Vec<f32>,
    pub tracked: Vec<bool>,
}

impl PartialGrid {
    pub fn new(origin: (usize, usize), width: usize, height: usize) -> Self {
        let n = width * height;
        Self {
            origin,
            width,
            height,
            shifts_x: vec![0.0; n],
            shifts_y: vec![0.0; n],
            objective: vec![0.0; n],
            vaf: vec![0.0; n],
            tracked: vec![false; n],
        }
    }

    pub fn set(&mut self, cx: usize, cy: usize, dx: f32, dy: f32, objective: f32, vaf: f32) {
        let i = cy * self.width + cx;
        self.shifts_x[i] = dx;
        self.shifts_y[i] = dy;
        self.objective[i] = objective;
        self.vaf[i] = vaf;
        self.tracked[i] = true;
    }
}

/// A full pass grid of displacement estimates.
///
/// `width x height` cells at the pass's sampling increment on the decimated
/// image; shifts are in decimated-image pixels. Untracked cells hold zeros.
#[derive(Clone, Debug)]
pub struct ResultGrid {
    pub width: usize,
    pub height: usize,
    pub decimation: usize,
    pub shifts_x: Vec<f32>,
    pub shifts_y: Vec<f32>,
    pub objective: Vec<f32>,
    pub vaf: Vec<f32>,
}

impl ResultGrid {
    pub fn new(width: usize, height: usize, decimation: usize) -> Self {
        let n = width * height;
        Self {
            width,
            height,
            decimation,
            shifts_x: vec![0.0; n],
            shifts_y: vec![0.0; n],
            objective: vec![0.0; n],
            vaf: vec![0.0; n],
        }
    }

    /// Scatters a worker's rectangle into the full grid.
    pub fn merge(&mut self, part: &PartialGrid) -> TrackResult<()> {
        let (ox, oy) = part.origin;
        if ox + part.width > self.width || oy + part.height > self.height {
            return Err(TrackError::RoiOutOfBounds {
                x: ox,
                y: oy,
                width: part.width,
                height: part.height,
                img_width: self.width,
                img_height: self.height,
            });
        }
        for cy in 0..part.height {
            for cx in 0..part.width {
                let src = cy * part.width + cx;
                if !part.tracked[src] {
                    continue;
                }
                let dst = (oy + cy) * self.width + (ox + cx);
                self.shifts_x[dst] = part.shifts_x[src];
                self.shifts_y[dst] = part.shifts_y[src];
                self.objective[dst] = part.objective[src];
                self.vaf[dst] = part.vaf[src];
            }
        }
        Ok(())
    }

    pub fn cell(&self, cx: usize, cy: usize) -> (f32, f32) {
        let i = cy * self.width + cx;
        (self.shifts_x[i], self.shifts_y[i])
    }
}

/// Post-merge smoothing hook applied to a pass grid before seeding.
pub type GridFilter = dyn Fn(&mut ResultGrid) -> TrackResult<()> + Sync;

/// A dense full-resolution displacement field used to seed the next pass.
///
/// Shift values are in full-resolution pixels.
#[derive(Clone, Debug)]
pub struct SeedField {
    pub width: usize,
    pub height: usize,
    pub dx: Vec<f32>,
    pub dy: Vec<f32>,
}

impl SeedField {
    /// Upsamples a pass grid to full resolution by spectral interpolation.
    ///
    /// `step` is the pass's sampling increment; the upsampling factor is
    /// `decimation * step`, and shift values are rescaled from decimated to
    /// full-resolution pixels. The interpolated field is edge-padded (or
    /// cropped) to `full_width x full_height`.
    pub fn from_grid(
        grid: &ResultGrid,
        step: usize,
        full_width: usize,
        full_height: usize,
        pool: &mut FftPool,
    ) -> TrackResult<Self> {
        let _span = trace_span!("seed_field", w = grid.width, h = grid.height).entered();
        let factor = grid.decimation * step;
        if factor == 0 {
            return Err(TrackError::InvalidSchedule(
                "zero decimation or sampling increment".into(),
            ));
        }
        let scale = grid.decimation as f32;
        let (dx_up, dy_up) = if factor == 1 {
            (grid.shifts_x.clone(), grid.shifts_y.clone())
        } else {
            (
                spectral_upsample(&grid.shifts_x, grid.width, grid.height, factor, pool)?,
                spectral_upsample(&grid.shifts_y, grid.width, grid.height, factor, pool)?,
            )
        };
        let up_w = grid.width * factor;
        let up_h = grid.height * factor;

        let mut dx = vec![0.0f32; full_width * full_height];
        let mut dy = vec![0.0f32; full_width * full_height];
        for y in 0..full_height {
            let sy = y.min(up_h - 1);
            for x in 0..full_width {
                let sx = x.min(up_w - 1);
                dx[y * full_width + x] = dx_up[sy * up_w + sx] * scale;
                dy[y * full_width + x] = dy_up[sy * up_w + sx] * scale;
            }
        }
        Ok(Self {
            width: full_width,
            height: full_height,
            dx,
            dy,
        })
    }

    /// Looks up the seed shift nearest a full-resolution point, clamped to
    /// the field.
    pub fn sample(&self, x: f32, y: f32) -> (f32, f32) {
        let cx = (x.round().max(0.0) as usize).min(self.width - 1);
        let cy = (y.round().max(0.0) as usize).min(self.height - 1);
        let i = cy * self.width + cx;
        (self.dx[i], self.dy[i])
    }
}

#[cfg(test)]
mod tests {
    use super::{PartialGrid, ResultGrid, SeedField};
    use crate::fft::FftPool;

    #[test]
    fn merge_places_cells_at_the_partial_origin() {
        let mut grid = ResultGrid::new(6, 6, 1);
        let mut part = PartialGrid::new((2, 3), 2, 2);
        part.set(0, 0, 1.5, -0.5, 0.01, 99.0);
        part.set(1, 1, 2.5, 0.5, 0.02, 98.0);
        grid.merge(&part).unwrap();
        assert_eq!(grid.cell(2, 3), (1.5, -0.5));
        assert_eq!(grid.cell(3, 4), (2.5, 0.5));
        assert_eq!(grid.cell(0, 0), (0.0, 0.0));
    }

    #[test]
    fn merge_skips_untracked_cells() {
        let mut grid = ResultGrid::new(4, 4, 1);
        for i in 0..grid.shifts_x.len() {
            grid.shifts_x[i] = 7.0;
        }
        let part = PartialGrid::new((0, 0), 4, 4);
        grid.merge(&part).unwrap();
        assert!(grid.shifts_x.iter().all(|&v| v == 7.0));
    }

    #[test]
    fn out_of_bounds_partial_is_rejected() {
        let mut grid = ResultGrid::new(4, 4, 1);
        let part = PartialGrid::new((3, 3), 2, 2);
        assert!(grid.merge(&part).is_err());
    }

    #[test]
    fn seed_field_rescales_decimated_shifts() {
        let mut grid = ResultGrid::new(8, 8, 4);
        for v in grid.shifts_x.iter_mut() {
            *v = 1.25;
        }
        for v in grid.shifts_y.iter_mut() {
            *v = -0.5;
        }
        let mut pool = FftPool::new();
        let seed = SeedField::from_grid(&grid, 2, 64, 64, &mut pool).unwrap();
        let (dx, dy) = seed.sample(30.0, 17.0);
        assert!((dx - 5.0).abs() < 1e-3, "dx = {dx}");
        assert!((dy + 2.0).abs() < 1e-3, "dy = {dy}");
    }

    #[test]
    fn seed_field_sample_clamps_to_edges() {
        let grid = ResultGrid::new(4, 4, 1);
        let mut pool = FftPool::new();
        let seed = SeedField::from_grid(&grid, 1, 4, 4, &mut pool).unwrap();
        assert_eq!(seed.sample(-5.0, 100.0), (0.0, 0.0));
    }
}

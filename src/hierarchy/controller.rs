//! Coarse-to-fine pass execution.
//!
//! Two drivers share the pass schedule: `run_grid` tracks a regular cell
//! grid over an image pair, `track_cycle` tracks explicit stereo point
//! requests. Each pass decimates the images, tracks at that resolution
//! seeded by the spectrally-interpolated previous pass, and recombines
//! worker partials behind the pass barrier.

use std::path::Path;

use crate::context::RunContext;
use crate::estimate::Weighting;
use crate::fft::FftPool;
use crate::hierarchy::{PassDescriptor, PassSchedule};
use crate::image::{decimate::decimate, ImageView, OwnedImage};
use crate::io::mat::{
    filtered_file, grid_file, interpolated_file, worker_file, write_mat, NamedArray,
    NAME_OBJECTIVE, NAME_SEED_X, NAME_SEED_Y, NAME_SHIFTS_X, NAME_SHIFTS_Y, NAME_VAF,
};
use crate::io::report::{concat, StatsReport};
use crate::parallel::{
    partition_rects, run_pass, GridFilter, PartialGrid, Partition, ResultGrid, SeedField,
};
use crate::search::SearchParams;
use crate::track::{track_point, TrackParams, TrackRequest, View, WorkerState};
use crate::trace::{trace_event, trace_span};
use crate::util::{TrackError, TrackResult};

/// Where to persist grids; filenames are derived from the prefix.
#[derive(Clone, Debug)]
pub struct OutputSpec {
    pub prefix: std::path::PathBuf,
}

/// Configuration for one grid run over an image pair.
pub struct GridRun<'a> {
    schedule: &'a PassSchedule,
    partition: Partition,
    weighting: Weighting,
    step_tolerance: f32,
    output: Option<&'a OutputSpec>,
    filter: Option<&'a GridFilter>,
    mask: Option<&'a (dyn Fn(f32, f32) -> bool + Sync)>,
}

impl<'a> GridRun<'a> {
    pub fn new(schedule: &'a PassSchedule) -> Self {
        Self {
            schedule,
            partition: Partition::default(),
            weighting: Weighting::Coherence,
            step_tolerance: SearchParams::DEFAULT_STEP_TOLERANCE,
            output: None,
            filter: None,
            mask: None,
        }
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_output(mut self, output: &'a OutputSpec) -> Self {
        self.output = Some(output);
        self
    }

    /// Smoothing applied to passes whose descriptor enables filtering.
    pub fn with_filter(mut self, filter: &'a GridFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Cell admission predicate over full-resolution coordinates; cells it
    /// rejects stay untracked.
    pub fn with_mask(mut self, mask: &'a (dyn Fn(f32, f32) -> bool + Sync)) -> Self {
        self.mask = Some(mask);
        self
    }
}

/// One pass's combined grid plus the concatenated worker reports.
pub struct PassResult {
    pub descriptor: PassDescriptor,
    pub grid: ResultGrid,
    pub report: StatsReport,
}

fn search_params(pass: &PassDescriptor, step_tolerance: f32, weighting: Weighting) -> SearchParams {
    SearchParams {
        max_radius_x: pass.lags_x,
        max_radius_y: pass.lags_y,
        step_tolerance,
        objective_threshold: pass.objective_threshold,
        weighting,
    }
}

fn check_pair(a: ImageView<'_, f32>, b: ImageView<'_, f32>) -> TrackResult<()> {
    if a.width() != b.width() || a.height() != b.height() {
        return Err(TrackError::SizeMismatch {
            width_a: a.width(),
            height_a: a.height(),
            width_b: b.width(),
            height_b: b.height(),
        });
    }
    Ok(())
}

fn write_grid_planes(
    grid: &ResultGrid,
    name_for: impl Fn(&str) -> std::path::PathBuf,
) -> TrackResult<()> {
    let planes: [(&str, &[f32]); 4] = [
        (NAME_SHIFTS_X, &grid.shifts_x),
        (NAME_SHIFTS_Y, &grid.shifts_y),
        (NAME_OBJECTIVE, &grid.objective),
        (NAME_VAF, &grid.vaf),
    ];
    for (name, data) in planes {
        let array = NamedArray::from_f32(name, grid.width, grid.height, data)?;
        write_mat(&name_for(name), &array)?;
    }
    Ok(())
}

fn write_partial_planes(prefix: &Path, worker: usize, partial: &PartialGrid) -> TrackResult<()> {
    let planes: [(&str, &[f32]); 4] = [
        (NAME_SHIFTS_X, &partial.shifts_x),
        (NAME_SHIFTS_Y, &partial.shifts_y),
        (NAME_OBJECTIVE, &partial.objective),
        (NAME_VAF, &partial.vaf),
    ];
    for (name, data) in planes {
        let array = NamedArray::from_f32(name, partial.width, partial.height, data)?;
        write_mat(&worker_file(prefix, worker, name), &array)?;
    }
    Ok(())
}

/// Runs every pass of the schedule over a regular grid of cells.
///
/// Cells are spaced `sampling_increment` apart on the decimated image; cells
/// whose kernel does not fit, or that the mask rejects, keep the zero fill.
/// Grids already persisted by earlier passes survive an abort.
pub fn run_grid(
    reference: ImageView<'_, f32>,
    moving: ImageView<'_, f32>,
    run: &GridRun<'_>,
    ctx: &RunContext,
) -> TrackResult<Vec<PassResult>> {
    let _span = trace_span!("run_grid", passes = run.schedule.len()).entered();
    check_pair(reference, moving)?;
    let full_w = reference.width();
    let full_h = reference.height();

    let mut seed: Option<SeedField> = None;
    let mut results = Vec::with_capacity(run.schedule.len());
    let last = run.schedule.len() - 1;

    for (pass_no, pass) in run.schedule.passes().iter().enumerate() {
        ctx.checkpoint()?;
        let d = pass.decimation;
        let step = pass.sampling_increment;
        let ref_d = decimate(reference, d)?;
        let mov_d = decimate(moving, d)?;
        let (dec_w, dec_h) = (ref_d.width(), ref_d.height());
        let grid_w = dec_w / step;
        let grid_h = dec_h / step;
        if grid_w == 0 || grid_h == 0 {
            return Err(TrackError::InvalidSchedule(format!(
                "pass {}: sampling increment {} leaves no cells in a {}x{} image",
                pass.index, step, dec_w, dec_h
            )));
        }
        trace_event!("pass_start", index = pass.index, decimation = d);

        let rects = partition_rects(grid_w, grid_h, run.partition);
        let params = TrackParams::new(
            pass.kernel_width,
            pass.max_fit_radius,
            search_params(pass, run.step_tolerance, run.weighting),
        );
        let half = pass.kernel_width / 2;
        let scale = d as f32;
        let ref_view = ref_d.view();
        let mov_view = mov_d.view();
        let seed_ref = seed.as_ref();

        let outputs = run_pass(&rects, ctx, |worker, rect| {
            let mut state = WorkerState::new(dec_w, dec_h, pass.cache_size)?;
            let mut partial = PartialGrid::new((rect.x0, rect.y0), rect.width, rect.height);
            let mut tracked = 0usize;
            for cy in 0..rect.height {
                for cx in 0..rect.width {
                    let gx = rect.x0 + cx;
                    let gy = rect.y0 + cy;
                    let ix = gx * step;
                    let iy = gy * step;
                    if ix < half || iy < half || ix + half > dec_w || iy + half > dec_h {
                        continue;
                    }
                    let full = (ix as f32 * scale, iy as f32 * scale);
                    if let Some(mask) = run.mask {
                        if !mask(full.0, full.1) {
                            continue;
                        }
                    }
                    let guess = match seed_ref {
                        Some(field) => {
                            let (sx, sy) = field.sample(full.0, full.1);
                            (sx / scale, sy / scale)
                        }
                        None => (0.0, 0.0),
                    };
                    let mut request = TrackRequest::new(
                        gy * grid_w + gx,
                        View::Left,
                        (ix as f32, iy as f32),
                        run.weighting,
                    )
                    .with_guess(guess);
                    match track_point(ref_view, mov_view, &mut request, &params, &mut state, ctx)
                    {
                        Ok(()) => {
                            partial.set(
                                cx,
                                cy,
                                request.shift.0,
                                request.shift.1,
                                request.objective,
                                request.vaf,
                            );
                            tracked += 1;
                        }
                        Err(TrackError::NoCandidates) => {}
                        Err(TrackError::RoiOutOfBounds { .. }) => {}
                        Err(err) => return Err(err),
                    }
                }
            }
            if pass.write_intermediate {
                if let Some(out) = run.output {
                    write_partial_planes(&out.prefix, worker, &partial)?;
                }
            }
            let mut report = StatsReport::new();
            report.push("pass", pass.index);
            report.push("cells", tracked);
            report.push_cache("reference", &state.reference_cache.stats());
            report.push_cache("moving", &state.moving_cache.stats());
            Ok((partial, report))
        })?;

        let mut grid = ResultGrid::new(grid_w, grid_h, d);
        let mut reports = Vec::with_capacity(outputs.len());
        for (partial, report) in outputs {
            grid.merge(&partial)?;
            reports.push(report);
        }
        if let Some(out) = run.output {
            write_grid_planes(&grid, |name| grid_file(&out.prefix, name, d))?;
        }
        if pass.filter_enable {
            if let Some(filter) = run.filter {
                filter(&mut grid)?;
                if let Some(out) = run.output {
                    write_grid_planes(&grid, |name| filtered_file(&out.prefix, name))?;
                }
            }
        }

        if pass_no < last || pass.write_secondary {
            let mut pool = FftPool::new();
            let field = SeedField::from_grid(&grid, step, full_w, full_h, &mut pool)?;
            if pass.write_secondary {
                if let Some(out) = run.output {
                    let dx = NamedArray::from_f32(NAME_SEED_X, full_w, full_h, &field.dx)?;
                    let dy = NamedArray::from_f32(NAME_SEED_Y, full_w, full_h, &field.dy)?;
                    write_mat(&interpolated_file(&out.prefix, NAME_SEED_X, d), &dx)?;
                    write_mat(&interpolated_file(&out.prefix, NAME_SEED_Y, d), &dy)?;
                }
            }
            seed = Some(field);
        }

        results.push(PassResult {
            descriptor: *pass,
            grid,
            report: concat(&reports),
        });
    }
    Ok(results)
}

/// The left and right images of one stereo frame.
#[derive(Clone, Copy)]
pub struct ViewPair<'a> {
    pub left: ImageView<'a, f32>,
    pub right: ImageView<'a, f32>,
}

impl<'a> ViewPair<'a> {
    fn view(&self, view: View) -> ImageView<'a, f32> {
        match view {
            View::Left => self.left,
            View::Right => self.right,
        }
    }
}

struct PairState {
    reference: OwnedImage,
    moving: OwnedImage,
    state: WorkerState,
}

/// Tracks explicit stereo requests through every pass of the schedule.
///
/// Each pass reruns every request at its decimation, seeded by the previous
/// pass's estimate; the final pass's outputs land in the requests. Requests
/// whose kernel falls outside the image are left not done.
pub fn track_cycle(
    reference: &ViewPair<'_>,
    moving: &ViewPair<'_>,
    schedule: &PassSchedule,
    requests: &mut [TrackRequest],
    ctx: &RunContext,
) -> TrackResult<()> {
    let _span = trace_span!("track_cycle", requests = requests.len()).entered();
    check_pair(reference.left, moving.left)?;
    check_pair(reference.right, moving.right)?;

    let mut carried: Vec<(f32, f32)> = requests.iter().map(|r| r.guess).collect();
    let last = schedule.len() - 1;

    for (pass_no, pass) in schedule.passes().iter().enumerate() {
        ctx.checkpoint()?;
        let d = pass.decimation;
        let scale = d as f32;

        let mut left = decimated_pair(reference.view(View::Left), moving.view(View::Left), pass)?;
        let mut right =
            decimated_pair(reference.view(View::Right), moving.view(View::Right), pass)?;

        for (slot, request) in requests.iter_mut().enumerate() {
            let pair = match request.view {
                View::Left => &mut left,
                View::Right => &mut right,
            };
            let params = TrackParams::new(
                pass.kernel_width,
                pass.max_fit_radius,
                search_params(pass, SearchParams::DEFAULT_STEP_TOLERANCE, request.weighting),
            );
            let mut scratch = TrackRequest::new(
                request.point,
                request.view,
                (request.target.0 / scale, request.target.1 / scale),
                request.weighting,
            )
            .with_guess((carried[slot].0 / scale, carried[slot].1 / scale));

            match track_point(
                pair.reference.view(),
                pair.moving.view(),
                &mut scratch,
                &params,
                &mut pair.state,
                ctx,
            ) {
                Ok(()) => {
                    carried[slot] = (scratch.shift.0 * scale, scratch.shift.1 * scale);
                    if pass_no == last {
                        request.shift = carried[slot];
                        request.objective = scratch.objective;
                        request.vaf = scratch.vaf;
                        request.done = true;
                    }
                }
                Err(TrackError::NoCandidates | TrackError::RoiOutOfBounds { .. }) => {
                    if pass_no == last {
                        request.done = false;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}

fn decimated_pair(
    reference: ImageView<'_, f32>,
    moving: ImageView<'_, f32>,
    pass: &PassDescriptor,
) -> TrackResult<PairState> {
    let reference = decimate(reference, pass.decimation)?;
    let moving = decimate(moving, pass.decimation)?;
    let state = WorkerState::new(reference.width(), reference.height(), pass.cache_size)?;
    Ok(PairState {
        reference,
        moving,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::{run_grid, track_cycle, GridRun, ViewPair};
    use crate::context::RunContext;
    use crate::estimate::Weighting;
    use crate::hierarchy::{PassDescriptor, PassSchedule};
    use crate::image::ImageView;
    use crate::track::{TrackRequest, View};

    fn texture(x: f32, y: f32) -> f32 {
        (0.31 * x).sin() + (0.23 * y).cos() + 0.7 * (0.11 * (x + 2.0 * y)).sin()
    }

    fn render(width: usize, height: usize, sx: f32, sy: f32) -> Vec<f32> {
        (0..width * height)
            .map(|i| texture((i % width) as f32 - sx, (i / width) as f32 - sy))
            .collect()
    }

    fn pass(index: usize, decimation: usize) -> PassDescriptor {
        PassDescriptor {
            index,
            decimation,
            lags_x: 4,
            lags_y: 4,
            sampling_increment: 16,
            kernel_width: 32,
            max_fit_radius: 8,
            objective_threshold: 0.5,
            cache_size: 128,
            filter_enable: false,
            write_intermediate: false,
            write_secondary: false,
        }
    }

    #[test]
    fn single_pass_grid_recovers_a_uniform_shift() {
        let reference = render(128, 128, 0.0, 0.0);
        let moving = render(128, 128, 2.0, -1.0);
        let ref_view = ImageView::from_slice(&reference, 128, 128).unwrap();
        let mov_view = ImageView::from_slice(&moving, 128, 128).unwrap();
        let schedule = PassSchedule::new(vec![pass(0, 1)]).unwrap();
        let ctx = RunContext::new();

        let results = run_grid(ref_view, mov_view, &GridRun::new(&schedule), &ctx).unwrap();
        assert_eq!(results.len(), 1);
        let grid = &results[0].grid;
        // Interior cells only; border cells keep the zero fill.
        let (dx, dy) = grid.cell(4, 4);
        assert!((dx - 2.0).abs() < 0.1, "dx = {dx}");
        assert!((dy + 1.0).abs() < 0.1, "dy = {dy}");
        assert_eq!(grid.cell(0, 0), (0.0, 0.0));
    }

    #[test]
    fn mask_leaves_rejected_cells_untracked() {
        let reference = render(128, 128, 0.0, 0.0);
        let moving = render(128, 128, 1.0, 0.0);
        let ref_view = ImageView::from_slice(&reference, 128, 128).unwrap();
        let mov_view = ImageView::from_slice(&moving, 128, 128).unwrap();
        let schedule = PassSchedule::new(vec![pass(0, 1)]).unwrap();
        let ctx = RunContext::new();
        let mask = |x: f32, _y: f32| x < 64.0;

        let run = GridRun::new(&schedule).with_mask(&mask);
        let results = run_grid(ref_view, mov_view, &run, &ctx).unwrap();
        let grid = &results[0].grid;
        assert!((grid.cell(2, 4).0 - 1.0).abs() < 0.1);
        assert_eq!(grid.cell(6, 4), (0.0, 0.0));
    }

    #[test]
    fn mismatched_images_are_rejected() {
        let a = render(64, 64, 0.0, 0.0);
        let b = render(64, 32, 0.0, 0.0);
        let av = ImageView::from_slice(&a, 64, 64).unwrap();
        let bv = ImageView::from_slice(&b, 64, 32).unwrap();
        let schedule = PassSchedule::new(vec![pass(0, 1)]).unwrap();
        let ctx = RunContext::new();
        assert!(run_grid(av, bv, &GridRun::new(&schedule), &ctx).is_err());
    }

    #[test]
    fn two_pass_cycle_tracks_a_large_shift() {
        // Radius 4 at full resolution cannot reach 11 pixels; the coarse
        // pass gets close and seeds the fine pass.
        let ref_img = render(256, 256, 0.0, 0.0);
        let mov_img = render(256, 256, 11.0, 6.0);
        let rv = ImageView::from_slice(&ref_img, 256, 256).unwrap();
        let mv = ImageView::from_slice(&mov_img, 256, 256).unwrap();
        let pair_ref = ViewPair { left: rv, right: rv };
        let pair_mov = ViewPair { left: mv, right: mv };
        let schedule = PassSchedule::new(vec![pass(0, 4), pass(1, 1)]).unwrap();
        let ctx = RunContext::new();

        let mut requests = vec![
            TrackRequest::new(0, View::Left, (128.0, 128.0), Weighting::Coherence),
            TrackRequest::new(0, View::Right, (128.0, 128.0), Weighting::Coherence),
        ];
        track_cycle(&pair_ref, &pair_mov, &schedule, &mut requests, &ctx).unwrap();
        for request in &requests {
            assert!(request.done);
            assert!((request.shift.0 - 11.0).abs() < 0.2, "{:?}", request.shift);
            assert!((request.shift.1 - 6.0).abs() < 0.2, "{:?}", request.shift);
        }
    }
}

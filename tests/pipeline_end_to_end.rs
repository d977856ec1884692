use phasetrack::io::mat::{filtered_file, grid_file};
use phasetrack::io::read_mat;
use phasetrack::{
    run_grid, GridRun, ImageView, OutputSpec, PassDescriptor, PassSchedule, ResultGrid,
    RunContext,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SHIFT_TOLERANCE: f32 = 0.2;
const HIERARCHY_TOLERANCE: f32 = 0.3;

fn texture(x: f32, y: f32) -> f32 {
    (0.29 * x).sin() + (0.21 * y).cos() + 0.8 * (0.12 * (x + 1.7 * y)).sin()
        + 0.5 * (0.33 * (x - 0.6 * y)).cos()
}

fn render(width: usize, height: usize, shift: impl Fn(f32, f32) -> (f32, f32)) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = shift(x as f32, y as f32);
            data.push(texture(x as f32 - sx, y as f32 - sy));
        }
    }
    data
}

fn pass(index: usize, decimation: usize, step: usize, lags: usize) -> PassDescriptor {
    PassDescriptor {
        index,
        decimation,
        lags_x: lags,
        lags_y: lags,
        sampling_increment: step,
        kernel_width: 32,
        max_fit_radius: 8,
        objective_threshold: 0.5,
        cache_size: 256,
        filter_enable: false,
        write_intermediate: false,
        write_secondary: false,
    }
}

#[test]
fn uniform_shift_single_pass() {
    let width = 256;
    let height = 256;
    let reference = render(width, height, |_, _| (0.0, 0.0));
    let moving = render(width, height, |_, _| (3.2, -1.7));
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let mov_view = ImageView::from_slice(&moving, width, height).unwrap();

    let schedule = PassSchedule::new(vec![pass(0, 1, 32, 8)]).unwrap();
    let ctx = RunContext::new();
    let results = run_grid(ref_view, mov_view, &GridRun::new(&schedule), &ctx).unwrap();
    assert_eq!(results.len(), 1);
    let grid = &results[0].grid;

    let center = 4 * grid.width + 4;
    let dx = grid.shifts_x[center];
    let dy = grid.shifts_y[center];
    assert!((dx - 3.2).abs() < SHIFT_TOLERANCE, "dx = {dx}");
    assert!((dy + 1.7).abs() < SHIFT_TOLERANCE, "dy = {dy}");
    assert!(grid.objective[center] < 0.1, "objective = {}", grid.objective[center]);
    assert!(grid.vaf[center] > 90.0, "vaf = {}", grid.vaf[center]);
}

#[test]
fn interior_cells_agree_on_a_uniform_shift() {
    let width = 256;
    let height = 256;
    let reference = render(width, height, |_, _| (0.0, 0.0));
    let moving = render(width, height, |_, _| (3.2, -1.7));
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let mov_view = ImageView::from_slice(&moving, width, height).unwrap();

    let schedule = PassSchedule::new(vec![pass(0, 1, 32, 8)]).unwrap();
    let ctx = RunContext::new();
    let results = run_grid(ref_view, mov_view, &GridRun::new(&schedule), &ctx).unwrap();
    let grid = &results[0].grid;

    for cy in 1..grid.height - 1 {
        for cx in 1..grid.width - 1 {
            let i = cy * grid.width + cx;
            assert!(
                (grid.shifts_x[i] - 3.2).abs() < SHIFT_TOLERANCE,
                "cell ({cx}, {cy}): dx = {}",
                grid.shifts_x[i]
            );
            assert!(
                (grid.shifts_y[i] + 1.7).abs() < SHIFT_TOLERANCE,
                "cell ({cx}, {cy}): dy = {}",
                grid.shifts_y[i]
            );
        }
    }
}

#[test]
fn mild_sensor_noise_does_not_break_tracking() {
    let width = 256;
    let height = 256;
    let mut rng = StdRng::seed_from_u64(42);
    let reference = render(width, height, |_, _| (0.0, 0.0));
    let moving: Vec<f32> = render(width, height, |_, _| (3.2, -1.7))
        .into_iter()
        .map(|v| v + 0.05 * (rng.random::<f32>() - 0.5))
        .collect();
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let mov_view = ImageView::from_slice(&moving, width, height).unwrap();

    let schedule = PassSchedule::new(vec![pass(0, 1, 32, 8)]).unwrap();
    let ctx = RunContext::new();
    let results = run_grid(ref_view, mov_view, &GridRun::new(&schedule), &ctx).unwrap();
    let grid = &results[0].grid;

    let center = 4 * grid.width + 4;
    assert!((grid.shifts_x[center] - 3.2).abs() < SHIFT_TOLERANCE);
    assert!((grid.shifts_y[center] + 1.7).abs() < SHIFT_TOLERANCE);
}

#[test]
fn enabled_filter_smooths_and_persists_filtered_grids() {
    let width = 128;
    let height = 128;
    let reference = render(width, height, |_, _| (0.0, 0.0));
    let moving = render(width, height, |_, _| (1.0, 0.0));
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let mov_view = ImageView::from_slice(&moving, width, height).unwrap();

    let descriptor = PassDescriptor {
        filter_enable: true,
        ..pass(0, 1, 32, 4)
    };
    let schedule = PassSchedule::new(vec![descriptor]).unwrap();
    let ctx = RunContext::new();
    let dir = tempfile::tempdir().unwrap();
    let output = OutputSpec {
        prefix: dir.path().join("run"),
    };
    let filter = |grid: &mut ResultGrid| -> phasetrack::TrackResult<()> {
        for v in &mut grid.shifts_x {
            *v = 7.5;
        }
        Ok(())
    };

    let run = GridRun::new(&schedule).with_output(&output).with_filter(&filter);
    let results = run_grid(ref_view, mov_view, &run, &ctx).unwrap();
    let grid = &results[0].grid;
    assert!(grid.shifts_x.iter().all(|&v| v == 7.5));

    // The raw grid is persisted before the filter runs, the filtered one after.
    let raw = read_mat(&grid_file(&output.prefix, "shiftsX", 1)).unwrap();
    assert!(raw.data.iter().any(|&v| v != 7.5));
    let filtered = read_mat(&filtered_file(&output.prefix, "shiftsX")).unwrap();
    assert!(filtered.data.iter().all(|&v| v == 7.5));
}

#[test]
fn two_pass_hierarchy_matches_the_single_pass() {
    let width = 256;
    let height = 256;
    // Smooth, slowly varying displacement field.
    let field = |x: f32, y: f32| {
        (
            3.0 + 1.5 * (0.006 * x).sin(),
            -1.5 + 1.0 * (0.008 * y).cos(),
        )
    };
    let reference = render(width, height, |_, _| (0.0, 0.0));
    let moving = render(width, height, field);
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let mov_view = ImageView::from_slice(&moving, width, height).unwrap();
    let ctx = RunContext::new();

    let hierarchical = PassSchedule::new(vec![pass(0, 4, 8, 4), pass(1, 1, 32, 8)]).unwrap();
    let single = PassSchedule::new(vec![pass(0, 1, 32, 8)]).unwrap();

    let two_pass = run_grid(ref_view, mov_view, &GridRun::new(&hierarchical), &ctx).unwrap();
    let one_pass = run_grid(ref_view, mov_view, &GridRun::new(&single), &ctx).unwrap();

    let fine = &two_pass.last().unwrap().grid;
    let reference_grid = &one_pass[0].grid;
    assert_eq!(fine.width, reference_grid.width);
    assert_eq!(fine.height, reference_grid.height);

    for cy in 1..fine.height - 1 {
        for cx in 1..fine.width - 1 {
            let i = cy * fine.width + cx;
            assert!(
                (fine.shifts_x[i] - reference_grid.shifts_x[i]).abs() < HIERARCHY_TOLERANCE,
                "cell ({cx}, {cy}): {} vs {}",
                fine.shifts_x[i],
                reference_grid.shifts_x[i]
            );
            assert!(
                (fine.shifts_y[i] - reference_grid.shifts_y[i]).abs() < HIERARCHY_TOLERANCE,
                "cell ({cx}, {cy}): {} vs {}",
                fine.shifts_y[i],
                reference_grid.shifts_y[i]
            );
        }
    }
}

use clap::Parser;
use phasetrack::image::io::load_gray_image;
use phasetrack::io::mat::{grid_file, write_mat};
use phasetrack::io::{read_points, read_schedule, readme_file, stats_file, to_requests, write_points};
use phasetrack::stereo::{apply_shifts, reconstruct, world_arrays, StereoGeometry};
use phasetrack::{
    recover, run_grid, track_cycle, GridRun, OutputSpec, Partition, RecoveryConfig,
    RecoveryReport, ResultGrid, RunContext, TrackResult, ViewPair, Weighting,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str = r#"{
  "params_path": "passes.txt",
  "grid": {
    "reference_path": "frame0.png",
    "moving_path": "frame1.png",
    "slices": 4
  },
  "points": null,
  "output_prefix": "out/run1",
  "output_path": null,
  "weighting": "coherence"
}"#;

#[derive(Parser, Debug)]
#[command(author, version, about = "PhaseTrack CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
    /// Print per-pass diagnostics.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WeightingConfig {
    Coherence,
    Magnitude,
}

impl From<WeightingConfig> for Weighting {
    fn from(value: WeightingConfig) -> Self {
        match value {
            WeightingConfig::Coherence => Weighting::Coherence,
            WeightingConfig::Magnitude => Weighting::Magnitude,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GridConfig {
    reference_path: String,
    moving_path: String,
    /// Horizontal slices per pass; mutually exclusive with `area`.
    #[serde(default)]
    slices: Option<usize>,
    /// Rectangular decomposition `[nx, ny]`.
    #[serde(default)]
    area: Option<(usize, usize)>,
}

#[derive(Debug, Deserialize)]
struct StereoConfig {
    mm_per_pixel: f32,
    origin: (f32, f32, f32),
    depth_scale: f32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
struct RecoveryConfigJson {
    coregistration_threshold: f32,
    disparity_threshold: f32,
    max_passes: usize,
    kernel_growth: usize,
}

impl Default for RecoveryConfigJson {
    fn default() -> Self {
        let cfg = RecoveryConfig::default();
        Self {
            coregistration_threshold: cfg.coregistration_threshold,
            disparity_threshold: cfg.disparity_threshold,
            max_passes: cfg.max_passes,
            kernel_growth: cfg.kernel_growth,
        }
    }
}

impl From<RecoveryConfigJson> for RecoveryConfig {
    fn from(value: RecoveryConfigJson) -> Self {
        Self {
            coregistration_threshold: value.coregistration_threshold,
            disparity_threshold: value.disparity_threshold,
            max_passes: value.max_passes,
            kernel_growth: value.kernel_growth,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PointsConfig {
    reference_left_path: String,
    reference_right_path: String,
    moving_left_path: String,
    moving_right_path: String,
    points_path: String,
    /// Updated coordinates are written here after tracking.
    points_output_path: Option<String>,
    #[serde(default)]
    recovery: RecoveryConfigJson,
    #[serde(default)]
    stereo: Option<StereoConfig>,
}

#[derive(Debug, Deserialize)]
struct Config {
    params_path: String,
    #[serde(default)]
    grid: Option<GridConfig>,
    #[serde(default)]
    points: Option<PointsConfig>,
    #[serde(default)]
    output_prefix: Option<String>,
    /// JSON summary destination; stdout when absent.
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default = "default_weighting")]
    weighting: WeightingConfig,
}

fn default_weighting() -> WeightingConfig {
    WeightingConfig::Coherence
}

#[derive(Debug, Serialize)]
struct PassRecord {
    index: usize,
    decimation: usize,
    grid_width: usize,
    grid_height: usize,
}

#[derive(Debug, Serialize)]
struct PointRecord {
    point: usize,
    view: String,
    done: bool,
    shift: (f32, f32),
    objective: f32,
    vaf: f32,
}

#[derive(Debug, Serialize)]
struct RecoveryRecord {
    passes_run: usize,
    coregistration_found: usize,
    coregistration_fixed: usize,
    coregistration_remaining: usize,
    disparity_found: usize,
    disparity_fixed: usize,
    disparity_remaining: usize,
}

impl From<RecoveryReport> for RecoveryRecord {
    fn from(value: RecoveryReport) -> Self {
        Self {
            passes_run: value.passes_run,
            coregistration_found: value.coregistration_found,
            coregistration_fixed: value.coregistration_fixed(),
            coregistration_remaining: value.coregistration_remaining,
            disparity_found: value.disparity_found,
            disparity_fixed: value.disparity_fixed(),
            disparity_remaining: value.disparity_remaining,
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    passes: Vec<PassRecord>,
    points: Vec<PointRecord>,
    recovery: Option<RecoveryRecord>,
}

fn partition_of(grid: &GridConfig) -> Result<Partition, Box<dyn std::error::Error>> {
    match (grid.slices, grid.area) {
        (Some(_), Some(_)) => Err("slices and area are mutually exclusive".into()),
        (Some(n), None) => Ok(Partition::Slices { n }),
        (None, Some((nx, ny))) => Ok(Partition::Area { nx, ny }),
        (None, None) => Ok(Partition::default()),
    }
}

fn smooth_plane(plane: &mut [f32], width: usize, height: usize) {
    let src = plane.to_vec();
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            let mut count = 0.0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
                        sum += src[ny as usize * width + nx as usize];
                        count += 1.0;
                    }
                }
            }
            plane[y * width + x] = sum / count;
        }
    }
}

/// 3x3 mean smoothing of the shift planes, applied to passes that enable
/// filtering.
fn smooth_grid(grid: &mut ResultGrid) -> TrackResult<()> {
    let (width, height) = (grid.width, grid.height);
    smooth_plane(&mut grid.shifts_x, width, height);
    smooth_plane(&mut grid.shifts_y, width, height);
    Ok(())
}

fn run_grid_mode(
    config: &Config,
    grid_cfg: &GridConfig,
    ctx: &RunContext,
) -> Result<Output, Box<dyn std::error::Error>> {
    let schedule = read_schedule(config.params_path.as_ref())?;
    let reference = load_gray_image(&grid_cfg.reference_path)?;
    let moving = load_gray_image(&grid_cfg.moving_path)?;

    let output_spec = config.output_prefix.as_ref().map(|prefix| OutputSpec {
        prefix: PathBuf::from(prefix),
    });
    let weighting = match config.weighting {
        WeightingConfig::Coherence => Weighting::Coherence,
        WeightingConfig::Magnitude => Weighting::Magnitude,
    };
    let mut run = GridRun::new(&schedule)
        .with_partition(partition_of(grid_cfg)?)
        .with_weighting(weighting);
    if let Some(spec) = output_spec.as_ref() {
        run = run.with_output(spec);
    }
    if schedule.passes().iter().any(|p| p.filter_enable) {
        run = run.with_filter(&smooth_grid);
    }

    let results = run_grid(reference.view(), moving.view(), &run, ctx)?;

    if let Some(prefix) = config.output_prefix.as_ref() {
        let mut stats = phasetrack::io::StatsReport::new();
        for result in &results {
            stats.extend(&result.report);
        }
        let prefix = PathBuf::from(prefix);
        stats.write(&stats_file(&prefix))?;
        stats.write_readme(&readme_file(&prefix), "phasetrack run summary")?;
    }

    let passes = results
        .iter()
        .map(|r| PassRecord {
            index: r.descriptor.index,
            decimation: r.descriptor.decimation,
            grid_width: r.grid.width,
            grid_height: r.grid.height,
        })
        .collect();
    Ok(Output {
        passes,
        points: Vec::new(),
        recovery: None,
    })
}

fn run_points_mode(
    config: &Config,
    points_cfg: &PointsConfig,
    ctx: &RunContext,
) -> Result<Output, Box<dyn std::error::Error>> {
    let schedule = read_schedule(config.params_path.as_ref())?;
    let reference_left = load_gray_image(&points_cfg.reference_left_path)?;
    let reference_right = load_gray_image(&points_cfg.reference_right_path)?;
    let moving_left = load_gray_image(&points_cfg.moving_left_path)?;
    let moving_right = load_gray_image(&points_cfg.moving_right_path)?;

    let height = reference_left.height();
    let mut nodes = read_points(points_cfg.points_path.as_ref(), height)?;
    let weighting = match config.weighting {
        WeightingConfig::Coherence => Weighting::Coherence,
        WeightingConfig::Magnitude => Weighting::Magnitude,
    };
    let mut requests = to_requests(&nodes, weighting);

    let reference = ViewPair {
        left: reference_left.view(),
        right: reference_right.view(),
    };
    let moving = ViewPair {
        left: moving_left.view(),
        right: moving_right.view(),
    };

    track_cycle(&reference, &moving, &schedule, &mut requests, ctx)?;
    let base = schedule.passes()[schedule.len() - 1];
    let recovery_cfg: RecoveryConfig = points_cfg.recovery.into();
    let report = recover(&reference, &moving, &mut requests, &base, &recovery_cfg, ctx)?;

    apply_shifts(&mut nodes, &requests);
    if let Some(path) = points_cfg.points_output_path.as_ref() {
        write_points(path.as_ref(), &nodes, height)?;
    }

    if let (Some(prefix), Some(stereo)) = (config.output_prefix.as_ref(), &points_cfg.stereo) {
        let geometry = StereoGeometry {
            mm_per_pixel: stereo.mm_per_pixel,
            origin: stereo.origin,
            depth_scale: stereo.depth_scale,
        };
        let prefix = PathBuf::from(prefix);
        for array in world_arrays(&reconstruct(&nodes, &geometry))? {
            write_mat(&grid_file(&prefix, &array.name, 1), &array)?;
        }
    }

    let points = requests
        .iter()
        .map(|r| PointRecord {
            point: r.point,
            view: format!("{:?}", r.view),
            done: r.done,
            shift: r.shift,
            objective: r.objective,
            vaf: r.vaf,
        })
        .collect();
    Ok(Output {
        passes: Vec::new(),
        points,
        recovery: Some(report.into()),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("phasetrack=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    let ctx = RunContext::with_verbose(cli.verbose);

    let output = match (&config.grid, &config.points) {
        (Some(_), Some(_)) => return Err("grid and points are mutually exclusive".into()),
        (Some(grid), None) => run_grid_mode(&config, grid, &ctx)?,
        (None, Some(points)) => run_points_mode(&config, points, &ctx)?,
        (None, None) => return Err("one of grid or points must be set in the config".into()),
    };

    let json = serde_json::to_string_pretty(&output)?;
    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

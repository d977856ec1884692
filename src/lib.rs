//! PhaseTrack is a patch-based phase-correlation displacement tracker.
//!
//! This crate estimates sub-pixel 2-D shifts between pairs of images for
//! tracked stereo points or dense grids, using the cross-spectrum phase of
//! local Fourier transforms, a weighted least-squares phase-plane fit, a
//! per-worker spectrum cache, and a parallel coarse-to-fine refinement
//! pipeline with bounded error recovery. Parallelism is optional via the
//! `rayon` feature.

pub mod context;
pub mod estimate;
pub mod fft;
pub mod hierarchy;
pub mod image;
pub mod io;
pub mod parallel;
pub mod recover;
pub mod search;
pub mod spectrum;
pub mod stereo;
pub mod track;
mod trace;
pub mod util;

pub use context::RunContext;
pub use estimate::{estimate, PatchFit, SpectrumMask, Weighting};
pub use fft::FftPool;
pub use hierarchy::{
    run_grid, track_cycle, GridRun, OutputSpec, PassDescriptor, PassResult, PassSchedule,
    ViewPair,
};
pub use image::{ImageView, OwnedImage};
pub use parallel::{Partition, ResultGrid, SeedField};
pub use recover::{recover, RecoveryConfig, RecoveryReport};
pub use search::{converge_search, SearchOutcome, SearchParams, SearchState};
pub use spectrum::{CacheStats, SpectrumCache};
pub use stereo::{StereoGeometry, WorldPoint};
pub use track::{track_point, TrackParams, TrackRequest, View, WorkerState};
pub use util::{TrackError, TrackResult};

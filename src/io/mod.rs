//! File formats: MAT v4 named arrays, `.2d` point files, pass-parameter
//! files, and text stats reports.

pub mod mat;
pub mod params;
pub mod points;
pub mod report;

pub use mat::{read_mat, write_mat, NamedArray};
pub use params::read_schedule;
pub use points::{read_points, to_requests, write_points, PointNode};
pub use report::{readme_file, stats_file, StatsReport};

//! Stereo parallax reconstruction of tracked nodes.
//!
//! A calibrated millimetres-per-pixel scale and a world origin turn the
//! tracked left/right coordinates into world-space `X`, `Y`, `Z` arrays.
//! Lateral position is the view average; depth is proportional to the
//! horizontal disparity between the views. No lens model is applied.

use crate::io::mat::{NamedArray, NAME_WORLD_X, NAME_WORLD_Y, NAME_WORLD_Z};
use crate::io::points::PointNode;
use crate::track::{TrackRequest, View};
use crate::util::TrackResult;

/// Calibration for the parallax model.
#[derive(Clone, Copy, Debug)]
pub struct StereoGeometry {
    /// Millimetres per image pixel in the view plane.
    pub mm_per_pixel: f32,
    /// World-space origin added to every reconstructed point, in mm.
    pub origin: (f32, f32, f32),
    /// Millimetres of depth per pixel of horizontal disparity.
    pub depth_scale: f32,
}

/// One reconstructed node in world space, in millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldPoint {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Moves node coordinates by their tracked shifts.
///
/// Requests that are not done leave their view's coordinates untouched.
pub fn apply_shifts(nodes: &mut [PointNode], requests: &[TrackRequest]) {
    for request in requests {
        if !request.done {
            continue;
        }
        let Some(node) = nodes.iter_mut().find(|n| n.index == request.point) else {
            continue;
        };
        let target = match request.view {
            View::Left => &mut node.left,
            View::Right => &mut node.right,
        };
        target.0 += request.shift.0;
        target.1 += request.shift.1;
    }
}

/// Reconstructs world coordinates for every node.
pub fn reconstruct(nodes: &[PointNode], geometry: &StereoGeometry) -> Vec<WorldPoint> {
    let mm = f64::from(geometry.mm_per_pixel);
    let (ox, oy, oz) = (
        f64::from(geometry.origin.0),
        f64::from(geometry.origin.1),
        f64::from(geometry.origin.2),
    );
    nodes
        .iter()
        .map(|node| {
            let (xl, yl) = (f64::from(node.left.0), f64::from(node.left.1));
            let (xr, yr) = (f64::from(node.right.0), f64::from(node.right.1));
            WorldPoint {
                index: node.index,
                x: ox + mm * 0.5 * (xl + xr),
                y: oy + mm * 0.5 * (yl + yr),
                z: oz + f64::from(geometry.depth_scale) * (xl - xr),
            }
        })
        .collect()
}

/// Packs reconstructed points into the persisted `X`, `Y`, `Z` arrays.
pub fn world_arrays(points: &[WorldPoint]) -> TrackResult<[NamedArray; 3]> {
    let n = points.len();
    let x = NamedArray::new(NAME_WORLD_X, n, 1, points.iter().map(|p| p.x).collect())?;
    let y = NamedArray::new(NAME_WORLD_Y, n, 1, points.iter().map(|p| p.y).collect())?;
    let z = NamedArray::new(NAME_WORLD_Z, n, 1, points.iter().map(|p| p.z).collect())?;
    Ok([x, y, z])
}

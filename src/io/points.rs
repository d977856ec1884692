//! `.2d` point-coordinate text files.
//!
//! Alternating line pairs per node:
//!
//! ```text
//! Node: <index> CMF <radiusLeft> <radiusRight> NULL
//! <xLeft> <yLeft> <xRight> <yRight>
//! ```
//!
//! The legacy vertical axis points up, so y coordinates are converted with
//! `y' = 2 * height - y - 1` on both read and write. The conversion is its
//! own inverse.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::estimate::Weighting;
use crate::track::{TrackRequest, View};
use crate::util::{TrackError, TrackResult};

/// One stereo node from a point file, in image coordinates (y down).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointNode {
    pub index: usize,
    pub cm_radius_left: f32,
    pub cm_radius_right: f32,
    pub left: (f32, f32),
    pub right: (f32, f32),
}

fn flip_y(y: f32, height: usize) -> f32 {
    2.0 * height as f32 - y - 1.0
}

fn parse_f32(token: &str, line: usize, name: &str) -> TrackResult<f32> {
    token.parse().map_err(|_| TrackError::Parse {
        line,
        message: format!("invalid {name}: {token}"),
    })
}

/// Reads a `.2d` file, flipping y into image (y down) coordinates.
pub fn read_points(path: &Path, image_height: usize) -> TrackResult<Vec<PointNode>> {
    parse_points(&fs::read_to_string(path)?, image_height)
}

pub fn parse_points(text: &str, image_height: usize) -> TrackResult<Vec<PointNode>> {
    let mut nodes = Vec::new();
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    while let Some((line, header)) = lines.next() {
        let fields: Vec<&str> = header.split_whitespace().collect();
        if fields.len() != 6 || fields[0] != "Node:" || fields[2] != "CMF" || fields[5] != "NULL" {
            return Err(TrackError::Parse {
                line,
                message: format!("malformed node header: {header}"),
            });
        }
        let index: usize = fields[1].parse().map_err(|_| TrackError::Parse {
            line,
            message: format!("invalid node index: {}", fields[1]),
        })?;
        let cm_left = parse_f32(fields[3], line, "left CM radius")?;
        let cm_right = parse_f32(fields[4], line, "right CM radius")?;

        let (line, coords) = lines.next().ok_or(TrackError::Parse {
            line,
            message: "missing coordinate line after node header".into(),
        })?;
        let fields: Vec<&str> = coords.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(TrackError::Parse {
                line,
                message: format!("expected 4 coordinates, found {}", fields.len()),
            });
        }
        let xl = parse_f32(fields[0], line, "left x")?;
        let yl = parse_f32(fields[1], line, "left y")?;
        let xr = parse_f32(fields[2], line, "right x")?;
        let yr = parse_f32(fields[3], line, "right y")?;

        nodes.push(PointNode {
            index,
            cm_radius_left: cm_left,
            cm_radius_right: cm_right,
            left: (xl, flip_y(yl, image_height)),
            right: (xr, flip_y(yr, image_height)),
        });
    }
    Ok(nodes)
}

/// Writes nodes back out, flipping y into the file's (y up) convention.
pub fn write_points(path: &Path, nodes: &[PointNode], image_height: usize) -> TrackResult<()> {
    let mut out = String::new();
    for node in nodes {
        out.push_str(&format!(
            "Node: {} CMF {} {} NULL\n{} {} {} {}\n",
            node.index,
            node.cm_radius_left,
            node.cm_radius_right,
            node.left.0,
            flip_y(node.left.1, image_height),
            node.right.0,
            flip_y(node.right.1, image_height),
        ));
    }
    let mut file = fs::File::create(path)?;
    file.write_all(out.as_bytes())?;
    Ok(())
}

/// Expands nodes into track requests, one per view per node.
pub fn to_requests(nodes: &[PointNode], weighting: Weighting) -> Vec<TrackRequest> {
    let mut requests = Vec::with_capacity(nodes.len() * 2);
    for node in nodes {
        requests.push(
            TrackRequest::new(node.index, View::Left, node.left, weighting)
                .with_cm_radius(node.cm_radius_left),
        );
        requests.push(
            TrackRequest::new(node.index, View::Right, node.right, weighting)
                .with_cm_radius(node.cm_radius_right),
        );
    }
    requests
}

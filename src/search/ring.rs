//! Elliptical ring admission for the convergence search.
//!
//! Candidate offsets are admitted ring by ring, growing one unit per
//! iteration until the bounding ellipse `(rx, ry)` is covered. Ring
//! assignment is a pure function so the growth order is testable on its own.

/// Ring index of an offset inside the bounding ellipse, or `None` outside.
///
/// Ring 0 holds only the origin; ring `k` holds offsets whose normalized
/// elliptical radius falls in `(k-1, k]` on a `0..=max(rx, ry)` scale.
pub fn ring_of(dx: i32, dy: i32, rx: usize, ry: usize) -> Option<usize> {
    if dx.unsigned_abs() as usize > rx || dy.unsigned_abs() as usize > ry {
        return None;
    }
    if dx == 0 && dy == 0 {
        return Some(0);
    }

    let tx = if rx == 0 {
        0.0
    } else {
        f64::from(dx) / rx as f64
    };
    let ty = if ry == 0 {
        0.0
    } else {
        f64::from(dy) / ry as f64
    };
    let radius = (tx * tx + ty * ty).sqrt();
    if radius > 1.0 + 1e-9 {
        return None;
    }

    let scale = rx.max(ry) as f64;
    let ring = (radius * scale - 1e-9).ceil() as usize;
    Some(ring.max(1))
}

/// Number of rings needed to cover the `(rx, ry)` ellipse.
pub fn ring_count(rx: usize, ry: usize) -> usize {
    rx.max(ry) + 1
}

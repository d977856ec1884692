//! Power-of-two image decimation.
//!
//! Each output sample is the box average of a `factor x factor` block, the
//! same reduction the coarse hierarchical passes apply before correlating.
//! Residual columns/rows that do not fill a whole block are dropped.

use crate::image::{ImageView, OwnedImage};
use crate::util::{TrackError, TrackResult};

/// Decimates `src` by an integral power-of-two factor.
///
/// A factor of 1 returns a contiguous copy of the source.
pub fn decimate(src: ImageView<'_, f32>, factor: usize) -> TrackResult<OwnedImage> {
    if factor == 0 || !crate::util::math::is_power_of_two(factor) {
        return Err(TrackError::InvalidSchedule(format!(
            "decimation factor {factor} is not a power of two"
        )));
    }
    if factor == 1 {
        return OwnedImage::from_view(src);
    }

    let dst_width = src.width() / factor;
    let dst_height = src.height() / factor;
    if dst_width == 0 || dst_height == 0 {
        return Err(TrackError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        });
    }

    let norm = 1.0 / (factor * factor) as f32;
    let mut dst = vec![0.0f32; dst_width * dst_height];
    for y in 0..dst_height {
        for dy in 0..factor {
            let row = src
                .row(y * factor + dy)
                .ok_or(TrackError::BufferTooSmall {
                    needed: (y * factor + dy + 1) * src.stride(),
                    got: src.as_slice().len(),
                })?;
            for x in 0..dst_width {
                let mut sum = 0.0f32;
                for dx in 0..factor {
                    sum += row[x * factor + dx];
                }
                dst[y * dst_width + x] += sum;
            }
        }
    }
    for v in &mut dst {
        *v *= norm;
    }
    OwnedImage::from_vec(dst, dst_width, dst_height)
}

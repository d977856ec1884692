//! Image views and owned sample buffers.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. ROI slices are
//! zero-copy views into the same backing slice and retain the original stride.
//!
//! The correlation core operates on real-valued `f32` samples; `OwnedImage`
//! holds a contiguous buffer and provides the canonical-range normalization
//! performed before any correlation.

use crate::util::{TrackError, TrackResult};

pub mod decimate;

#[cfg(feature = "image-io")]
pub mod io;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> TrackResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> TrackResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(TrackError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> TrackResult<usize> {
    if width == 0 || height == 0 {
        return Err(TrackError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(TrackError::InvalidStride { width, stride });
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(TrackError::InvalidDimensions { width, height })?;
    Ok(needed)
}

/// Owned contiguous real-valued image buffer.
#[derive(Clone)]
pub struct OwnedImage {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl OwnedImage {
    /// Wraps a contiguous buffer; the length must match `width * height` exactly.
    pub fn from_vec(data: Vec<f32>, width: usize, height: usize) -> TrackResult<Self> {
        if width == 0 || height == 0 {
            return Err(TrackError::InvalidDimensions { width, height });
        }
        let needed = width
            .checked_mul(height)
            .ok_or(TrackError::InvalidDimensions { width, height })?;
        if data.len() < needed {
            return Err(TrackError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(TrackError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Copies a (possibly strided) view into a contiguous owned image.
    pub fn from_view(view: ImageView<'_, f32>) -> TrackResult<Self> {
        let width = view.width();
        let height = view.height();
        let mut data = vec![0.0f32; width * height];
        for y in 0..height {
            let row = view.row(y).ok_or(TrackError::BufferTooSmall {
                needed: (y + 1) * view.stride(),
                got: view.as_slice().len(),
            })?;
            data[y * width..(y + 1) * width].copy_from_slice(row);
        }
        Self::from_vec(data, width, height)
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the sample buffer in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, f32> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Rescales samples to the canonical [0, 1] range in place.
    ///
    /// A constant image maps to all zeros. Performed once per input image
    /// before any spectrum is computed, so patch spectra taken from the same
    /// image are always comparable.
    pub fn normalize(&mut self) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
        }
        if !(max > min) {
            self.data.fill(0.0);
            return;
        }
        let scale = 1.0 / (max - min);
        for v in &mut self.data {
            *v = (*v - min) * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageView, OwnedImage};

    #[test]
    fn view_rejects_short_buffers() {
        let data = vec![0.0f32; 5];
        assert!(ImageView::from_slice(&data, 3, 2).is_err());
        assert!(ImageView::from_slice(&data, 5, 1).is_ok());
    }

    #[test]
    fn strided_view_reads_rows() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let view = ImageView::new(&data, 3, 3, 4).unwrap();
        assert_eq!(view.row(1).unwrap(), &[4.0, 5.0, 6.0]);
        assert_eq!(*view.get(2, 2).unwrap(), 10.0);
        assert!(view.get(3, 0).is_none());
    }

    #[test]
    fn normalize_maps_to_unit_range() {
        let mut img = OwnedImage::from_vec(vec![2.0, 4.0, 6.0, 8.0], 2, 2).unwrap();
        img.normalize();
        assert_eq!(img.data()[0], 0.0);
        assert_eq!(img.data()[3], 1.0);
    }

    #[test]
    fn normalize_flattens_constant_images() {
        let mut img = OwnedImage::from_vec(vec![5.0; 4], 2, 2).unwrap();
        img.normalize();
        assert!(img.data().iter().all(|&v| v == 0.0));
    }
}

//! Convenience helpers for loading images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Loaded images are
//! converted to `f32` samples and normalized to the canonical range.

use crate::image::OwnedImage;
use crate::util::{TrackError, TrackResult};
use std::path::Path;

/// Creates an owned `f32` image from a grayscale image buffer.
pub fn owned_from_gray_image(img: &image::GrayImage) -> TrackResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let data = img.as_raw().iter().map(|&v| f32::from(v)).collect();
    OwnedImage::from_vec(data, width, height)
}

/// Creates an owned grayscale image from a dynamic image.
pub fn owned_from_dynamic_image(img: &image::DynamicImage) -> TrackResult<OwnedImage> {
    let gray = img.to_luma8();
    owned_from_gray_image(&gray)
}

/// Loads an image from disk, converts to grayscale, and normalizes it.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> TrackResult<OwnedImage> {
    let img = image::open(path).map_err(|err| TrackError::ImageIo {
        reason: err.to_string(),
    })?;
    let mut owned = owned_from_dynamic_image(&img)?;
    owned.normalize();
    Ok(owned)
}

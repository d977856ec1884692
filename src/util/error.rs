//! Error types for phasetrack.

use thiserror::Error;

/// Result alias for phasetrack operations.
pub type TrackResult<T> = std::result::Result<T, TrackError>;

/// Errors that can occur when running phasetrack algorithms.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Image or kernel dimensions are invalid (zero or overflowing).
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// A backing buffer is shorter than the view requires.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    /// The stride is smaller than the row width.
    #[error("invalid stride: width {width}, stride {stride}")]
    InvalidStride { width: usize, stride: usize },

    /// A patch or region does not fit inside the image.
    #[error(
        "region out of bounds: {width}x{height} at ({x}, {y}) in {img_width}x{img_height} image"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },

    /// An index exceeded a container length.
    #[error("index {index} out of bounds for {context} of length {len}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },

    /// The correlation kernel does not fit the image at the requested center.
    #[error("kernel width {kernel_width} too large for {img_width}x{img_height} image")]
    KernelTooLarge {
        kernel_width: usize,
        img_width: usize,
        img_height: usize,
    },

    /// The two images of a pair have different sizes.
    #[error("image size mismatch: {width_a}x{height_a} vs {width_b}x{height_b}")]
    SizeMismatch {
        width_a: usize,
        height_a: usize,
        width_b: usize,
        height_b: usize,
    },

    /// Spectral interpolation produced a non-finite sample.
    #[error("non-finite value during spectral interpolation at index {index}")]
    NonFiniteInterpolation { index: usize },

    /// A pass schedule failed validation.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A text input file could not be parsed.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A named-array file has an unsupported or corrupt header.
    #[error("mat format error: {0}")]
    MatFormat(String),

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding failure.
    #[error("image i/o error: {reason}")]
    ImageIo { reason: String },

    /// A convergence search could not evaluate any candidate offset.
    #[error("no evaluable search candidates")]
    NoCandidates,

    /// The run was cancelled through the run context.
    #[error("run aborted")]
    Aborted,

    /// A worker failed; the first underlying error is carried.
    #[error("worker {worker} failed: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: Box<TrackError>,
    },
}

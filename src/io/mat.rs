//! Level-4 MAT named-array files.
//!
//! The on-disk layout matches the legacy writer bit for bit: a five-field
//! little-endian `i32` header (matrix type, mrows, ncols, imagf, name length
//! including the terminating NUL), the NUL-terminated name, then the real
//! `f64` payload. The legacy writer stores `mrows = width` and walks the
//! image row-major, so the payload order is x-fastest and is kept as-is on
//! both read and write.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::util::{TrackError, TrackResult};

/// Matrix type code for little-endian f64, the only form read or written.
const MAT_TYPE_F64_LE: i32 = 0;

/// Array names used by the grid writers.
pub const NAME_SHIFTS_X: &str = "shiftsX";
pub const NAME_SHIFTS_Y: &str = "shiftsY";
pub const NAME_OBJECTIVE: &str = "objsfuncs";
pub const NAME_VAF: &str = "VAFs";
pub const NAME_SEED_X: &str = "dxs";
pub const NAME_SEED_Y: &str = "dys";
pub const NAME_WORLD_X: &str = "X";
pub const NAME_WORLD_Y: &str = "Y";
pub const NAME_WORLD_Z: &str = "Z";

/// A named 2-D f64 array, the unit of MAT file exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedArray {
    pub name: String,
    pub width: usize,
    pub height: usize,
    /// Row-major samples, `width * height` long.
    pub data: Vec<f64>,
}

impl NamedArray {
    pub fn new(name: &str, width: usize, height: usize, data: Vec<f64>) -> TrackResult<Self> {
        if data.len() != width * height {
            return Err(TrackError::BufferTooSmall {
                needed: width * height,
                got: data.len(),
            });
        }
        Ok(Self {
            name: name.to_owned(),
            width,
            height,
            data,
        })
    }

    /// Widens an f32 grid plane into a named array.
    pub fn from_f32(name: &str, width: usize, height: usize, data: &[f32]) -> TrackResult<Self> {
        Self::new(name, width, height, data.iter().map(|&v| f64::from(v)).collect())
    }
}

fn write_i32(w: &mut impl Write, value: i32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn read_i32(r: &mut impl Read) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Writes one named array to `path`, truncating any existing file.
pub fn write_mat(path: &Path, array: &NamedArray) -> TrackResult<()> {
    let mut w = BufWriter::new(File::create(path)?);
    let namlen = array.name.len() + 1;
    write_i32(&mut w, MAT_TYPE_F64_LE)?;
    write_i32(&mut w, array.width as i32)?;
    write_i32(&mut w, array.height as i32)?;
    write_i32(&mut w, 0)?;
    write_i32(&mut w, namlen as i32)?;
    w.write_all(array.name.as_bytes())?;
    w.write_all(&[0u8])?;
    for &v in &array.data {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Reads one named array from `path`.
///
/// Header dimensions are validated against the file length before anything
/// is allocated, so corrupt or hostile headers fail with `MatFormat`.
pub fn read_mat(path: &Path) -> TrackResult<NamedArray> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(file);
    let mat_type = read_i32(&mut r)?;
    if mat_type != MAT_TYPE_F64_LE {
        return Err(TrackError::MatFormat(format!(
            "unsupported matrix type {mat_type}"
        )));
    }
    let mrows = read_i32(&mut r)?;
    let ncols = read_i32(&mut r)?;
    let imagf = read_i32(&mut r)?;
    let namlen = read_i32(&mut r)?;
    if mrows <= 0 || ncols <= 0 {
        return Err(TrackError::MatFormat(format!(
            "invalid dimensions {mrows}x{ncols}"
        )));
    }
    if imagf != 0 {
        return Err(TrackError::MatFormat("imaginary part not supported".into()));
    }
    if namlen < 1 {
        return Err(TrackError::MatFormat(format!("invalid name length {namlen}")));
    }

    let mut name_bytes = vec![0u8; namlen as usize];
    r.read_exact(&mut name_bytes)?;
    if name_bytes.pop() != Some(0) {
        return Err(TrackError::MatFormat("name is not NUL terminated".into()));
    }
    let name = String::from_utf8(name_bytes)
        .map_err(|_| TrackError::MatFormat("name is not valid UTF-8".into()))?;

    let width = mrows as usize;
    let height = ncols as usize;
    let count = width
        .checked_mul(height)
        .ok_or_else(|| TrackError::MatFormat(format!("invalid dimensions {mrows}x{ncols}")))?;
    let expected = (count as u64)
        .saturating_mul(8)
        .saturating_add(20 + namlen as u64);
    if expected != file_len {
        return Err(TrackError::MatFormat(format!(
            "{mrows}x{ncols} payload does not match file length {file_len}"
        )));
    }

    let mut data = Vec::with_capacity(count);
    let mut buf = [0u8; 8];
    for _ in 0..count {
        r.read_exact(&mut buf)?;
        data.push(f64::from_le_bytes(buf));
    }
    Ok(NamedArray {
        name,
        width,
        height,
        data,
    })
}

/// `<prefix>_<NN>_<name>.mat`, one worker's partial array.
pub fn worker_file(prefix: &Path, worker: usize, name: &str) -> PathBuf {
    append_suffix(prefix, &format!("_{worker:02}_{name}.mat"))
}

/// `<prefix>_<name>_d<DD>.mat`, a combined grid at one decimation.
pub fn grid_file(prefix: &Path, name: &str, decimation: usize) -> PathBuf {
    append_suffix(prefix, &format!("_{name}_d{decimation:02}.mat"))
}

/// `<prefix>_<name>_INTERPOLATED_d<DD>.mat`, a grid upsampled to full size.
pub fn interpolated_file(prefix: &Path, name: &str, decimation: usize) -> PathBuf {
    append_suffix(prefix, &format!("_{name}_INTERPOLATED_d{decimation:02}.mat"))
}

/// `<prefix>_<name>_FILTERED.mat`, a grid after smoothing.
pub fn filtered_file(prefix: &Path, name: &str) -> PathBuf {
    append_suffix(prefix, &format!("_{name}_FILTERED.mat"))
}

fn append_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

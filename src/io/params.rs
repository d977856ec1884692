//! Legacy pass-parameter files.
//!
//! One header line (ignored), then one line per pass with twelve
//! whitespace-separated fields: index, decimation, lagsX, lagsY,
//! samplingIncrement, kernelWidth, maxFilterRadius, residualThreshold,
//! cacheSize, filterEnable, writeIntermediateFlag, writeSecondaryFlag.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::hierarchy::{PassDescriptor, PassSchedule};
use crate::util::{TrackError, TrackResult};

const FIELDS_PER_PASS: usize = 12;

fn field<T: FromStr>(fields: &[&str], idx: usize, line: usize, name: &str) -> TrackResult<T> {
    fields[idx].parse().map_err(|_| TrackError::Parse {
        line,
        message: format!("invalid {name}: {}", fields[idx]),
    })
}

fn flag(fields: &[&str], idx: usize, line: usize, name: &str) -> TrackResult<bool> {
    let raw: i64 = field(fields, idx, line, name)?;
    Ok(raw != 0)
}

/// Parses a pass-parameter file into a validated schedule.
pub fn read_schedule(path: &Path) -> TrackResult<PassSchedule> {
    parse_schedule(&fs::read_to_string(path)?)
}

pub fn parse_schedule(text: &str) -> TrackResult<PassSchedule> {
    let mut passes = Vec::new();
    for (number, raw) in text.lines().enumerate().skip(1) {
        let line = number + 1;
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != FIELDS_PER_PASS {
            return Err(TrackError::Parse {
                line,
                message: format!(
                    "expected {FIELDS_PER_PASS} fields, found {}",
                    fields.len()
                ),
            });
        }
        passes.push(PassDescriptor {
            index: field(&fields, 0, line, "pass index")?,
            decimation: field(&fields, 1, line, "decimation")?,
            lags_x: field(&fields, 2, line, "lagsX")?,
            lags_y: field(&fields, 3, line, "lagsY")?,
            sampling_increment: field(&fields, 4, line, "samplingIncrement")?,
            kernel_width: field(&fields, 5, line, "kernelWidth")?,
            max_fit_radius: field(&fields, 6, line, "maxFilterRadius")?,
            objective_threshold: field(&fields, 7, line, "residualThreshold")?,
            cache_size: field(&fields, 8, line, "cacheSize")?,
            filter_enable: flag(&fields, 9, line, "filterEnable")?,
            write_intermediate: flag(&fields, 10, line, "writeIntermediateFlag")?,
            write_secondary: flag(&fields, 11, line, "writeSecondaryFlag")?,
        });
    }
    PassSchedule::new(passes)
}

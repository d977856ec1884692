//! Worker partitioning and per-pass orchestration.
//!
//! A pass's grid is split into rectangular sub-regions (area decomposition)
//! or horizontal slices, one worker per partition up to a fixed maximum.
//! Workers run identical pass logic over their cells with private caches and
//! scratch; the only shared state is the run context's abort flag. The pass
//! barrier is the collection itself: recombination starts only after every
//! worker has returned, and the first failure aborts the remaining work.

pub mod aggregate;

pub use aggregate::{GridFilter, PartialGrid, ResultGrid, SeedField};

use crate::context::RunContext;
use crate::trace::{trace_event, trace_span};
use crate::util::{TrackError, TrackResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Upper bound on workers per pass.
pub const MAX_WORKERS: usize = 64;

/// Work decomposition over the pass grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partition {
    /// Rectangular sub-regions, `nx` across by `ny` down.
    Area { nx: usize, ny: usize },
    /// `n` horizontal slices.
    Slices { n: usize },
}

impl Default for Partition {
    fn default() -> Self {
        Partition::Slices { n: 1 }
    }
}

/// One worker's sub-region, in grid-cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x0: usize,
    pub y0: usize,
    pub width: usize,
    pub height: usize,
}

fn split_spans(total: usize, parts: usize) -> Vec<(usize, usize)> {
    let parts = parts.clamp(1, total.max(1));
    let base = total / parts;
    let extra = total % parts;
    let mut spans = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        if len > 0 {
            spans.push((start, len));
        }
        start += len;
    }
    spans
}

/// Splits a `grid_w x grid_h` cell grid into worker rectangles.
///
/// Empty rectangles are dropped and the worker count is clamped to
/// [`MAX_WORKERS`].
pub fn partition_rects(grid_w: usize, grid_h: usize, partition: Partition) -> Vec<Rect> {
    let mut rects = Vec::new();
    match partition {
        Partition::Area { nx, ny } => {
            let cols = split_spans(grid_w, nx.max(1));
            let rows = split_spans(grid_h, ny.max(1));
            for &(y0, h) in &rows {
                for &(x0, w) in &cols {
                    rects.push(Rect {
                        x0,
                        y0,
                        width: w,
                        height: h,
                    });
                }
            }
        }
        Partition::Slices { n } => {
            for (y0, h) in split_spans(grid_h, n.max(1)) {
                rects.push(Rect {
                    x0: 0,
                    y0,
                    width: grid_w,
                    height: h,
                });
            }
        }
    }
    if rects.len() > MAX_WORKERS {
        // Over-subscribed decompositions fall back to bounded slices.
        return partition_rects(grid_w, grid_h, Partition::Slices { n: MAX_WORKERS });
    }
    rects
}

fn worker_error(worker: usize, source: TrackError) -> TrackError {
    match source {
        TrackError::Aborted => TrackError::Aborted,
        other => TrackError::Worker {
            worker,
            source: Box::new(other),
        },
    }
}

/// Runs one pass over the partitions and collects every worker's output.
///
/// Returns only after all workers have finished (the inter-pass barrier).
/// On the first failure the abort flag is raised so the remaining workers
/// stop at their next checkpoint, and the failing worker's error is
/// returned.
pub fn run_pass<T, W>(rects: &[Rect], ctx: &RunContext, worker: W) -> TrackResult<Vec<T>>
where
    T: Send,
    W: Fn(usize, Rect) -> TrackResult<T> + Sync,
{
    let _span = trace_span!("run_pass", workers = rects.len()).entered();
    ctx.checkpoint()?;

    #[cfg(feature = "rayon")]
    let results: Vec<TrackResult<T>> = rects
        .par_iter()
        .enumerate()
        .map(|(index, &rect)| {
            let out = worker(index, rect);
            if out.is_err() {
                ctx.request_abort();
            }
            out
        })
        .collect();

    #[cfg(not(feature = "rayon"))]
    let results: Vec<TrackResult<T>> = rects
        .iter()
        .enumerate()
        .map(|(index, &rect)| {
            if ctx.is_aborted() {
                return Err(TrackError::Aborted);
            }
            let out = worker(index, rect);
            if out.is_err() {
                ctx.request_abort();
            }
            out
        })
        .collect();

    let outputs = collect_outputs(results)?;
    trace_event!("pass_complete", workers = outputs.len());
    Ok(outputs)
}

/// Unwraps every worker result or reports the root-cause failure.
///
/// Workers that merely observed the abort flag return `Aborted`; a real
/// failure elsewhere in the batch takes precedence over those so the cause
/// is not shadowed by a lower-index bystander.
fn collect_outputs<T>(results: Vec<TrackResult<T>>) -> TrackResult<Vec<T>> {
    let mut outputs = Vec::with_capacity(results.len());
    let mut failure: Option<TrackError> = None;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => outputs.push(value),
            Err(source) => {
                let err = worker_error(index, source);
                let keep_current = matches!(failure, Some(ref f) if !matches!(f, TrackError::Aborted))
                    || (failure.is_some() && matches!(err, TrackError::Aborted));
                if !keep_current {
                    failure = Some(err);
                }
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

#[cfg(test)]
mod tests {
    use super::{collect_outputs, partition_rects, run_pass, Partition, Rect, MAX_WORKERS};
    use crate::context::RunContext;
    use crate::util::TrackError;

    fn covered_cells(rects: &[Rect]) -> usize {
        rects.iter().map(|r| r.width * r.height).sum()
    }

    #[test]
    fn area_partition_covers_the_grid_disjointly() {
        let rects = partition_rects(10, 7, Partition::Area { nx: 3, ny: 2 });
        assert_eq!(rects.len(), 6);
        assert_eq!(covered_cells(&rects), 70);
    }

    #[test]
    fn slices_partition_covers_the_grid() {
        let rects = partition_rects(5, 12, Partition::Slices { n: 4 });
        assert_eq!(rects.len(), 4);
        assert_eq!(covered_cells(&rects), 60);
        assert!(rects.iter().all(|r| r.width == 5));
    }

    #[test]
    fn worker_count_is_bounded() {
        let rects = partition_rects(200, 200, Partition::Area { nx: 20, ny: 20 });
        assert!(rects.len() <= MAX_WORKERS);
        assert_eq!(covered_cells(&rects), 40_000);
    }

    #[test]
    fn oversubscribed_partition_drops_empty_rects() {
        let rects = partition_rects(3, 2, Partition::Slices { n: 10 });
        assert_eq!(rects.len(), 2);
        assert_eq!(covered_cells(&rects), 6);
    }

    #[test]
    fn failing_worker_aborts_the_pass() {
        let ctx = RunContext::new();
        let rects = partition_rects(4, 4, Partition::Slices { n: 4 });
        let result = run_pass(&rects, &ctx, |index, _rect| {
            if index == 2 {
                Err(TrackError::NoCandidates)
            } else {
                Ok(index)
            }
        });
        assert!(result.is_err());
        assert!(ctx.is_aborted());
    }

    #[test]
    fn bystander_abort_does_not_shadow_the_failing_worker() {
        // Worker 0 stopped at its checkpoint after worker 2 failed; the
        // reported error must name worker 2's failure, not the abort.
        let results: Vec<crate::util::TrackResult<usize>> = vec![
            Err(TrackError::Aborted),
            Ok(1),
            Err(TrackError::NoCandidates),
        ];
        let err = collect_outputs(results).unwrap_err();
        match err {
            TrackError::Worker { worker, source } => {
                assert_eq!(worker, 2);
                assert!(matches!(*source, TrackError::NoCandidates));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn all_aborted_workers_report_aborted() {
        let results: Vec<crate::util::TrackResult<usize>> =
            vec![Err(TrackError::Aborted), Err(TrackError::Aborted)];
        assert!(matches!(
            collect_outputs(results).unwrap_err(),
            TrackError::Aborted
        ));
    }

    #[test]
    fn successful_pass_returns_all_outputs() {
        let ctx = RunContext::new();
        let rects = partition_rects(4, 4, Partition::Area { nx: 2, ny: 2 });
        let outputs = run_pass(&rects, &ctx, |index, rect| Ok((index, rect.width))).unwrap();
        assert_eq!(outputs.len(), 4);
    }
}

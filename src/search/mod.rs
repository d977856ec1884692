//! Neighborhood convergence search ("bugout").
//!
//! The search expands an elliptical ring of candidate centers around an
//! initial guess, invoking the patch estimator lazily for each admitted
//! offset. It stops as soon as some evaluated center's four axis-aligned
//! neighbors each show a near-unit step in fitted sub-pixel shift, which
//! signals the estimator is tracking the same minimum from adjacent integer
//! offsets, or when the maximum radius is exhausted.

pub(crate) mod index;
pub(crate) mod ring;

pub use index::IndexMap;
pub use ring::{ring_of, ring_count};

use crate::context::RunContext;
use crate::estimate::{PatchFit, Weighting};
use crate::trace::{trace_event, trace_span};
use crate::util::{TrackError, TrackResult};

/// Parameters for one convergence search.
#[derive(Clone, Copy, Debug)]
pub struct SearchParams {
    /// Maximum candidate offset along x, in pixels.
    pub max_radius_x: usize,
    /// Maximum candidate offset along y, in pixels.
    pub max_radius_y: usize,
    /// Tolerance on the unit-step neighbor coherence test.
    pub step_tolerance: f32,
    /// Objective value below which a candidate is acceptable.
    pub objective_threshold: f32,
    /// Weighting mode of the underlying fits.
    pub weighting: Weighting,
}

impl SearchParams {
    /// Default tolerance on the unit-step coherence test.
    pub const DEFAULT_STEP_TOLERANCE: f32 = 0.35;
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_radius_x: 4,
            max_radius_y: 4,
            step_tolerance: SearchParams::DEFAULT_STEP_TOLERANCE,
            objective_threshold: 1.0,
            weighting: Weighting::Coherence,
        }
    }
}

/// Search termination state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    /// Rings are still being admitted.
    Growing,
    /// The neighbor coherence test fired.
    Converged,
    /// The maximum radius was reached without convergence.
    Exhausted,
}

/// Result of one convergence search.
#[derive(Clone, Copy, Debug)]
pub struct SearchOutcome {
    /// Integer candidate offset of the selected center.
    pub offset: (i32, i32),
    /// Estimator fit at the selected center.
    pub fit: PatchFit,
    /// True when the neighbor coherence test fired.
    pub converged: bool,
    /// Number of estimator invocations performed.
    pub evaluations: usize,
}

#[derive(Clone, Copy)]
struct Evaluated {
    offset: (i32, i32),
    fit: PatchFit,
}

/// Unit-step coherence test at `center`, given its four neighbors.
///
/// The left/right pair must each step the fitted x-shift by about one pixel
/// and the top/bottom pair the y-shift, which is exactly what adjacent
/// integer offsets around a common minimum produce. Pure over the slot data
/// so the criterion is testable in isolation.
fn bugout_fires(
    center: &PatchFit,
    left: &PatchFit,
    right: &PatchFit,
    top: &PatchFit,
    bottom: &PatchFit,
    params: &SearchParams,
) -> bool {
    if center.overflowed
        || left.overflowed
        || right.overflowed
        || top.overflowed
        || bottom.overflowed
    {
        return false;
    }
    let tol = params.step_tolerance;
    let unit = |step: f32| (step.abs() - 1.0).abs() <= tol;
    if !(unit(left.dx - center.dx) && unit(right.dx - center.dx)) {
        return false;
    }
    if !(unit(top.dy - center.dy) && unit(bottom.dy - center.dy)) {
        return false;
    }
    match params.weighting {
        Weighting::Coherence => center.objective <= params.objective_threshold,
        Weighting::Magnitude => true,
    }
}

/// Runs the convergence search, driving `oracle` for each admitted offset.
///
/// The oracle returns `Ok(None)` for offsets it cannot evaluate (for example
/// a patch falling outside the image); those are skipped. The search never
/// evaluates an offset twice and never leaves the bounding ellipse.
pub fn converge_search<F>(
    params: &SearchParams,
    ctx: &RunContext,
    mut oracle: F,
) -> TrackResult<SearchOutcome>
where
    F: FnMut((i32, i32)) -> TrackResult<Option<PatchFit>>,
{
    let rx = params.max_radius_x;
    let ry = params.max_radius_y;
    let _span = trace_span!("converge_search", rx = rx, ry = ry).entered();

    let mut map = IndexMap::new(rx, ry);
    let mut evaluated: Vec<Evaluated> = Vec::new();
    let mut state = SearchState::Growing;
    let mut winner: Option<usize> = None;

    'rings: for ring in 0..ring_count(rx, ry) {
        for dy in -(ry as i32)..=ry as i32 {
            for dx in -(rx as i32)..=rx as i32 {
                if ring_of(dx, dy, rx, ry) != Some(ring) {
                    continue;
                }
                ctx.checkpoint()?;
                if map.get((dx, dy)).is_some() {
                    continue;
                }
                let fit = match oracle((dx, dy))? {
                    Some(fit) => fit,
                    None => continue,
                };
                let slot = evaluated.len();
                evaluated.push(Evaluated {
                    offset: (dx, dy),
                    fit,
                });
                map.insert((dx, dy), slot);

                // The new offset may complete the neighborhood of itself or
                // of any of its four neighbors.
                let centers = [
                    (dx, dy),
                    (dx - 1, dy),
                    (dx + 1, dy),
                    (dx, dy - 1),
                    (dx, dy + 1),
                ];
                for center in centers {
                    let Some(center_slot) = map.get(center) else {
                        continue;
                    };
                    let Some(neighbors) = map.neighbors(center) else {
                        continue;
                    };
                    let [l, r, t, b] = neighbors;
                    if bugout_fires(
                        &evaluated[center_slot].fit,
                        &evaluated[l].fit,
                        &evaluated[r].fit,
                        &evaluated[t].fit,
                        &evaluated[b].fit,
                        params,
                    ) {
                        // Best of the five by objective.
                        let five = [center_slot, l, r, t, b];
                        winner = five
                            .into_iter()
                            .filter(|&s| !evaluated[s].fit.overflowed)
                            .min_by(|&a, &b| {
                                evaluated[a]
                                    .fit
                                    .objective
                                    .total_cmp(&evaluated[b].fit.objective)
                            })
                            .or(Some(center_slot));
                        state = SearchState::Converged;
                        break 'rings;
                    }
                }
            }
        }
    }

    if state == SearchState::Growing {
        state = SearchState::Exhausted;
    }

    let chosen = match winner {
        Some(slot) => slot,
        None => {
            // Exhausted: fall back to the lowest objective seen anywhere.
            let best = evaluated
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.fit.overflowed)
                .min_by(|(_, a), (_, b)| a.fit.objective.total_cmp(&b.fit.objective))
                .map(|(i, _)| i)
                .or_else(|| {
                    evaluated
                        .iter()
                        .enumerate()
                        .min_by(|(_, a), (_, b)| a.fit.objective.total_cmp(&b.fit.objective))
                        .map(|(i, _)| i)
                });
            best.ok_or(TrackError::NoCandidates)?
        }
    };

    trace_event!(
        "search_done",
        evaluations = evaluated.len(),
        converged = state == SearchState::Converged
    );
    Ok(SearchOutcome {
        offset: evaluated[chosen].offset,
        fit: evaluated[chosen].fit,
        converged: state == SearchState::Converged,
        evaluations: evaluated.len(),
    })
}

//! Post-cycle error recovery.
//!
//! Two checks run after a full tracking cycle, repeated up to a bounded
//! number of passes:
//!
//! 1. co-registration: two distinct points on the same view whose post-shift
//!    locations fall within a distance threshold are both rerun with an
//!    enlarged kernel and no guess;
//! 2. disparity: a point whose left and right shift estimates disagree
//!    beyond a threshold is rerun on both views with an enlarged kernel and
//!    no guess; if the disagreement persists, only the view with the worse
//!    objective is rerun, seeded with the better view's estimate negated.
//!
//! Remaining conflicts are reported in counts, never as errors.

use std::collections::{HashMap, HashSet};

use crate::context::RunContext;
use crate::hierarchy::{PassDescriptor, ViewPair};
use crate::search::SearchParams;
use crate::track::{track_point, TrackParams, TrackRequest, View, WorkerState};
use crate::trace::{trace_event, trace_span};
use crate::util::{TrackError, TrackResult};

/// Thresholds and bounds for the recovery loop.
#[derive(Clone, Copy, Debug)]
pub struct RecoveryConfig {
    /// Post-shift distance below which two points collide, in pixels.
    pub coregistration_threshold: f32,
    /// Left/right shift mismatch above which a point is inconsistent.
    pub disparity_threshold: f32,
    /// Maximum number of recovery passes.
    pub max_passes: usize,
    /// Kernel enlargement factor for reruns.
    pub kernel_growth: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            coregistration_threshold: 2.0,
            disparity_threshold: 3.0,
            max_passes: 3,
            kernel_growth: 2,
        }
    }
}

/// Conflict counts over one recovery run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub passes_run: usize,
    pub coregistration_found: usize,
    pub coregistration_remaining: usize,
    pub disparity_found: usize,
    pub disparity_remaining: usize,
}

impl RecoveryReport {
    pub fn coregistration_fixed(&self) -> usize {
        self.coregistration_found
            .saturating_sub(self.coregistration_remaining)
    }

    pub fn disparity_fixed(&self) -> usize {
        self.disparity_found.saturating_sub(self.disparity_remaining)
    }
}

fn post_location(request: &TrackRequest) -> (f32, f32) {
    (
        request.target.0 + request.shift.0,
        request.target.1 + request.shift.1,
    )
}

/// Indices of requests colliding with another point on the same view.
fn coregistration_conflicts(requests: &[TrackRequest], threshold: f32) -> Vec<usize> {
    let mut flagged = HashSet::new();
    for i in 0..requests.len() {
        if !requests[i].done {
            continue;
        }
        for j in i + 1..requests.len() {
            let (a, b) = (&requests[i], &requests[j]);
            if !b.done || a.view != b.view || a.point == b.point {
                continue;
            }
            let (ax, ay) = post_location(a);
            let (bx, by) = post_location(b);
            let dist = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
            if dist < threshold {
                flagged.insert(i);
                flagged.insert(j);
            }
        }
    }
    let mut out: Vec<usize> = flagged.into_iter().collect();
    out.sort_unstable();
    out
}

/// Pairs of request indices (left, right) whose shifts disagree.
fn disparity_conflicts(requests: &[TrackRequest], threshold: f32) -> Vec<(usize, usize)> {
    let mut by_point: HashMap<usize, (Option<usize>, Option<usize>)> = HashMap::new();
    for (i, request) in requests.iter().enumerate() {
        if !request.done {
            continue;
        }
        let entry = by_point.entry(request.point).or_default();
        match request.view {
            View::Left => entry.0 = Some(i),
            View::Right => entry.1 = Some(i),
        }
    }
    let mut out = Vec::new();
    for (_, (left, right)) in by_point {
        if let (Some(l), Some(r)) = (left, right) {
            let (sl, sr) = (requests[l].shift, requests[r].shift);
            let mismatch = ((sl.0 - sr.0).powi(2) + (sl.1 - sr.1).powi(2)).sqrt();
            if mismatch > threshold {
                out.push((l, r));
            }
        }
    }
    out.sort_unstable();
    out
}

/// What a persisting disparity conflict reruns next.
#[derive(Clone, Copy, Debug, PartialEq)]
enum DisparityPlan {
    /// First attempt: both views, no guess.
    Both,
    /// Later attempts: only the worse-scoring view, one-sided guess.
    WorseOnly { view: View, guess: (f32, f32) },
}

fn disparity_plan(left: &TrackRequest, right: &TrackRequest, retried: bool) -> DisparityPlan {
    if !retried {
        return DisparityPlan::Both;
    }
    // The better view's estimate is trusted unverified; its negation seeds
    // the worse view's rerun.
    if left.objective >= right.objective {
        DisparityPlan::WorseOnly {
            view: View::Left,
            guess: (-right.shift.0, -right.shift.1),
        }
    } else {
        DisparityPlan::WorseOnly {
            view: View::Right,
            guess: (-left.shift.0, -left.shift.1),
        }
    }
}

struct Rerunner<'a> {
    reference: &'a ViewPair<'a>,
    moving: &'a ViewPair<'a>,
    params: TrackParams,
    left_state: WorkerState,
    right_state: WorkerState,
}

impl<'a> Rerunner<'a> {
    fn new(
        reference: &'a ViewPair<'a>,
        moving: &'a ViewPair<'a>,
        base: &PassDescriptor,
        config: &RecoveryConfig,
    ) -> TrackResult<Self> {
        let kernel = base.kernel_width * config.kernel_growth.max(1);
        let search = SearchParams {
            max_radius_x: base.lags_x,
            max_radius_y: base.lags_y,
            step_tolerance: SearchParams::DEFAULT_STEP_TOLERANCE,
            objective_threshold: base.objective_threshold,
            weighting: crate::estimate::Weighting::Coherence,
        };
        let params = TrackParams::new(kernel, 0, search);
        let (w, h) = (reference.left.width(), reference.left.height());
        Ok(Self {
            reference,
            moving,
            params,
            left_state: WorkerState::new(w, h, base.cache_size)?,
            right_state: WorkerState::new(w, h, base.cache_size)?,
        })
    }

    /// Reruns one request; a kernel that no longer fits leaves it not done.
    fn rerun(
        &mut self,
        request: &mut TrackRequest,
        guess: (f32, f32),
        ctx: &RunContext,
    ) -> TrackResult<()> {
        request.reset();
        request.guess = guess;
        let (reference, moving, state) = match request.view {
            View::Left => (self.reference.left, self.moving.left, &mut self.left_state),
            View::Right => (
                self.reference.right,
                self.moving.right,
                &mut self.right_state,
            ),
        };
        let mut params = self.params.clone();
        params.set_weighting(request.weighting);
        match track_point(reference, moving, request, &params, state, ctx) {
            Ok(()) => Ok(()),
            Err(TrackError::NoCandidates | TrackError::RoiOutOfBounds { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Runs the bounded recovery loop over all requests of one image pair.
pub fn recover(
    reference: &ViewPair<'_>,
    moving: &ViewPair<'_>,
    requests: &mut [TrackRequest],
    base: &PassDescriptor,
    config: &RecoveryConfig,
    ctx: &RunContext,
) -> TrackResult<RecoveryReport> {
    let _span = trace_span!("recover", requests = requests.len()).entered();
    let mut report = RecoveryReport::default();
    let mut rerunner = Rerunner::new(reference, moving, base, config)?;
    let mut coreg_seen: HashSet<usize> = HashSet::new();
    let mut disparity_seen: HashSet<usize> = HashSet::new();
    let mut disparity_retried: HashSet<usize> = HashSet::new();

    for _ in 0..config.max_passes {
        ctx.checkpoint()?;
        let coreg = coregistration_conflicts(requests, config.coregistration_threshold);
        let disparity = disparity_conflicts(requests, config.disparity_threshold);
        if coreg.is_empty() && disparity.is_empty() {
            break;
        }
        report.passes_run += 1;
        trace_event!(
            "recovery_pass",
            coregistration = coreg.len(),
            disparity = disparity.len()
        );

        for &i in &coreg {
            coreg_seen.insert(i);
            rerunner.rerun(&mut requests[i], (0.0, 0.0), ctx)?;
        }
        for &(l, r) in &disparity {
            let point = requests[l].point;
            disparity_seen.insert(point);
            match disparity_plan(&requests[l], &requests[r], disparity_retried.contains(&point)) {
                DisparityPlan::Both => {
                    disparity_retried.insert(point);
                    rerunner.rerun(&mut requests[l], (0.0, 0.0), ctx)?;
                    rerunner.rerun(&mut requests[r], (0.0, 0.0), ctx)?;
                }
                DisparityPlan::WorseOnly { view, guess } => {
                    let idx = if requests[l].view == view { l } else { r };
                    rerunner.rerun(&mut requests[idx], guess, ctx)?;
                }
            }
        }
    }

    report.coregistration_found = coreg_seen.len();
    report.disparity_found = disparity_seen.len();
    report.coregistration_remaining =
        coregistration_conflicts(requests, config.coregistration_threshold).len();
    report.disparity_remaining = disparity_conflicts(requests, config.disparity_threshold).len();
    if report.coregistration_remaining + report.disparity_remaining > 0 && ctx.verbose() {
        trace_event!(
            "recovery_exhausted",
            coregistration = report.coregistration_remaining,
            disparity = report.disparity_remaining
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{
        coregistration_conflicts, disparity_conflicts, disparity_plan, DisparityPlan,
    };
    use crate::estimate::Weighting;
    use crate::track::{TrackRequest, View};

    fn done_request(point: usize, view: View, target: (f32, f32), shift: (f32, f32)) -> TrackRequest {
        let mut r = TrackRequest::new(point, view, target, Weighting::Coherence);
        r.shift = shift;
        r.done = true;
        r
    }

    #[test]
    fn colliding_points_on_one_view_are_flagged() {
        let requests = vec![
            done_request(0, View::Left, (10.0, 10.0), (5.0, 0.0)),
            done_request(1, View::Left, (14.0, 10.0), (1.5, 0.0)),
            done_request(2, View::Left, (40.0, 40.0), (0.0, 0.0)),
        ];
        let flagged = coregistration_conflicts(&requests, 2.0);
        assert_eq!(flagged, vec![0, 1]);
    }

    #[test]
    fn different_views_never_coregister() {
        let requests = vec![
            done_request(0, View::Left, (10.0, 10.0), (0.0, 0.0)),
            done_request(1, View::Right, (10.0, 10.0), (0.0, 0.0)),
        ];
        assert!(coregistration_conflicts(&requests, 2.0).is_empty());
    }

    #[test]
    fn disparity_flags_mismatched_views_of_one_point() {
        let requests = vec![
            done_request(0, View::Left, (10.0, 10.0), (4.0, 0.0)),
            done_request(0, View::Right, (12.0, 10.0), (-1.0, 0.0)),
            done_request(1, View::Left, (30.0, 30.0), (2.0, 0.0)),
            done_request(1, View::Right, (32.0, 30.0), (2.5, 0.0)),
        ];
        let pairs = disparity_conflicts(&requests, 3.0);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn first_disparity_attempt_reruns_both_views() {
        let left = done_request(0, View::Left, (0.0, 0.0), (4.0, 0.0));
        let right = done_request(0, View::Right, (0.0, 0.0), (-1.0, 0.0));
        assert_eq!(disparity_plan(&left, &right, false), DisparityPlan::Both);
    }

    #[test]
    fn persisting_disparity_reruns_only_the_worse_view() {
        let mut left = done_request(0, View::Left, (0.0, 0.0), (4.0, 0.0));
        let mut right = done_request(0, View::Right, (0.0, 0.0), (-1.0, 0.0));
        left.objective = 0.8;
        right.objective = 0.1;
        match disparity_plan(&left, &right, true) {
            DisparityPlan::WorseOnly { view, guess } => {
                assert_eq!(view, View::Left);
                assert_eq!(guess, (1.0, 0.0));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }
}

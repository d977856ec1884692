use phasetrack::{
    recover, ImageView, PassDescriptor, RecoveryConfig, RunContext, TrackRequest, View,
    ViewPair, Weighting,
};

fn texture(x: f32, y: f32) -> f32 {
    (0.27 * x).sin() + (0.19 * y).cos() + 0.7 * (0.13 * (x + 2.1 * y)).sin()
}

fn render(width: usize, height: usize, sx: f32, sy: f32) -> Vec<f32> {
    (0..width * height)
        .map(|i| texture((i % width) as f32 - sx, (i / width) as f32 - sy))
        .collect()
}

fn base_pass() -> PassDescriptor {
    PassDescriptor {
        index: 0,
        decimation: 1,
        lags_x: 4,
        lags_y: 4,
        sampling_increment: 8,
        kernel_width: 32,
        max_fit_radius: 0,
        objective_threshold: 0.5,
        cache_size: 64,
        filter_enable: false,
        write_intermediate: false,
        write_secondary: false,
    }
}

fn done_request(point: usize, view: View, target: (f32, f32), shift: (f32, f32)) -> TrackRequest {
    let mut request = TrackRequest::new(point, view, target, Weighting::Coherence);
    request.shift = shift;
    request.done = true;
    request
}

#[test]
fn coregistration_conflict_is_separated_by_rerunning() {
    let reference = render(256, 256, 0.0, 0.0);
    let moving = render(256, 256, 2.0, 0.0);
    let rv = ImageView::from_slice(&reference, 256, 256).unwrap();
    let mv = ImageView::from_slice(&moving, 256, 256).unwrap();
    let pair_ref = ViewPair { left: rv, right: rv };
    let pair_mov = ViewPair { left: mv, right: mv };

    // Both bogus estimates land on (110, 100); the true motion is (2, 0).
    let mut requests = vec![
        done_request(0, View::Left, (100.0, 100.0), (10.0, 0.0)),
        done_request(1, View::Left, (110.0, 100.0), (0.0, 0.0)),
    ];

    let config = RecoveryConfig::default();
    let ctx = RunContext::new();
    let report = recover(
        &pair_ref,
        &pair_mov,
        &mut requests,
        &base_pass(),
        &config,
        &ctx,
    )
    .unwrap();

    assert_eq!(report.coregistration_found, 2);
    assert_eq!(report.coregistration_remaining, 0);
    assert!(report.passes_run >= 1);
    for request in &requests {
        assert!(request.done);
        assert!((request.shift.0 - 2.0).abs() < 0.2, "{:?}", request.shift);
        assert!(request.shift.1.abs() < 0.2, "{:?}", request.shift);
    }
}

#[test]
fn unresolvable_conflict_stops_at_the_pass_bound() {
    let reference = render(256, 256, 0.0, 0.0);
    let moving = render(256, 256, 0.0, 0.0);
    let rv = ImageView::from_slice(&reference, 256, 256).unwrap();
    let mv = ImageView::from_slice(&moving, 256, 256).unwrap();
    let pair_ref = ViewPair { left: rv, right: rv };
    let pair_mov = ViewPair { left: mv, right: mv };

    // Two distinct points share one target; every rerun converges to the
    // same location again.
    let mut requests = vec![
        done_request(0, View::Left, (128.0, 128.0), (0.0, 0.0)),
        done_request(1, View::Left, (128.0, 128.0), (0.0, 0.0)),
    ];

    let config = RecoveryConfig {
        max_passes: 2,
        ..RecoveryConfig::default()
    };
    let ctx = RunContext::new();
    let report = recover(
        &pair_ref,
        &pair_mov,
        &mut requests,
        &base_pass(),
        &config,
        &ctx,
    )
    .unwrap();

    assert_eq!(report.passes_run, 2);
    assert_eq!(report.coregistration_remaining, 2);
    assert_eq!(report.coregistration_fixed(), 0);
}

#[test]
fn disparity_conflict_is_fixed_by_rerunning_both_views() {
    let reference = render(256, 256, 0.0, 0.0);
    let moving = render(256, 256, 3.0, -1.0);
    let rv = ImageView::from_slice(&reference, 256, 256).unwrap();
    let mv = ImageView::from_slice(&moving, 256, 256).unwrap();
    let pair_ref = ViewPair { left: rv, right: rv };
    let pair_mov = ViewPair { left: mv, right: mv };

    // The right view's estimate is far from the left view's.
    let mut left = done_request(0, View::Left, (128.0, 128.0), (3.0, -1.0));
    left.objective = 0.01;
    let mut right = done_request(0, View::Right, (128.0, 128.0), (12.0, 5.0));
    right.objective = 0.8;
    let mut requests = vec![left, right];

    let config = RecoveryConfig::default();
    let ctx = RunContext::new();
    let report = recover(
        &pair_ref,
        &pair_mov,
        &mut requests,
        &base_pass(),
        &config,
        &ctx,
    )
    .unwrap();

    assert_eq!(report.disparity_found, 1);
    assert_eq!(report.disparity_remaining, 0);
    for request in &requests {
        assert!((request.shift.0 - 3.0).abs() < 0.2, "{:?}", request.shift);
        assert!((request.shift.1 + 1.0).abs() < 0.2, "{:?}", request.shift);
    }
}

use criterion::{criterion_group, criterion_main, Criterion};
use phasetrack::spectrum::compute_patch_spectrum;
use phasetrack::{
    estimate, track_point, FftPool, ImageView, RunContext, SearchParams, SpectrumMask,
    TrackParams, TrackRequest, View, Weighting, WorkerState,
};
use std::hint::black_box;

fn texture(x: f32, y: f32) -> f32 {
    (0.3 * x).sin() + (0.22 * y).cos() + 0.6 * (0.14 * (x + 1.3 * y)).sin()
}

fn render(width: usize, height: usize, sx: f32, sy: f32) -> Vec<f32> {
    (0..width * height)
        .map(|i| texture((i % width) as f32 - sx, (i / width) as f32 - sy))
        .collect()
}

fn bench_estimator(c: &mut Criterion) {
    let width = 128;
    let height = 128;
    let reference = render(width, height, 0.0, 0.0);
    let moving = render(width, height, 0.4, -0.3);
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let mov_view = ImageView::from_slice(&moving, width, height).unwrap();

    let kernel = 32;
    let mut pool = FftPool::new();
    let a = compute_patch_spectrum(ref_view, (64, 64), kernel, &mut pool).unwrap();
    let b = compute_patch_spectrum(mov_view, (64, 64), kernel, &mut pool).unwrap();
    let mask = SpectrumMask::annular_half_plane(kernel, 10);

    c.bench_function("estimate_32", |bench| {
        bench.iter(|| black_box(estimate(&a, &b, &mask, Weighting::Coherence).unwrap()));
    });

    c.bench_function("patch_spectrum_32", |bench| {
        bench.iter(|| {
            black_box(compute_patch_spectrum(ref_view, (64, 64), kernel, &mut pool).unwrap())
        });
    });
}

fn bench_track_point(c: &mut Criterion) {
    let width = 256;
    let height = 256;
    let reference = render(width, height, 0.0, 0.0);
    let moving = render(width, height, 3.0, -2.0);
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let mov_view = ImageView::from_slice(&moving, width, height).unwrap();

    let search = SearchParams {
        max_radius_x: 6,
        max_radius_y: 6,
        ..SearchParams::default()
    };
    let params = TrackParams::new(32, 0, search);
    let ctx = RunContext::new();

    c.bench_function("track_point_32_r6", |bench| {
        let mut state = WorkerState::new(width, height, 256).unwrap();
        bench.iter(|| {
            let mut request =
                TrackRequest::new(0, View::Left, (128.0, 128.0), Weighting::Coherence);
            track_point(ref_view, mov_view, &mut request, &params, &mut state, &ctx).unwrap();
            black_box(request.shift)
        });
    });
}

criterion_group!(benches, bench_estimator, bench_track_point);
criterion_main!(benches);

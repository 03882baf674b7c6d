//! Benchmarks for the per-frame mapping and projection path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use head_parallax::filters::{ExponentialFilter, PointFilter, Smoothing, SmoothingState};
use head_parallax::landmark::NormalizedPoint;
use head_parallax::mapper::{map_to_camera, world_target, MapperConfig};
use head_parallax::render::{PerspectiveCamera, Viewport};
use nalgebra::Vector3;

fn benchmark_mapping(c: &mut Criterion) {
    let cfg = MapperConfig::default();
    let raw = NormalizedPoint::new(0.42, 0.55, -0.01);
    let smoothed = SmoothingState::new(0.3, -0.2, 2.6);

    c.bench_function("world_target", |b| {
        b.iter(|| world_target(black_box(&raw), black_box(&cfg)));
    });
    c.bench_function("map_to_camera", |b| {
        b.iter(|| map_to_camera(black_box(&smoothed), black_box(&cfg), 1920, 1080));
    });
}

fn benchmark_detection_step(c: &mut Criterion) {
    let cfg = MapperConfig::default();
    let mut filter = ExponentialFilter::new(Smoothing::default(), SmoothingState::new(0.0, 0.0, 3.0));
    let raw = NormalizedPoint::new(0.42, 0.55, -0.01);

    c.bench_function("landmark_to_transform", |b| {
        b.iter(|| {
            let target = world_target(black_box(&raw), &cfg);
            let state = filter.update(Some(target));
            map_to_camera(&state, &cfg, 1920, 1080)
        });
    });
}

fn benchmark_projection(c: &mut Criterion) {
    let viewport = Viewport::new(1920, 1080);
    let mut camera = PerspectiveCamera::default();
    camera.set_aspect(viewport);
    let transform = map_to_camera(&SmoothingState::new(0.3, -0.2, 2.6), &MapperConfig::default(), 1920, 1080);
    camera.apply(&transform, viewport);

    // A grid of segments similar to what the wireframe scene draws each frame
    let segments: Vec<(Vector3<f64>, Vector3<f64>)> = (0..=20)
        .flat_map(|i| {
            let t = -5.0 + 0.5 * f64::from(i);
            [
                (Vector3::new(t, -1.0, -5.0), Vector3::new(t, -1.0, 5.0)),
                (Vector3::new(-5.0, -1.0, t), Vector3::new(5.0, -1.0, t)),
            ]
        })
        .collect();

    c.bench_function("projection_matrix", |b| {
        b.iter(|| black_box(&camera).projection_matrix());
    });
    c.bench_function("project_grid", |b| {
        b.iter(|| {
            segments
                .iter()
                .filter_map(|(a, b)| camera.project_segment(a, b, viewport))
                .count()
        });
    });
}

criterion_group!(benches, benchmark_mapping, benchmark_detection_step, benchmark_projection);
criterion_main!(benches);

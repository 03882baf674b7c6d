//! Tests for the camera parameter mapper and its effect on the camera

use head_parallax::filters::{Smoothing, SmoothingState};
use head_parallax::landmark::NormalizedPoint;
use head_parallax::mapper::{map_to_camera, world_target, MapperConfig, ViewOffset};
use head_parallax::render::{PerspectiveCamera, Viewport};
use nalgebra::Vector3;

#[test]
fn test_reference_point_mapping() {
    let cfg = MapperConfig::default();
    let smoothed = SmoothingState::new(0.0, 0.0, 3.0);
    let first = map_to_camera(&smoothed, &cfg, 1920, 1080);
    let second = map_to_camera(&smoothed, &cfg, 1920, 1080);

    assert_eq!(first, second);
    assert_eq!(first.position, Vector3::new(0.0, 0.0, 3.0));
    assert_eq!(first.view_offset, ViewOffset { cx: 0.0, cy: 0.0 });
    assert!((first.focal_length - cfg.off_z * 3.0).abs() < 1e-12);
}

#[test]
fn test_mapping_does_not_mutate_inputs() {
    let cfg = MapperConfig::default();
    let smoothed = SmoothingState::new(0.4, -0.3, 2.5);
    let (cfg_before, smoothed_before) = (cfg, smoothed);
    let _ = map_to_camera(&smoothed, &cfg, 800, 600);
    assert_eq!(cfg, cfg_before);
    assert_eq!(smoothed, smoothed_before);
}

#[test]
fn test_view_offset_scales_with_viewport_and_effect() {
    let cfg = MapperConfig {
        effect_amount_x: 2.0,
        effect_amount_y: 0.5,
        off_x: 0.1,
        off_y: 0.2,
        ..MapperConfig::default()
    };
    let transform = map_to_camera(&SmoothingState::new(1.0, -1.0, 3.0), &cfg, 1000, 500);
    assert!((transform.view_offset.cx - 2.0 * 0.1 * 1000.0).abs() < 1e-9);
    assert!((transform.view_offset.cy + 0.5 * 0.2 * 500.0).abs() < 1e-9);
}

#[test]
fn test_depth_moves_target_distance() {
    let cfg = MapperConfig::default();
    let near = world_target(&NormalizedPoint::new(0.5, 0.5, -0.05), &cfg);
    let far = world_target(&NormalizedPoint::new(0.5, 0.5, 0.05), &cfg);
    assert!((near.z - 1.0).abs() < 1e-6);
    assert!((far.z - 5.0).abs() < 1e-6);
}

#[test]
fn test_zero_effect_disables_axis() {
    let cfg = MapperConfig {
        effect_amount_x: 0.0,
        ..MapperConfig::default()
    };
    let target = world_target(&NormalizedPoint::new(0.9, 0.5, 0.0), &cfg);
    assert!(target.x.abs() < f64::EPSILON);
    let transform = map_to_camera(&SmoothingState::new(1.0, 0.0, 3.0), &cfg, 640, 480);
    assert!(transform.view_offset.cx.abs() < f64::EPSILON);
}

#[test]
fn test_closer_head_gives_longer_focal_length() {
    let cfg = MapperConfig {
        smoothing: Smoothing::uniform(1.0),
        ..MapperConfig::default()
    };
    let viewport = Viewport::new(1280, 720);
    let mut camera = PerspectiveCamera::default();
    camera.set_aspect(viewport);

    camera.apply(&map_to_camera(&SmoothingState::new(0.0, 0.0, 2.0), &cfg, 1280, 720), viewport);
    let fov_close = camera.fov;
    camera.apply(&map_to_camera(&SmoothingState::new(0.0, 0.0, 4.0), &cfg, 1280, 720), viewport);
    let fov_far = camera.fov;

    // Focal length grows with distance, narrowing the field of view
    assert!(fov_far < fov_close);
    assert!((camera.focal_length() - 40.0).abs() < 1e-6);
}

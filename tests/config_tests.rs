//! Tests for configuration loading, validation and hot reload

use head_parallax::config::{Config, LiveConfig, EXAMPLE_CONFIG};
use head_parallax::face_mesh::Delegate;
use head_parallax::filters::Smoothing;
use head_parallax::landmark::TrackedLandmarkIndex;
use head_parallax::mapper::MapperConfig;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_yaml_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    let mut config = Config::default();
    config.camera.device_index = 2;
    config.camera.video_file = Some(PathBuf::from("clip.mp4"));
    config.detector.delegate = Delegate::Cpu;
    config.tracking.scale = 0.5;
    config.tracking.filter = "exponential:6".to_string();
    config.mapper.off_z = 12.0;
    config.display.show_landmarks = false;

    config.to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_example_config_is_valid() {
    let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
    config.validate().unwrap();
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Config::from_file("/nonexistent/config.yaml").unwrap_err();
    assert!(err.to_string().starts_with("IO error"));
}

#[test]
fn test_malformed_yaml_is_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "tracking: [1, 2").unwrap();
    let err = Config::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_validation_rejects_bad_values() {
    let check = |edit: fn(&mut Config), needle: &str| {
        let mut config = Config::default();
        edit(&mut config);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains(needle), "'{err}' does not mention '{needle}'");
    };

    check(|c| c.tracking.scale = 0.0, "Scale");
    check(|c| c.tracking.scale = 1.5, "Scale");
    check(|c| c.tracking.target_fps = 0.0, "Target FPS");
    check(|c| c.tracking.landmark_index = TrackedLandmarkIndex(468), "Landmark index");
    check(|c| c.tracking.filter = "median".to_string(), "Unknown filter type");
    check(|c| c.detector.presence_threshold = 2.0, "Presence threshold");
    check(|c| c.detector.face_confidence = -0.1, "Face confidence");
    check(|c| c.detector.nms_threshold = 1.5, "NMS threshold");
    check(|c| c.camera.width = 0, "Capture size");
    check(|c| c.display.refresh_hz = -1.0, "Refresh rate");
    check(|c| c.display.near = 0.0, "Clip planes");
    check(|c| c.display.fov = 180.0, "Field of view");
    check(|c| c.mapper.off_z = 0.0, "off_z");
    check(|c| c.mapper.smoothing = Smoothing::uniform(0.5), "Divisor");
}

#[test]
fn test_last_mesh_landmark_is_accepted() {
    let mut config = Config::default();
    config.tracking.landmark_index = TrackedLandmarkIndex(467);
    config.validate().unwrap();
}

#[test]
fn test_reload_picks_up_mapper_changes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    Config::default().to_file(&path).unwrap();

    let live = LiveConfig::new(MapperConfig::default(), Some(path.clone()));
    let rx = live.subscribe();

    let mut edited = Config::default();
    edited.mapper.effect_amount_x = 2.5;
    edited.mapper.smoothing = Smoothing::uniform(2.0);
    edited.to_file(&path).unwrap();

    let reloaded = live.reload().unwrap();
    assert!((reloaded.effect_amount_x - 2.5).abs() < f64::EPSILON);
    assert_eq!(*rx.borrow(), reloaded);
    assert_eq!(live.current(), reloaded);
}

#[test]
fn test_invalid_reload_keeps_current_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "mapper:\n  off_z: -3.0\n").unwrap();

    let live = LiveConfig::new(MapperConfig::default(), Some(path));
    assert!(live.reload().is_err());
    assert_eq!(live.current(), MapperConfig::default());
}

//! Tests for the display-rate render loop


use head_parallax::detection::{PosePublisher, TrackingConsumer};
use head_parallax::filters::SmoothingState;
use head_parallax::liveness::Liveness;
use head_parallax::mapper::{map_to_camera, MapperConfig};
use head_parallax::render::{PerspectiveCamera, RenderCommand, RenderExit, RenderLoop, Viewport};
use head_parallax::scheduler::ManualScheduler;
use nalgebra::Vector3;
use test_helpers::{MockRenderer, Probe};
use tokio::sync::watch;

const INITIAL: SmoothingState = SmoothingState::new(0.0, 0.0, 3.0);

fn render_loop(renderer: MockRenderer) -> (RenderLoop<MockRenderer>, PosePublisher, watch::Sender<MapperConfig>) {
    let (publisher, subscription) = PosePublisher::channel();
    let (mapper_tx, mapper_rx) = watch::channel(MapperConfig::default());
    let render = RenderLoop::new(renderer, PerspectiveCamera::default(), subscription, mapper_rx, INITIAL);
    (render, publisher, mapper_tx)
}

#[test]
fn test_default_camera_before_first_detection() {
    let probe = Probe::default();
    let (mut render, _publisher, _mapper) = render_loop(MockRenderer::new(&probe));

    let transform = render.tick().unwrap();
    assert_eq!(transform, map_to_camera(&INITIAL, &MapperConfig::default(), 1920, 1080));
    assert_eq!(render.camera().position, Vector3::new(0.0, 0.0, 3.0));
    assert!((render.camera().aspect - 1920.0 / 1080.0).abs() < 1e-12);
}

#[test]
fn test_no_face_ticks_hold_last_pose() {
    let probe = Probe::default();
    let (mut render, mut publisher, _mapper) = render_loop(MockRenderer::new(&probe));

    let p1 = SmoothingState::new(0.3, -0.2, 2.8);
    publisher.on_update(Some(p1));
    let first = render.tick().unwrap();
    publisher.on_update(None);
    let second = render.tick().unwrap();
    publisher.on_update(None);
    let third = render.tick().unwrap();

    let expected = map_to_camera(&p1, &MapperConfig::default(), 1920, 1080);
    assert_eq!(first, expected);
    assert_eq!(second, expected);
    assert_eq!(third, expected);
    assert_eq!(*probe.rendered.borrow(), vec![p1.to_vector(); 3]);
}

#[test]
fn test_mapper_changes_apply_next_tick() {
    let probe = Probe::default();
    let (mut render, mut publisher, mapper) = render_loop(MockRenderer::new(&probe));
    publisher.on_update(Some(SmoothingState::new(1.0, 0.0, 3.0)));

    let before = render.tick().unwrap();
    mapper.send_replace(MapperConfig {
        off_x: 0.1,
        ..MapperConfig::default()
    });
    let after = render.tick().unwrap();
    assert!((after.view_offset.cx - 2.0 * before.view_offset.cx).abs() < 1e-9);
}

#[test]
fn test_resize_updates_aspect_and_target() {
    let probe = Probe::default();
    let (mut render, _publisher, _mapper) = render_loop(MockRenderer::new(&probe));

    render.resize(Viewport::new(800, 800)).unwrap();
    assert!((render.camera().aspect - 1.0).abs() < f64::EPSILON);
    assert_eq!(render.renderer().viewport, Viewport::new(800, 800));

    // Empty viewports are ignored
    render.resize(Viewport::new(0, 600)).unwrap();
    assert_eq!(render.renderer().viewport, Viewport::new(800, 800));
    assert_eq!(probe.count("renderer.resize"), 1);

    let transform = render.tick().unwrap();
    assert_eq!(transform, map_to_camera(&INITIAL, &MapperConfig::default(), 800, 800));
}

#[tokio::test]
async fn test_run_until_quit() {
    let probe = Probe::default();
    let renderer = MockRenderer::new(&probe).with_commands([None, None, Some(RenderCommand::Quit)]);
    let (mut render, _publisher, _mapper) = render_loop(renderer);
    let liveness = Liveness::new();

    let mut ticks = ManualScheduler::every(16.0, 10);
    let exit = render.run(&mut ticks, &liveness.token()).await.unwrap();
    assert_eq!(exit, RenderExit::Quit);
    assert_eq!(render.frames(), 3);
}

#[tokio::test]
async fn test_run_reports_reload_and_resumes() {
    let probe = Probe::default();
    let renderer = MockRenderer::new(&probe).with_commands([Some(RenderCommand::ReloadConfig)]);
    let (mut render, _publisher, _mapper) = render_loop(renderer);
    let liveness = Liveness::new();
    let mut ticks = ManualScheduler::every(16.0, 4);

    assert_eq!(render.run(&mut ticks, &liveness.token()).await.unwrap(), RenderExit::ReloadRequested);
    assert_eq!(render.run(&mut ticks, &liveness.token()).await.unwrap(), RenderExit::SchedulerClosed);
    assert_eq!(render.frames(), 4);
}

#[tokio::test]
async fn test_run_applies_external_resize() {
    let probe = Probe::default();
    let renderer = MockRenderer::new(&probe).with_resize(Viewport::new(640, 480));
    let (mut render, _publisher, _mapper) = render_loop(renderer);
    let liveness = Liveness::new();

    let mut ticks = ManualScheduler::every(16.0, 1);
    render.run(&mut ticks, &liveness.token()).await.unwrap();
    assert!((render.camera().aspect - 640.0 / 480.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_cancelled_run_renders_nothing() {
    let probe = Probe::default();
    let (mut render, _publisher, _mapper) = render_loop(MockRenderer::new(&probe));
    let liveness = Liveness::new();
    liveness.cancel();

    let mut ticks = ManualScheduler::every(16.0, 10);
    let exit = render.run(&mut ticks, &liveness.token()).await.unwrap();
    assert_eq!(exit, RenderExit::Cancelled);
    assert_eq!(render.frames(), 0);
}

#[tokio::test]
async fn test_render_error_propagates() {
    let probe = Probe::default();
    let (mut render, _publisher, _mapper) = render_loop(MockRenderer::new(&probe).failing_on_frame(2));
    let liveness = Liveness::new();

    let mut ticks = ManualScheduler::every(16.0, 10);
    let err = render.run(&mut ticks, &liveness.token()).await.unwrap_err();
    assert!(err.to_string().contains("device lost"));
    assert_eq!(render.frames(), 2);
}

#[test]
fn test_dispose_is_idempotent() {
    let probe = Probe::default();
    let (mut render, _publisher, _mapper) = render_loop(MockRenderer::new(&probe));
    render.dispose();
    render.dispose();
    assert!(render.is_disposed());
    assert_eq!(probe.count("renderer.dispose"), 1);
}

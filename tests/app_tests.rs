use approx::assert_relative_eq;
use nalgebra::Point3;
use opencv::core::{Rect, Scalar, Size, Vec3b, CV_8UC3};
use opencv::prelude::*;
use std::collections::VecDeque;
use virtual_window::{
    App, Config, Error, Event, FaceDetection, FrameSource, HeadPosition, Response, SceneRendering,
    WindowDimensions, WindowMode,
};

struct ScriptedSource {
    frames: VecDeque<Option<Mat>>,
}

impl ScriptedSource {
    fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames).map(|_| Some(frame())).collect(),
        }
    }

    fn with(frames: Vec<Option<Mat>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> virtual_window::Result<Option<Mat>> {
        Ok(self.frames.pop_front().flatten())
    }

    fn frame_size(&self) -> Size {
        Size::new(640, 480)
    }
}

struct ScriptedDetector {
    faces: VecDeque<Option<Rect>>,
}

impl ScriptedDetector {
    fn new(faces: Vec<Option<Rect>>) -> Self {
        Self {
            faces: faces.into(),
        }
    }
}

impl FaceDetection for ScriptedDetector {
    fn detect(&mut self, _image: &Mat) -> virtual_window::Result<Option<Rect>> {
        Ok(self.faces.pop_front().flatten())
    }
}

struct FailingDetector;

impl FaceDetection for FailingDetector {
    fn detect(&mut self, _image: &Mat) -> virtual_window::Result<Option<Rect>> {
        Err(opencv::Error::new(opencv::core::StsError, "detection failed").into())
    }
}

/// Black canvas of the window's size, or an error once `fail` is set.
#[derive(Default)]
struct BlankRenderer {
    fail: bool,
}

impl SceneRendering for BlankRenderer {
    fn render(
        &mut self,
        _eye: &HeadPosition,
        window: WindowDimensions,
        _wireframe: bool,
    ) -> virtual_window::Result<Mat> {
        if self.fail {
            return Err(Error::Gpu("device lost".to_owned()));
        }
        Ok(Mat::new_rows_cols_with_default(
            window.height,
            window.width,
            CV_8UC3,
            Scalar::all(0.0),
        )?)
    }
}

type TestApp = App<ScriptedSource, ScriptedDetector, BlankRenderer>;

fn frame() -> Mat {
    Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(90.0)).unwrap()
}

fn config() -> Config {
    let mut config = Config::default();
    config.camera.mirror = false;
    config
}

fn app(frames: usize, faces: Vec<Option<Rect>>) -> TestApp {
    App::new(
        &config(),
        ScriptedSource::new(frames),
        ScriptedDetector::new(faces),
        BlankRenderer::default(),
    )
}

fn key(app: &mut TestApp, key: u8) -> Response {
    app.dispatch(Event::Key(i32::from(key))).unwrap()
}

fn tick(app: &mut TestApp) -> Response {
    app.dispatch(Event::Idle).unwrap();
    app.dispatch(Event::Render).unwrap()
}

#[test]
fn starts_windowed_at_scaled_capture_size() {
    let app = app(0, vec![]);
    assert_eq!(app.mode(), WindowMode::Windowed);
    assert_eq!(app.window(), WindowDimensions::new(960, 720));
    assert!(app.is_running());
    assert_relative_eq!(app.head_position(), Point3::new(0.0, 0.0, 60.0));
}

#[test]
fn render_without_frame_is_skipped() {
    let mut app = app(0, vec![]);
    assert!(matches!(app.dispatch(Event::Render).unwrap(), Response::Skip));
    app.dispatch(Event::Idle).unwrap();
    assert!(!app.has_frame());
    assert!(matches!(app.dispatch(Event::Render).unwrap(), Response::Skip));
}

#[test]
fn missing_frame_replaces_previous_one() {
    let source = ScriptedSource::with(vec![Some(frame()), None]);
    let mut app = App::new(
        &config(),
        source,
        ScriptedDetector::new(vec![]),
        BlankRenderer::default(),
    );
    assert!(matches!(tick(&mut app), Response::Present(_)));
    assert!(matches!(tick(&mut app), Response::Skip));
}

#[test]
fn presented_canvas_matches_window() {
    let mut app = app(1, vec![None]);
    app.dispatch(Event::Resize {
        width: 800,
        height: 600,
    })
    .unwrap();
    match tick(&mut app) {
        Response::Present(canvas) => assert_eq!(canvas.size().unwrap(), Size::new(800, 600)),
        other => panic!("expected a canvas, got {other:?}"),
    }
}

#[test]
fn head_position_follows_face_and_holds_when_lost() {
    let mut app = app(
        3,
        vec![
            Some(Rect::new(100, 50, 200, 200)),
            None,
            Some(Rect::new(100, 50, 0, 200)),
        ],
    );

    tick(&mut app);
    let tracked = app.head_position();
    assert_relative_eq!(tracked, Point3::new(-9.75, 9.425, 40.625), epsilon = 1e-9);

    // no face
    tick(&mut app);
    assert_relative_eq!(app.head_position(), tracked);

    // zero width face
    tick(&mut app);
    assert_relative_eq!(app.head_position(), tracked);
    assert!(app.head_position().iter().all(|v| v.is_finite()));
}

#[test]
fn picture_in_picture_toggle() {
    let window = WindowDimensions::new(640, 480);
    let mut app = app(2, vec![None, None]);
    app.dispatch(Event::Resize {
        width: window.width,
        height: window.height,
    })
    .unwrap();

    let Response::Present(with_camera) = tick(&mut app) else {
        panic!("expected a canvas");
    };
    // camera frame is uniform gray, pasted at the bottom left
    assert_eq!(
        *with_camera.at_2d::<Vec3b>(479, 0).unwrap(),
        Vec3b::from_array([90, 90, 90])
    );

    key(&mut app, b'c');
    assert!(!app.display().show_camera);
    let Response::Present(without_camera) = tick(&mut app) else {
        panic!("expected a canvas");
    };
    assert_eq!(
        *without_camera.at_2d::<Vec3b>(479, 0).unwrap(),
        Vec3b::from_array([0, 0, 0])
    );
}

#[test]
fn toggles_flip_one_flag_each() {
    let mut app = app(0, vec![]);
    let initial = *app.display();

    key(&mut app, b'd');
    assert_eq!(app.display().show_detection, !initial.show_detection);
    key(&mut app, b'D');
    assert_eq!(*app.display(), initial);

    key(&mut app, b'm');
    assert!(app.display().wireframe);
    assert_eq!(app.display().show_camera, initial.show_camera);
    key(&mut app, b'M');
    assert!(!app.display().wireframe);

    key(&mut app, b'C');
    assert_eq!(app.display().show_camera, !initial.show_camera);
}

#[test]
fn camera_scale_is_clamped() {
    let mut app = app(0, vec![]);
    for _ in 0..30 {
        key(&mut app, b'+');
    }
    assert_relative_eq!(app.display().camera_scale, 1.9);
    key(&mut app, b'+');
    assert_relative_eq!(app.display().camera_scale, 1.9);

    for _ in 0..30 {
        key(&mut app, b'-');
    }
    assert_relative_eq!(app.display().camera_scale, 0.2);
    key(&mut app, b'-');
    assert_relative_eq!(app.display().camera_scale, 0.2);
}

#[test]
fn fullscreen_round_trip() {
    let mut app = app(0, vec![]);

    // escape only leaves fullscreen
    assert!(matches!(key(&mut app, 27), Response::Continue));
    assert_eq!(app.mode(), WindowMode::Windowed);

    assert!(matches!(key(&mut app, b'f'), Response::EnterFullscreen));
    assert_eq!(app.mode(), WindowMode::Fullscreen);

    match key(&mut app, 27) {
        Response::LeaveFullscreen { size, position } => {
            assert_eq!(size, WindowDimensions::new(960, 720));
            assert_eq!(position, (200, 80));
        }
        other => panic!("expected to leave fullscreen, got {other:?}"),
    }
    assert_eq!(app.mode(), WindowMode::Windowed);

    assert!(matches!(key(&mut app, b'F'), Response::EnterFullscreen));
    assert!(matches!(key(&mut app, b'F'), Response::LeaveFullscreen { .. }));
}

#[test]
fn resize_only_updates_dimensions() {
    let mut app = app(0, vec![]);
    let display = *app.display();
    let response = app
        .dispatch(Event::Resize {
            width: 1920,
            height: 1080,
        })
        .unwrap();
    assert!(matches!(response, Response::Continue));
    assert_eq!(app.window(), WindowDimensions::new(1920, 1080));
    assert_eq!(*app.display(), display);
    assert_eq!(app.mode(), WindowMode::Windowed);
}

#[test]
fn quit_and_ignored_input() {
    let mut app = app(0, vec![]);
    let display = *app.display();

    assert!(matches!(key(&mut app, b'x'), Response::Continue));
    assert!(matches!(app.dispatch(Event::Key(-1)).unwrap(), Response::Continue));
    assert!(matches!(
        app.dispatch(Event::Mouse { event: 4, x: 10, y: 10 }).unwrap(),
        Response::Continue
    ));
    assert_eq!(*app.display(), display);
    assert!(app.is_running());

    assert!(matches!(key(&mut app, b'Q'), Response::Quit));
    assert!(!app.is_running());
}

#[test]
fn special_keys_are_not_read_as_letters() {
    let mut app = app(0, vec![]);
    let display = *app.display();

    // GTK keysyms for Left and Insert, whose low bytes are 'Q' and 'c'
    for code in [0xFF51, 0xFF63, 0xFFBE] {
        assert!(matches!(app.dispatch(Event::Key(code)).unwrap(), Response::Continue));
    }
    assert!(app.is_running());
    assert_eq!(*app.display(), display);
    assert_eq!(app.mode(), WindowMode::Windowed);
}

#[test]
fn modifier_bits_are_ignored() {
    let mut app = app(0, vec![]);
    // shift held while pressing 'c'
    let shifted_c = 0x10000 | i32::from(b'C');
    app.dispatch(Event::Key(shifted_c)).unwrap();
    assert!(!app.display().show_camera);
}

#[test]
fn failed_detection_skips_the_frame() {
    let mut app = App::new(
        &config(),
        ScriptedSource::new(2),
        FailingDetector,
        BlankRenderer::default(),
    );
    let start = app.head_position();

    app.dispatch(Event::Idle).unwrap();
    assert!(matches!(app.dispatch(Event::Render).unwrap(), Response::Skip));
    assert!(app.is_running());
    assert_relative_eq!(app.head_position(), start);

    app.dispatch(Event::Idle).unwrap();
    assert!(matches!(app.dispatch(Event::Render).unwrap(), Response::Skip));
}

#[test]
fn failed_render_skips_the_frame_but_keeps_tracking() {
    let mut app = App::new(
        &config(),
        ScriptedSource::new(1),
        ScriptedDetector::new(vec![Some(Rect::new(100, 50, 200, 200))]),
        BlankRenderer { fail: true },
    );

    assert!(matches!(tick(&mut app), Response::Skip));
    assert!(app.is_running());
    assert_relative_eq!(app.head_position(), Point3::new(-9.75, 9.425, 40.625), epsilon = 1e-9);
}

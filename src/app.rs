//! Application state and the per event state machine driving it.
//!
//! The windowing side turns whatever it receives into [`Event`]s and carries
//! out the returned [`Response`]. All state changes happen in [`App::dispatch`].

use crate::camera::FrameSource;
use crate::config::{Config, DisplayConfig};
use crate::detector::FaceDetection;
use crate::geometry::HeadPosition;
use crate::renderer::{composite_picture_in_picture, SceneRendering, WindowDimensions};
use crate::tracker::FrameProcessor;
use crate::Result;
use log::{debug, info, trace, warn};
use opencv::core::Size;
use opencv::prelude::*;

const KEY_ESCAPE: u8 = 27;
/// Key codes above this are special keys such as arrows and function keys.
const KEY_ASCII_MAX: i32 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Nothing pending, fetch the next frame
    Idle,
    Render,
    Resize { width: i32, height: i32 },
    /// Key code as reported by `wait_key_ex`, modifier bits included
    Key(i32),
    Mouse { event: i32, x: i32, y: i32 },
}

#[derive(Debug)]
pub enum Response {
    Continue,
    /// Nothing to present, either no frame was available or the frame failed
    Skip,
    Present(Mat),
    EnterFullscreen,
    LeaveFullscreen {
        size: WindowDimensions,
        position: (i32, i32),
    },
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Windowed,
    Fullscreen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    pub show_camera: bool,
    pub show_detection: bool,
    pub wireframe: bool,
    /// Picture in picture size relative to the capture size
    pub camera_scale: f64,
}

impl DisplayState {
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self {
            show_camera: config.show_camera,
            show_detection: config.show_detection,
            wireframe: config.wireframe,
            camera_scale: config.camera_scale,
        }
    }
}

pub struct App<S, D, R> {
    source: S,
    processor: FrameProcessor<D>,
    renderer: R,
    display_config: DisplayConfig,
    capture_size: Size,

    frame: Option<Mat>,
    head_position: HeadPosition,
    display: DisplayState,
    window: WindowDimensions,
    mode: WindowMode,
    running: bool,
}

impl<S: FrameSource, D: FaceDetection, R: SceneRendering> App<S, D, R> {
    pub fn new(config: &Config, source: S, detector: D, renderer: R) -> Self {
        let capture_size = source.frame_size();
        let processor = FrameProcessor::new(
            detector,
            config.intrinsics(capture_size.width, capture_size.height),
            config.eye_model(),
            config.camera.mirror,
        );
        let mut app = Self {
            source,
            processor,
            renderer,
            display_config: config.display.clone(),
            capture_size,
            frame: None,
            head_position: config.initial_head_position(),
            display: DisplayState::from_config(&config.display),
            window: WindowDimensions::new(0, 0),
            mode: WindowMode::Windowed,
            running: true,
        };
        app.window = app.windowed_size();
        app
    }

    pub fn dispatch(&mut self, event: Event) -> Result<Response> {
        match event {
            Event::Idle => self.on_idle(),
            Event::Render => self.on_render(),
            Event::Resize { width, height } => Ok(self.on_resize(width, height)),
            Event::Key(code) => Ok(self.on_key(code)),
            Event::Mouse { event, x, y } => Ok(self.on_mouse(event, x, y)),
        }
    }

    fn on_idle(&mut self) -> Result<Response> {
        self.frame = self.source.next_frame()?;
        Ok(Response::Continue)
    }

    /// A frame that fails to process or render is skipped, the loop keeps going.
    fn on_render(&mut self) -> Result<Response> {
        match self.render_frame() {
            Ok(Some(canvas)) => Ok(Response::Present(canvas)),
            Ok(None) => Ok(Response::Skip),
            Err(err) => {
                warn!("Skipping frame: {}", err);
                Ok(Response::Skip)
            }
        }
    }

    fn render_frame(&mut self) -> Result<Option<Mat>> {
        let Some(frame) = self.frame.as_ref() else {
            return Ok(None);
        };

        let annotate = self.display.show_camera && self.display.show_detection;
        let processed = self.processor.process_frame(frame, annotate)?;
        if let Some(head_position) = processed.head_position {
            self.head_position = head_position;
        }

        let mut canvas =
            self.renderer
                .render(&self.head_position, self.window, self.display.wireframe)?;
        if self.display.show_camera {
            composite_picture_in_picture(&mut canvas, &processed.image, self.display.camera_scale)?;
        }
        Ok(Some(canvas))
    }

    fn on_resize(&mut self, width: i32, height: i32) -> Response {
        debug!("window resized to {}x{}", width, height);
        self.window = WindowDimensions::new(width, height);
        Response::Continue
    }

    fn on_key(&mut self, code: i32) -> Response {
        // drop modifier bits, keep the key itself
        let code = code & 0xFFFF;
        if !(0..=KEY_ASCII_MAX).contains(&code) {
            trace!("ignoring special key {:#x}", code);
            return Response::Continue;
        }
        let key = code as u8;

        match (self.mode, key) {
            (WindowMode::Fullscreen, b'f' | b'F' | KEY_ESCAPE) => {
                self.mode = WindowMode::Windowed;
                return Response::LeaveFullscreen {
                    size: self.windowed_size(),
                    position: self.display_config.window_position,
                };
            }
            (WindowMode::Windowed, b'f' | b'F') => {
                self.mode = WindowMode::Fullscreen;
                return Response::EnterFullscreen;
            }
            _ => {}
        }

        match key {
            b'c' | b'C' => self.display.show_camera = !self.display.show_camera,
            b'd' | b'D' => self.display.show_detection = !self.display.show_detection,
            b'm' | b'M' => self.display.wireframe = !self.display.wireframe,
            b'+' => self.change_camera_scale(self.display_config.camera_scale_step),
            b'-' => self.change_camera_scale(-self.display_config.camera_scale_step),
            b'q' | b'Q' => {
                info!("Quitting");
                self.running = false;
                return Response::Quit;
            }
            _ => {}
        }
        Response::Continue
    }

    fn on_mouse(&mut self, event: i32, x: i32, y: i32) -> Response {
        trace!("mouse event {} at ({}, {})", event, x, y);
        Response::Continue
    }

    fn change_camera_scale(&mut self, delta: f64) {
        self.display.camera_scale = (self.display.camera_scale + delta).clamp(
            self.display_config.camera_scale_min,
            self.display_config.camera_scale_max,
        );
    }

    /// Window size outside of fullscreen, derived from the capture resolution.
    pub fn windowed_size(&self) -> WindowDimensions {
        let scale = self.display_config.window_scale;
        WindowDimensions::new(
            (f64::from(self.capture_size.width) * scale).round() as i32,
            (f64::from(self.capture_size.height) * scale).round() as i32,
        )
    }

    pub fn head_position(&self) -> HeadPosition {
        self.head_position
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn window(&self) -> WindowDimensions {
        self.window
    }

    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }
}

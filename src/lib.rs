//! Head tracked "virtual window".
//!
//! A webcam finds the viewer's face, the eye position is estimated with a
//! pinhole approximation and a 3D scene is rendered from that position so the
//! screen looks like a window into the scene.

pub mod app;
pub mod camera;
pub mod config;
pub mod detector;
mod error;
pub mod geometry;
pub mod gpu;
pub mod renderer;
pub mod tracker;

pub use app::{App, DisplayState, Event, Response, WindowMode};
pub use camera::{CameraSource, FrameSource};
pub use config::Config;
pub use detector::{CascadeFaceDetector, FaceDetection};
pub use error::{Error, Result};
pub use geometry::{estimate_head_position, HeadPosition};
pub use gpu::GpuSceneRenderer;
pub use renderer::{SceneRendering, WindowDimensions};
pub use tracker::{FrameProcessor, ProcessedFrame};

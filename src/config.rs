//! Calibration constants and display defaults, loadable from YAML.

use crate::geometry::{CameraIntrinsics, EyeModel};
use crate::{Error, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub eyes: EyeConfig,
    pub display: DisplayConfig,
    pub scene: SceneConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture device index
    pub index: i32,
    /// Focal length in pixels
    pub focal_length: f64,
    /// Mirror frames horizontally before detection
    pub mirror: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Haar cascade file, resolved through the OpenCV data path when not found as is
    pub cascade: PathBuf,
    /// Smallest face in pixels. Smaller values track further away but
    /// produce more false positives.
    pub min_face_size: i32,
    pub scale_factor: f64,
    pub min_neighbors: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    /// Assumed distance between the eyes in centimeters
    pub eye_gap: f64,
    /// Horizontal position of the left eye as a fraction of face width
    pub left_eye_x: f64,
    /// Horizontal position of the right eye as a fraction of face width
    pub right_eye_x: f64,
    /// Vertical position of the eye line as a fraction of face height
    pub eye_line_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
    pub fullscreen: bool,
    pub show_camera: bool,
    pub show_detection: bool,
    pub wireframe: bool,
    /// Picture in picture size relative to capture size
    pub camera_scale: f64,
    pub camera_scale_step: f64,
    pub camera_scale_min: f64,
    pub camera_scale_max: f64,
    /// Windowed size relative to capture size
    pub window_scale: f64,
    pub window_position: (i32, i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Vertical field of view in degrees
    pub fov_y: f64,
    pub near: f64,
    pub far: f64,
    pub axes_length: f64,
    /// Window pixels per world unit of the screen outline, per half extent
    pub screen_divisor: f64,
    /// Eye position used until the first face is found
    pub initial_head_position: [f64; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            focal_length: 500.0,
            mirror: true,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cascade: PathBuf::from("haarcascades/haarcascade_frontalface_alt.xml"),
            min_face_size: 80,
            scale_factor: 1.1,
            min_neighbors: 2,
        }
    }
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            eye_gap: 6.5,
            left_eye_x: 0.30,
            right_eye_x: 0.70,
            eye_line_y: 0.37,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "Virtual window".to_owned(),
            fullscreen: false,
            show_camera: true,
            show_detection: true,
            wireframe: false,
            camera_scale: 0.5,
            camera_scale_step: 0.1,
            camera_scale_min: 0.2,
            camera_scale_max: 1.9,
            window_scale: 1.5,
            window_position: (200, 80),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            fov_y: 60.0,
            near: 1.0,
            far: 250.0,
            axes_length: 10.0,
            screen_divisor: 40.0,
            initial_head_position: [0.0, 0.0, 60.0],
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.camera.focal_length > 0.0) {
            return Err(Error::Config("focal length must be positive".to_owned()));
        }
        if self.detection.min_face_size < 1 {
            return Err(Error::Config(
                "minimum face size must be at least one pixel".to_owned(),
            ));
        }
        if !(self.detection.scale_factor > 1.0) {
            return Err(Error::Config(
                "detection scale factor must be greater than 1.0".to_owned(),
            ));
        }
        if !(self.eyes.eye_gap > 0.0) {
            return Err(Error::Config("eye gap must be positive".to_owned()));
        }
        if !(self.eyes.left_eye_x < self.eyes.right_eye_x) {
            return Err(Error::Config(
                "left eye must be left of the right eye".to_owned(),
            ));
        }

        let display = &self.display;
        if !(display.camera_scale_min > 0.0 && display.camera_scale_min <= display.camera_scale_max)
        {
            return Err(Error::Config(format!(
                "invalid camera scale range [{}, {}]",
                display.camera_scale_min, display.camera_scale_max
            )));
        }
        if !(display.camera_scale_min..=display.camera_scale_max).contains(&display.camera_scale) {
            return Err(Error::Config(format!(
                "camera scale {} outside of [{}, {}]",
                display.camera_scale, display.camera_scale_min, display.camera_scale_max
            )));
        }
        if !(display.window_scale > 0.0) {
            return Err(Error::Config("window scale must be positive".to_owned()));
        }

        let scene = &self.scene;
        if !(scene.fov_y > 0.0 && scene.fov_y < 180.0) {
            return Err(Error::Config(
                "field of view must be between 0 and 180 degrees".to_owned(),
            ));
        }
        if !(scene.near > 0.0 && scene.near < scene.far) {
            return Err(Error::Config(
                "clip planes must satisfy 0 < near < far".to_owned(),
            ));
        }
        if !(scene.screen_divisor > 0.0) {
            return Err(Error::Config("screen divisor must be positive".to_owned()));
        }
        let [x, y, z] = scene.initial_head_position;
        if x == 0.0 && z == 0.0 {
            // looking straight down the up vector
            return Err(Error::Config(
                "initial head position must not lie on the vertical axis".to_owned(),
            ));
        }
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(Error::Config(
                "initial head position must be finite".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn eye_model(&self) -> EyeModel {
        EyeModel {
            eye_gap: self.eyes.eye_gap,
            left_eye_x: self.eyes.left_eye_x,
            right_eye_x: self.eyes.right_eye_x,
            eye_line_y: self.eyes.eye_line_y,
        }
    }

    pub fn intrinsics(&self, frame_width: i32, frame_height: i32) -> CameraIntrinsics {
        CameraIntrinsics {
            focal_length: self.camera.focal_length,
            width: f64::from(frame_width),
            height: f64::from(frame_height),
        }
    }

    pub fn initial_head_position(&self) -> Point3<f64> {
        Point3::from(self.scene.initial_head_position)
    }
}

pub const EXAMPLE_CONFIG: &str = r#"# Virtual window configuration

camera:
  index: 0
  # focal length in pixels
  focal_length: 500.0
  mirror: true

detection:
  cascade: "haarcascades/haarcascade_frontalface_alt.xml"
  # smaller faces can be tracked from further away
  min_face_size: 80
  scale_factor: 1.1
  min_neighbors: 2

eyes:
  # centimeters
  eye_gap: 6.5
  left_eye_x: 0.30
  right_eye_x: 0.70
  eye_line_y: 0.37

display:
  title: "Virtual window"
  fullscreen: false
  show_camera: true
  show_detection: true
  wireframe: false
  camera_scale: 0.5
  camera_scale_step: 0.1
  camera_scale_min: 0.2
  camera_scale_max: 1.9
  window_scale: 1.5
  window_position: [200, 80]

scene:
  fov_y: 60.0
  near: 1.0
  far: 250.0
  axes_length: 10.0
  screen_divisor: 40.0
  initial_head_position: [0.0, 0.0, 60.0]
"#;

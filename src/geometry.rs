//! Pinhole camera math turning a detected face box into an eye position.
//!
//! The eyes are placed at fixed fractions of the face box and the distance
//! to the viewer follows from the assumed physical gap between them.

use nalgebra::{Point2, Point3};
use opencv::core::Rect;

/// Eye midpoint in camera space, in centimeters.
pub type HeadPosition = Point3<f64>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in pixels
    pub focal_length: f64,
    /// Frame width in pixels
    pub width: f64,
    /// Frame height in pixels
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeModel {
    /// Physical distance between the eyes in centimeters
    pub eye_gap: f64,
    pub left_eye_x: f64,
    pub right_eye_x: f64,
    pub eye_line_y: f64,
}

impl Default for EyeModel {
    fn default() -> Self {
        Self {
            eye_gap: 6.5,
            left_eye_x: 0.30,
            right_eye_x: 0.70,
            eye_line_y: 0.37,
        }
    }
}

/// Estimated eye locations in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeLandmarks {
    pub left: Point2<f64>,
    pub right: Point2<f64>,
    pub center: Point2<f64>,
}

impl CameraIntrinsics {
    /// Tangent of the horizontal angle between the optical axis and pixel column `x`.
    pub fn normalize_x(&self, x: f64) -> f64 {
        (x - self.width / 2.0) / self.focal_length
    }

    /// Tangent of the vertical angle between the optical axis and pixel row `y`.
    pub fn normalize_y(&self, y: f64) -> f64 {
        (y - self.height / 2.0) / self.focal_length
    }
}

pub fn locate_eyes(face: &Rect, model: &EyeModel) -> EyeLandmarks {
    let x = f64::from(face.x);
    let y = f64::from(face.y);
    let width = f64::from(face.width);
    let height = f64::from(face.height);

    let eye_line = y + height * model.eye_line_y;
    let left = Point2::new(x + width * model.left_eye_x, eye_line);
    let right = Point2::new(x + width * model.right_eye_x, eye_line);
    let center = nalgebra::center(&left, &right);
    EyeLandmarks {
        left,
        right,
        center,
    }
}

/// Returns `None` for faces that can't produce a finite depth.
pub fn estimate_head_position(
    face: &Rect,
    intrinsics: &CameraIntrinsics,
    model: &EyeModel,
) -> Option<HeadPosition> {
    if face.width <= 0 || face.height < 0 || intrinsics.focal_length <= 0.0 {
        return None;
    }

    let eyes = locate_eyes(face, model);
    let norm_left = intrinsics.normalize_x(eyes.left.x);
    let norm_right = intrinsics.normalize_x(eyes.right.x);
    let span = norm_right - norm_left;
    if span <= 0.0 || !span.is_finite() {
        return None;
    }

    // difference of tangents, not the tangent of the angle between the rays
    let depth = model.eye_gap / span;
    let x = intrinsics.normalize_x(eyes.center.x) * depth;
    let y = -intrinsics.normalize_y(eyes.center.y) * depth;

    let position = Point3::new(x, y, depth);
    if position.iter().all(|value| value.is_finite()) {
        Some(position)
    } else {
        None
    }
}

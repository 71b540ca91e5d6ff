use crate::detector::{prepare_for_detection, FaceDetection};
use crate::geometry::{estimate_head_position, locate_eyes, CameraIntrinsics, EyeModel, HeadPosition};
use crate::Result;
use log::debug;
use opencv::core::{self, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

/// Result of processing a single captured frame.
pub struct ProcessedFrame {
    /// Frame as shown in the picture in picture, possibly mirrored and annotated
    pub image: Mat,
    pub face: Option<Rect>,
    /// Present only when a face produced a valid estimate
    pub head_position: Option<HeadPosition>,
}

pub struct FrameProcessor<D> {
    detector: D,
    intrinsics: CameraIntrinsics,
    eye_model: EyeModel,
    mirror: bool,
}

impl<D: FaceDetection> FrameProcessor<D> {
    pub fn new(detector: D, intrinsics: CameraIntrinsics, eye_model: EyeModel, mirror: bool) -> Self {
        Self {
            detector,
            intrinsics,
            eye_model,
            mirror,
        }
    }

    pub fn process_frame(&mut self, frame: &Mat, annotate: bool) -> Result<ProcessedFrame> {
        let mut image = if self.mirror {
            let mut mirrored = Mat::default();
            core::flip(frame, &mut mirrored, 1)?;
            mirrored
        } else {
            frame.clone()
        };

        let prepared = prepare_for_detection(&image)?;
        let face = self.detector.detect(&prepared)?;

        let head_position = face
            .as_ref()
            .and_then(|face| estimate_head_position(face, &self.intrinsics, &self.eye_model));

        if let (Some(face), Some(head)) = (face, head_position) {
            debug!("head at ({:.1}, {:.1}, {:.1}) cm", head.x, head.y, head.z);
            if annotate {
                draw_detection(&mut image, &face, &self.eye_model)?;
            }
        }

        Ok(ProcessedFrame {
            image,
            face,
            head_position,
        })
    }
}

fn to_pixel(point: nalgebra::Point2<f64>) -> Point {
    Point::new(point.x.round() as i32, point.y.round() as i32)
}

/// Draws the face box, face cross and eye estimates onto `image`.
pub fn draw_detection(image: &mut Mat, face: &Rect, eye_model: &EyeModel) -> Result<()> {
    let eyes = locate_eyes(face, eye_model);
    let eye_line = eyes.left.y.round() as i32;
    let midline = (f64::from(face.x) + f64::from(face.width) * 0.5).round() as i32;

    let black = Scalar::new(0.0, 0.0, 0.0, 0.0);
    let white = Scalar::new(255.0, 255.0, 255.0, 0.0);
    let red = Scalar::new(0.0, 0.0, 255.0, 0.0);

    imgproc::rectangle_def(image, *face, Scalar::new(255.0, 0.0, 0.0, 0.0))?;

    // face cross
    imgproc::line(
        image,
        Point::new(face.x, eye_line),
        Point::new(face.x + face.width, eye_line),
        black,
        1,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::line(
        image,
        Point::new(midline, face.y),
        Point::new(midline, face.y + face.height),
        black,
        1,
        imgproc::LINE_8,
        0,
    )?;

    let radius = (0.06 * f64::from(face.width)).round() as i32;
    for eye in [eyes.left, eyes.right] {
        imgproc::circle(image, to_pixel(eye), radius, white, 1, imgproc::LINE_8, 0)?;
    }

    imgproc::line(
        image,
        to_pixel(eyes.left),
        to_pixel(eyes.right),
        red,
        1,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::circle(image, to_pixel(eyes.center), 2, red, 3, imgproc::LINE_8, 0)?;
    Ok(())
}

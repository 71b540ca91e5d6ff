use crate::config::DetectionConfig;
use crate::{Error, Result};
use log::info;
use opencv::core::{Rect, Size};
use opencv::prelude::*;
use opencv::types::VectorOfRect;
use opencv::{core, imgproc, objdetect};
use std::path::Path;

/// Finds the most prominent face in a grayscale frame.
pub trait FaceDetection {
    fn detect(&mut self, image: &Mat) -> Result<Option<Rect>>;
}

pub struct CascadeFaceDetector {
    classifier: objdetect::CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    min_face_size: i32,
}

impl CascadeFaceDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let xml = resolve_cascade(&config.cascade)?;
        let classifier = objdetect::CascadeClassifier::new(&xml)
            .map_err(|_| Error::CascadeLoad(xml.clone()))?;
        if classifier.empty()? {
            return Err(Error::CascadeLoad(xml));
        }
        info!("Loaded face cascade from {}", xml);
        Ok(Self {
            classifier,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_face_size: config.min_face_size,
        })
    }

    pub fn detect_all(&mut self, image: &Mat) -> Result<VectorOfRect> {
        let mut faces = VectorOfRect::new();

        self.classifier.detect_multi_scale(
            image,
            &mut faces,
            self.scale_factor,
            self.min_neighbors,
            objdetect::CASCADE_SCALE_IMAGE | objdetect::CASCADE_FIND_BIGGEST_OBJECT,
            Size {
                width: self.min_face_size,
                height: self.min_face_size,
            },
            Size {
                width: 0,
                height: 0,
            },
        )?;
        Ok(faces)
    }
}

impl FaceDetection for CascadeFaceDetector {
    fn detect(&mut self, image: &Mat) -> Result<Option<Rect>> {
        let faces = self.detect_all(image)?;
        Ok(find_largest_face(&faces))
    }
}

fn resolve_cascade(path: &Path) -> Result<String> {
    let name = path
        .to_str()
        .ok_or_else(|| Error::CascadeLoad(path.display().to_string()))?;
    if path.is_file() {
        return Ok(name.to_owned());
    }
    // fall back to the OpenCV data directories
    match core::find_file(name, false, false) {
        Ok(found) if !found.is_empty() => Ok(found),
        _ => Err(Error::CascadeLoad(name.to_owned())),
    }
}

pub fn find_largest_face(faces: &VectorOfRect) -> Option<Rect> {
    faces
        .into_iter()
        .max_by(|a, b| (a.height * a.width).cmp(&(b.height * b.width)))
}

pub fn convert_to_grayscale(image: &Mat) -> Result<Mat> {
    let mut gray: Mat = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// Grayscale with equalized histogram, stabilizing detection under changing light.
pub fn prepare_for_detection(image: &Mat) -> Result<Mat> {
    let gray = convert_to_grayscale(image)?;
    let mut equalized = Mat::default();
    imgproc::equalize_hist(&gray, &mut equalized)?;
    Ok(equalized)
}

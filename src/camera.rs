use crate::{Error, Result};
use log::info;
use opencv::core::Size;
use opencv::prelude::*;
use opencv::videoio;

/// Pull based frame source. Frame dimensions are fixed for the session.
pub trait FrameSource {
    /// Next captured frame, or `None` when nothing new is available.
    fn next_frame(&mut self) -> Result<Option<Mat>>;

    fn frame_size(&self) -> Size;
}

pub struct CameraSource {
    capture: videoio::VideoCapture,
    frame_size: Size,
}

impl CameraSource {
    pub fn new(index: i32) -> Result<Self> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|_| Error::CaptureUnavailable(index))?;
        if !videoio::VideoCapture::is_opened(&capture).unwrap_or(false) {
            return Err(Error::CaptureUnavailable(index));
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        info!("Opened camera {} at {}x{}", index, width, height);

        Ok(Self {
            capture,
            frame_size: Size::new(width, height),
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let grabbed = self.capture.read(&mut frame)?;
        if !grabbed || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn frame_size(&self) -> Size {
        self.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_camera_is_capture_unavailable() {
        match CameraSource::new(99) {
            Err(err @ Error::CaptureUnavailable(99)) => assert_eq!(err.exit_code(), 1),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("camera 99 should not exist"),
        }
    }
}

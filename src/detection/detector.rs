/// Detector capability and invocation helpers
///
/// The pipeline knows nothing about the vision model behind a detector: it
/// hands over a frame and gets back an ordered set of opaque records or an
/// error.
use std::panic::{self, AssertUnwindSafe};

use image::RgbaImage;

use crate::error::DetectionError;

/// Pixel buffer type submitted to the pipeline
pub type FrameImage = RgbaImage;

/// Detector trait
///
/// Implementations may keep state between frames (tracking, warm buffers),
/// hence `&mut self`. The pipeline never calls `detect` concurrently with
/// itself.
pub trait Detector<T>: Send {
    /// Run the model over one frame
    fn detect(&mut self, image: &FrameImage) -> Result<Vec<T>, DetectionError>;

    /// Get detector name (for logging)
    fn name(&self) -> &str {
        "detector"
    }
}

impl<T, F> Detector<T> for F
where
    F: FnMut(&FrameImage) -> Result<Vec<T>, DetectionError> + Send,
{
    fn detect(&mut self, image: &FrameImage) -> Result<Vec<T>, DetectionError> {
        self(image)
    }
}

/// Run a detector, turning a panic into [`DetectionError::Panicked`].
pub(crate) fn invoke<T>(
    detector: &mut dyn Detector<T>,
    image: &FrameImage,
) -> Result<Vec<T>, DetectionError> {
    match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(image))) {
        Ok(result) => result,
        Err(payload) => Err(DetectionError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

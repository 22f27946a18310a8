/// Prediction pipeline: decode, detect, annotate
///
/// A [`Predictor`] pairs a detector with its thresholds. `predict` returns
/// the detections plus a JPEG with every box drawn in a per-class colour,
/// optionally saving that JPEG to a cache directory as
/// `<YYYY-mm-dd-HH-MM-SS>-<8 hex>.jpg`.
///
/// # Example
///
/// ```no_run
/// use mildew_engine::detector::{DetectParams, MockDetector};
/// use mildew_engine::predictor::Predictor;
/// use mildew_shared::models::DetectionKind;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example(upload: bytes::Bytes) -> Result<(), mildew_engine::predictor::PredictError> {
/// let predictor = Predictor::new(
///     Arc::new(MockDetector::new("mock_data", DetectionKind::Downy)),
///     DetectParams::default(),
/// );
/// let prediction = predictor.predict(upload, Some(Path::new("assets/image_cache"))).await?;
/// println!("{} boxes", prediction.detections.len());
/// # Ok(())
/// # }
/// ```

use crate::detector::{DetectInput, DetectParams, Detection, Detector, DetectorError};
use crate::imaging::{self, ImageError};
use bytes::Bytes;
use chrono::Local;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Error type for the prediction pipeline
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    /// Upload could not be decoded or result could not be encoded
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Detector failed
    #[error(transparent)]
    Detector(#[from] DetectorError),

    /// Blocking task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for PredictError {
    fn from(e: tokio::task::JoinError) -> Self {
        PredictError::Join(e.to_string())
    }
}

/// Detections on a decoded image
#[derive(Debug, Clone)]
pub struct Detected {
    pub image: Arc<RgbImage>,
    pub detections: Vec<Detection>,
}

/// Detections plus the annotated result image
#[derive(Debug, Clone)]
pub struct Prediction {
    pub detections: Vec<Detection>,

    /// Annotated JPEG
    pub annotated_jpeg: Vec<u8>,

    /// Where the annotated JPEG was written, when saving was requested
    pub saved_to: Option<PathBuf>,
}

/// Box colours, cycled by class index
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([255, 56, 56]),
    Rgb([255, 157, 151]),
    Rgb([255, 112, 31]),
    Rgb([255, 178, 29]),
    Rgb([207, 210, 49]),
    Rgb([72, 249, 10]),
    Rgb([146, 204, 23]),
    Rgb([61, 219, 134]),
    Rgb([26, 147, 52]),
    Rgb([0, 212, 187]),
];

pub fn class_colour(cls: u32) -> Rgb<u8> {
    PALETTE[cls as usize % PALETTE.len()]
}

/// Stroke width scaled to the image size, at least 2 px
pub fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

/// Draws every detection onto a copy of `image`
pub fn annotate(image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    let thickness = line_width(image.width(), image.height());
    for d in detections {
        let xyxy = imaging::clamp_box(d.xyxy, image.width(), image.height());
        imaging::draw_rect(&mut canvas, xyxy, class_colour(d.cls), thickness);
    }
    canvas
}

/// Detector plus thresholds
#[derive(Clone)]
pub struct Predictor {
    detector: Arc<dyn Detector>,
    params: DetectParams,
}

impl Predictor {
    pub fn new(detector: Arc<dyn Detector>, params: DetectParams) -> Self {
        Self { detector, params }
    }

    pub fn params(&self) -> DetectParams {
        self.params
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Decodes the upload and runs the detector
    ///
    /// # Errors
    ///
    /// - `PredictError::Image` if the bytes aren't an image
    /// - `PredictError::Detector` if detection fails
    pub async fn detect(&self, upload: Bytes) -> Result<Detected, PredictError> {
        let started = Instant::now();

        let raw = upload.clone();
        let image = Arc::new(tokio::task::spawn_blocking(move || imaging::decode(&raw)).await??);

        let detections = self
            .detector
            .detect(DetectInput::new(Arc::clone(&image), upload), self.params)
            .await?;

        tracing::debug!(
            detector = self.detector.name(),
            detections = detections.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Detection finished"
        );

        Ok(Detected { image, detections })
    }

    /// Detects and renders the annotated result
    ///
    /// When `save_to` is set the JPEG is also written into that directory.
    pub async fn predict(&self, upload: Bytes, save_to: Option<&Path>) -> Result<Prediction, PredictError> {
        let Detected { image, detections } = self.detect(upload).await?;

        let boxes = detections.clone();
        let annotated_jpeg = tokio::task::spawn_blocking(move || {
            imaging::encode_jpeg(&annotate(&image, &boxes), imaging::DEFAULT_JPEG_QUALITY)
        })
        .await??;

        let saved_to = match save_to {
            Some(dir) => Some(save_cached(dir, &annotated_jpeg).await?),
            None => None,
        };

        Ok(Prediction {
            detections,
            annotated_jpeg,
            saved_to,
        })
    }
}

async fn save_cached(dir: &Path, jpeg: &[u8]) -> Result<PathBuf, ImageError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "{}-{}.jpg",
        Local::now().format("%Y-%m-%d-%H-%M-%S"),
        imaging::short_hex()
    ));
    tokio::fs::write(&path, jpeg).await?;
    Ok(path)
}

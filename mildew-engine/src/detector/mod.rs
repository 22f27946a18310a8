/// Object detector backends
///
/// A detector takes a decoded image (plus the raw upload bytes) and returns
/// the boxes a YOLO model would report for it. Three backends exist:
///
/// - **Mock**: Canned results keyed by the md5 of the upload, with a
///   deterministic synthetic fallback. Used for demos and tests.
/// - **Remote**: Forwards the image to an HTTP inference service.
/// - **Onnx** (feature `onnx`): Runs a YOLOv8 ONNX export in-process.
///
/// # Detection Shape
///
/// ```json
/// { "id": 1, "xyxy": [12.0, 30.5, 140.2, 188.0], "conf": 0.91, "cls": 4 }
/// ```
///
/// `id` is 1-based and follows the order boxes come out of the backend.
///
/// # Example
///
/// ```no_run
/// use mildew_engine::detector::{Detector, DetectInput, DetectParams, MockDetector};
/// use mildew_shared::models::DetectionKind;
/// use std::sync::Arc;
///
/// # async fn example(image: image::RgbImage, raw: bytes::Bytes) -> Result<(), Box<dyn std::error::Error>> {
/// let detector = MockDetector::new("mock_data", DetectionKind::Downy);
/// let input = DetectInput::new(Arc::new(image), raw);
/// let boxes = detector.detect(input, DetectParams::default()).await?;
/// # Ok(())
/// # }
/// ```

pub mod mock;
pub mod nms;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod registry;
pub mod remote;

pub use mock::MockDetector;
pub use nms::{iou, nms};
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;
pub use registry::{DetectorRegistry, DetectorSettings, ModelPaths};
pub use remote::RemoteDetector;

use async_trait::async_trait;
use bytes::Bytes;
use image::RgbImage;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Detector error types
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// Model file missing or unloadable
    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    /// Inference itself failed
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Remote inference service failed or was unreachable
    #[error("Remote detector error: {0}")]
    Remote(String),

    /// Backend returned something that isn't a detection list
    #[error("Invalid detector output: {0}")]
    InvalidOutput(String),

    /// Backend not compiled in or not configured
    #[error("Unsupported detector backend: {0}")]
    Unsupported(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detector result type alias
pub type DetectorResult<T> = Result<T, DetectorError>;

/// A single detected box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 1-based position in the result list
    #[serde(default)]
    pub id: usize,

    /// Box corners `[x1, y1, x2, y2]` in image pixels
    pub xyxy: [f32; 4],

    /// Confidence score in `[0, 1]`
    pub conf: f32,

    /// Class index
    #[serde(deserialize_with = "class_index")]
    pub cls: u32,
}

impl Detection {
    /// Creates a detection with id 0; ids are assigned by [`number`]
    pub fn new(xyxy: [f32; 4], conf: f32, cls: u32) -> Self {
        Self { id: 0, xyxy, conf, cls }
    }

    pub fn width(&self) -> f32 {
        (self.xyxy[2] - self.xyxy[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.xyxy[3] - self.xyxy[1]).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Class indices arrive as `4` or `4.0` depending on who wrote the JSON
fn class_index<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!("invalid class index: {}", value)));
    }
    Ok(value as u32)
}

/// Assigns contiguous 1-based ids in list order
pub fn number(mut detections: Vec<Detection>) -> Vec<Detection> {
    for (i, d) in detections.iter_mut().enumerate() {
        d.id = i + 1;
    }
    detections
}

/// Detections as produced by a JSON source: either a bare list or an object
/// with a `detections` list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DetectionPayload {
    List(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

impl DetectionPayload {
    pub fn into_detections(self) -> Vec<Detection> {
        match self {
            DetectionPayload::List(list) => list,
            DetectionPayload::Wrapped { detections } => detections,
        }
    }
}

/// Confidence and NMS thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    /// Minimum confidence kept
    pub conf: f32,

    /// IoU above which overlapping boxes of one class are suppressed
    pub iou: f32,
}

impl DetectParams {
    pub fn new(conf: f32, iou: f32) -> Self {
        Self { conf, iou }
    }
}

impl Default for DetectParams {
    fn default() -> Self {
        Self { conf: 0.2, iou: 0.5 }
    }
}

/// Image handed to a detector
#[derive(Debug, Clone)]
pub struct DetectInput {
    /// Decoded RGB pixels
    pub image: Arc<RgbImage>,

    /// Upload bytes exactly as received
    pub raw: Bytes,
}

impl DetectInput {
    pub fn new(image: Arc<RgbImage>, raw: Bytes) -> Self {
        Self { image, raw }
    }
}

/// Detector trait
///
/// Implementations must be cheap to share across requests; the registry
/// hands out `Arc<dyn Detector>`. CPU-heavy work belongs on the blocking pool.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Backend name, used in logs and `/health`
    fn name(&self) -> &str;

    /// Runs detection
    ///
    /// Returned ids are 1-based and contiguous.
    async fn detect(&self, input: DetectInput, params: DetectParams) -> DetectorResult<Vec<Detection>>;
}

/// Detector backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    Mock,
    Remote,
    Onnx,
}

impl DetectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorBackend::Mock => "mock",
            DetectorBackend::Remote => "remote",
            DetectorBackend::Onnx => "onnx",
        }
    }
}

impl fmt::Display for DetectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(DetectorBackend::Mock),
            "remote" => Ok(DetectorBackend::Remote),
            "onnx" => Ok(DetectorBackend::Onnx),
            other => Err(format!("Unknown detector backend: {}", other)),
        }
    }
}

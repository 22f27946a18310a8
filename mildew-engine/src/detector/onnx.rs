/// ONNX Runtime detector (feature `onnx`)
///
/// Runs a YOLOv8 detection model exported to ONNX. The runtime library is
/// loaded dynamically, so `libonnxruntime` must be discoverable at run time
/// (`ORT_DYLIB_PATH`).
///
/// # Pipeline
///
/// 1. Letterbox the image to 640x640 (grey 114 padding), scale to `[0, 1]`
/// 2. Run the model: output is `[1, 4 + classes, anchors]`
/// 3. Keep anchors whose best class score reaches `conf`
/// 4. Class-wise NMS at `iou`
/// 5. Map boxes back to original image coordinates

use super::{nms, DetectInput, DetectParams, Detection, Detector, DetectorError, DetectorResult};
use async_trait::async_trait;
use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array4, ArrayViewD, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Square model input size
pub const INPUT_SIZE: u32 = 640;

const PAD_VALUE: u8 = 114;

/// ONNX detector implementation
pub struct OnnxDetector {
    session: Arc<Mutex<Session>>,
    model_name: String,
}

fn ort_error(e: ort::Error) -> DetectorError {
    DetectorError::Inference(e.to_string())
}

impl OnnxDetector {
    /// Loads a model from disk
    ///
    /// # Errors
    ///
    /// Returns `DetectorError::ModelUnavailable` if the file is missing or
    /// the runtime rejects it
    pub fn load(path: &Path) -> DetectorResult<Self> {
        if !path.exists() {
            return Err(DetectorError::ModelUnavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| DetectorError::ModelUnavailable(format!("{}: {}", path.display(), e)))?;

        let model_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        tracing::info!(model = %model_name, "Loaded ONNX model");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            model_name,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl Detector for OnnxDetector {
    fn name(&self) -> &str {
        "onnx"
    }

    async fn detect(&self, input: DetectInput, params: DetectParams) -> DetectorResult<Vec<Detection>> {
        let session = Arc::clone(&self.session);
        let image = Arc::clone(&input.image);

        tokio::task::spawn_blocking(move || {
            let letterbox = Letterbox::new(&image);
            let tensor = letterbox.tensor();

            let mut session = session
                .lock()
                .map_err(|_| DetectorError::Inference("session lock poisoned".to_string()))?;
            let outputs = session
                .run(ort::inputs![TensorRef::from_array_view(&tensor).map_err(ort_error)?])
                .map_err(ort_error)?;
            let output = outputs[0].try_extract_array::<f32>().map_err(ort_error)?;

            let candidates = decode_output(output, params.conf, &letterbox)?;
            Ok(nms(candidates, params.iou))
        })
        .await
        .map_err(|e| DetectorError::Inference(format!("inference task failed: {}", e)))?
    }
}

/// Resized and padded copy of an image plus the transform back
struct Letterbox {
    canvas: RgbImage,
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn new(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let scale = (INPUT_SIZE as f32 / width.max(1) as f32).min(INPUT_SIZE as f32 / height.max(1) as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);

        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
        let pad_x = (INPUT_SIZE - new_w) / 2;
        let pad_y = (INPUT_SIZE - new_h) / 2;

        let mut canvas = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([PAD_VALUE; 3]));
        image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        Self {
            canvas,
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            width,
            height,
        }
    }

    /// NCHW float tensor in `[0, 1]`
    fn tensor(&self) -> Array4<f32> {
        let size = INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in self.canvas.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        tensor
    }

    /// Maps a model-space centre/size box to clamped original coordinates
    fn unmap(&self, cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
        let x1 = (cx - w / 2.0 - self.pad_x) / self.scale;
        let y1 = (cy - h / 2.0 - self.pad_y) / self.scale;
        let x2 = (cx + w / 2.0 - self.pad_x) / self.scale;
        let y2 = (cy + h / 2.0 - self.pad_y) / self.scale;
        [
            x1.clamp(0.0, self.width as f32),
            y1.clamp(0.0, self.height as f32),
            x2.clamp(0.0, self.width as f32),
            y2.clamp(0.0, self.height as f32),
        ]
    }
}

fn decode_output(output: ArrayViewD<'_, f32>, conf: f32, letterbox: &Letterbox) -> DetectorResult<Vec<Detection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[1] < 5 {
        return Err(DetectorError::InvalidOutput(format!(
            "expected [1, 4 + classes, anchors], got {:?}",
            shape
        )));
    }

    let rows = output.index_axis(Axis(0), 0);
    let classes = shape[1] - 4;
    let mut detections = Vec::new();

    for anchor in 0..shape[2] {
        let (mut best_cls, mut best_score) = (0usize, f32::MIN);
        for cls in 0..classes {
            let score = rows[[4 + cls, anchor]];
            if score > best_score {
                best_cls = cls;
                best_score = score;
            }
        }
        if best_score < conf {
            continue;
        }

        let xyxy = letterbox.unmap(
            rows[[0, anchor]],
            rows[[1, anchor]],
            rows[[2, anchor]],
            rows[[3, anchor]],
        );
        detections.push(Detection::new(xyxy, best_score, best_cls as u32));
    }

    Ok(detections)
}

/// Mock detector for demos and testing
///
/// Results are looked up by the md5 of the uploaded bytes:
///
/// ```text
/// mock_data/
///   ├── 3f2a...e1.jpg    (annotated result image, optional)
///   └── 3f2a...e1.json   (detections: a list, or {"detections": [...]})
/// ```
///
/// When no file matches, a synthetic result is derived from the digest and
/// the image size, so the same upload always gets the same answer. Frogeye
/// results always contain one leaf (class 4) with lesions (classes 1-3)
/// inside it, which keeps lesion analysis meaningful.
///
/// Use `mildew-cli mock setup` / `mildew-cli mock add` to populate the directory.

use super::{number, DetectInput, DetectParams, Detection, DetectionPayload, Detector, DetectorError, DetectorResult};
use async_trait::async_trait;
use md5::{Digest, Md5};
use mildew_shared::models::DetectionKind;
use std::path::{Path, PathBuf};

/// Mock detector implementation
pub struct MockDetector {
    data_dir: PathBuf,
    kind: DetectionKind,
}

impl MockDetector {
    /// Creates a mock detector reading canned results from `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>, kind: DetectionKind) -> Self {
        Self {
            data_dir: data_dir.into(),
            kind,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    async fn canned(&self, digest: &str) -> DetectorResult<Option<Vec<Detection>>> {
        let path = self.data_dir.join(format!("{}.json", digest));
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let payload: DetectionPayload = serde_json::from_slice(&contents)
            .map_err(|e| DetectorError::InvalidOutput(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(digest, path = %path.display(), "Using canned mock result");
        Ok(Some(payload.into_detections()))
    }
}

#[async_trait]
impl Detector for MockDetector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn detect(&self, input: DetectInput, params: DetectParams) -> DetectorResult<Vec<Detection>> {
        let raw = input.raw.clone();
        let block = tokio::task::spawn_blocking(move || {
            let mut block = [0u8; 16];
            block.copy_from_slice(&Md5::digest(&raw));
            block
        })
        .await
        .map_err(|e| DetectorError::Inference(format!("Hashing task failed: {}", e)))?;
        let digest = hex::encode(block);

        let detections = match self.canned(&digest).await? {
            Some(detections) => detections,
            None => synthetic(self.kind, block, input.image.width(), input.image.height()),
        };

        Ok(number(
            detections
                .into_iter()
                .filter(|d| d.conf >= params.conf)
                .collect(),
        ))
    }
}

/// Byte stream derived from the md5 of the upload, extended by re-hashing
struct DigestBytes {
    block: [u8; 16],
    pos: usize,
}

impl DigestBytes {
    fn new(block: [u8; 16]) -> Self {
        Self { block, pos: 0 }
    }

    fn next(&mut self) -> u8 {
        if self.pos == self.block.len() {
            let rehashed = Md5::digest(self.block);
            self.block.copy_from_slice(&rehashed);
            self.pos = 0;
        }
        let b = self.block[self.pos];
        self.pos += 1;
        b
    }

    /// Fraction in `[0, 1)`
    fn unit(&mut self) -> f32 {
        self.next() as f32 / 256.0
    }
}

/// `digest` is the md5 of the upload
fn synthetic(kind: DetectionKind, digest: [u8; 16], width: u32, height: u32) -> Vec<Detection> {
    let mut bytes = DigestBytes::new(digest);
    let (w, h) = (width as f32, height as f32);

    match kind {
        DetectionKind::Frogeye => {
            let leaf = [w * 0.1, h * 0.1, w * 0.9, h * 0.9];
            let mut detections = vec![Detection::new(leaf, 0.9, 4)];

            let lesions = 2 + bytes.next() as usize % 6;
            for _ in 0..lesions {
                let size_w = (w * (0.04 + bytes.unit() * 0.06)).max(2.0);
                let size_h = (h * (0.04 + bytes.unit() * 0.06)).max(2.0);
                let x1 = leaf[0] + bytes.unit() * (leaf[2] - leaf[0] - size_w).max(0.0);
                let y1 = leaf[1] + bytes.unit() * (leaf[3] - leaf[1] - size_h).max(0.0);
                let conf = 0.3 + bytes.unit() * 0.6;
                let cls = 1 + bytes.next() as u32 % 3;
                detections.push(Detection::new([x1, y1, x1 + size_w, y1 + size_h], conf, cls));
            }
            detections
        }
        DetectionKind::Downy | DetectionKind::Powdery => {
            let count = 1 + bytes.next() as usize % 4;
            (0..count)
                .map(|_| {
                    let x1 = bytes.unit() * w * 0.7;
                    let y1 = bytes.unit() * h * 0.7;
                    let x2 = (x1 + w * (0.1 + bytes.unit() * 0.2)).min(w);
                    let y2 = (y1 + h * (0.1 + bytes.unit() * 0.2)).min(h);
                    let conf = 0.25 + bytes.unit() * 0.7;
                    let cls = bytes.next() as u32 % 4;
                    Detection::new([x1, y1, x2, y2], conf, cls)
                })
                .collect()
        }
    }
}

/// Remote detector
///
/// Forwards the upload to an HTTP inference service that hosts the YOLO
/// models. The request is a multipart POST:
///
/// ```text
/// POST {url}?conf=0.2&iou=0.5&model=downy
/// Content-Type: multipart/form-data
///
/// file=<raw image bytes>
/// ```
///
/// The service answers with a detection list (or `{"detections": [...]}`).

use super::{number, DetectInput, DetectParams, Detection, DetectionPayload, Detector, DetectorError, DetectorResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote detector implementation
pub struct RemoteDetector {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl RemoteDetector {
    /// Creates a remote detector
    ///
    /// # Arguments
    ///
    /// * `url` - Inference endpoint
    /// * `model` - Model name sent as the `model` query parameter
    /// * `timeout` - Per-request timeout
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> DetectorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Remote(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn name(&self) -> &str {
        "remote"
    }

    async fn detect(&self, input: DetectInput, params: DetectParams) -> DetectorResult<Vec<Detection>> {
        let part = Part::bytes(input.raw.to_vec())
            .file_name("image")
            .mime_str("application/octet-stream")
            .map_err(|e| DetectorError::Remote(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .query(&[
                ("conf", params.conf.to_string()),
                ("iou", params.iou.to_string()),
                ("model", self.model.clone()),
            ])
            .multipart(form)
            .send()
            .await
            .map_err(|e| DetectorError::Remote(format!("Request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Remote(format!("{} returned {}: {}", self.url, status, body)));
        }

        let payload: DetectionPayload = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidOutput(e.to_string()))?;

        tracing::debug!(model = %self.model, "Remote detection completed");
        Ok(number(payload.into_detections()))
    }
}

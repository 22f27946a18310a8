/// Detector registry
///
/// Holds one detector per [`DetectionKind`]. The server builds it once at
/// startup from the configured backend and shares it through app state.

use super::{Detector, DetectorBackend, DetectorError, DetectorResult, MockDetector, RemoteDetector};
use mildew_shared::models::DetectionKind;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model file per detection kind
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub downy: PathBuf,
    pub powdery: PathBuf,
    pub frogeye: PathBuf,
}

impl ModelPaths {
    pub fn for_kind(&self, kind: DetectionKind) -> &PathBuf {
        match kind {
            DetectionKind::Downy => &self.downy,
            DetectionKind::Powdery => &self.powdery,
            DetectionKind::Frogeye => &self.frogeye,
        }
    }
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            downy: PathBuf::from("assets/models/downy_m_20231108.onnx"),
            powdery: PathBuf::from("assets/models/powdery_m_20240106.onnx"),
            frogeye: PathBuf::from("assets/models/frogeye_l_20241109.onnx"),
        }
    }
}

/// Everything needed to construct detectors for any backend
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: DetectorBackend,
    pub models: ModelPaths,
    pub mock_data_dir: PathBuf,
    pub remote_url: Option<String>,
    pub timeout: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Mock,
            models: ModelPaths::default(),
            mock_data_dir: PathBuf::from("mock_data"),
            remote_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Builds the detector for one kind
///
/// # Errors
///
/// - `DetectorError::Unsupported` for `remote` without a URL, or `onnx`
///   when the crate was built without the `onnx` feature
/// - `DetectorError::ModelUnavailable` if an ONNX model can't be loaded
pub fn build_detector(settings: &DetectorSettings, kind: DetectionKind) -> DetectorResult<Arc<dyn Detector>> {
    match settings.backend {
        DetectorBackend::Mock => Ok(Arc::new(MockDetector::new(settings.mock_data_dir.clone(), kind))),
        DetectorBackend::Remote => {
            let url = settings.remote_url.as_deref().ok_or_else(|| {
                DetectorError::Unsupported("remote backend requires REMOTE_DETECTOR_URL".to_string())
            })?;
            Ok(Arc::new(RemoteDetector::new(url, kind.as_str(), settings.timeout)?))
        }
        DetectorBackend::Onnx => build_onnx(settings, kind),
    }
}

#[cfg(feature = "onnx")]
fn build_onnx(settings: &DetectorSettings, kind: DetectionKind) -> DetectorResult<Arc<dyn Detector>> {
    let detector = super::OnnxDetector::load(settings.models.for_kind(kind))?;
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx(_settings: &DetectorSettings, _kind: DetectionKind) -> DetectorResult<Arc<dyn Detector>> {
    Err(DetectorError::Unsupported(
        "onnx backend requires building with the `onnx` feature".to_string(),
    ))
}

/// Detector per detection kind
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: HashMap<DetectionKind, Arc<dyn Detector>>,
    backend: Option<DetectorBackend>,
}

impl DetectorRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one detector per kind from the configured backend
    pub fn from_settings(settings: &DetectorSettings) -> DetectorResult<Self> {
        let mut registry = Self::new();
        registry.backend = Some(settings.backend);

        for kind in DetectionKind::ALL {
            let detector = build_detector(settings, kind)?;
            tracing::info!(kind = %kind, backend = detector.name(), "Registered detector");
            registry.detectors.insert(kind, detector);
        }

        Ok(registry)
    }

    /// Registers (or replaces) the detector for `kind`
    pub fn with(mut self, kind: DetectionKind, detector: Arc<dyn Detector>) -> Self {
        self.detectors.insert(kind, detector);
        self
    }

    pub fn get(&self, kind: DetectionKind) -> Option<Arc<dyn Detector>> {
        self.detectors.get(&kind).cloned()
    }

    /// Backend the registry was built from, if built from settings
    pub fn backend(&self) -> Option<DetectorBackend> {
        self.backend
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.detectors.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("DetectorRegistry")
            .field("kinds", &kinds)
            .field("backend", &self.backend)
            .finish()
    }
}

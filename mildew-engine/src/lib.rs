//! # Mildew Engine
//!
//! Detection and image analysis for soybean leaf diseases.
//!
//! ## Modules
//!
//! - `detector`: Detector trait and backends (mock, remote, ONNX), NMS, registry
//! - `predictor`: Decode, detect and annotate an upload
//! - `imaging`: JPEG encoding, compression, static storage, drawing and masks
//! - `lesion`: Frogeye per-leaf lesion analysis
//! - `tier`: Severity grading from lesion ratio and count
//! - `summary`: Class grouping and grade counts
//! - `mock_data`: Mock detector data directory tooling
//! - `batch`: Folder-wide frogeye analysis to CSV
//!
//! ## Example
//!
//! ```no_run
//! use mildew_engine::detector::{DetectorRegistry, DetectorSettings};
//! use mildew_shared::models::DetectionKind;
//!
//! # fn example() -> Result<(), mildew_engine::detector::DetectorError> {
//! let registry = DetectorRegistry::from_settings(&DetectorSettings::default())?;
//! let downy = registry.get(DetectionKind::Downy);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod detector;
pub mod imaging;
pub mod lesion;
pub mod mock_data;
pub mod predictor;
pub mod summary;
pub mod tier;

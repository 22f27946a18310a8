/// Mock data directory tooling
///
/// The mock detector looks results up by the md5 of the uploaded image. These
/// helpers populate its directory:
///
/// - [`setup_mock_data`]: Turns `original_*.jpg` files into `<md5>.jpg` plus
///   a template `<md5>.json`
/// - [`add_mock_image`]: Registers one original image with a chosen result
///   image and detection data

use crate::detector::DetectionPayload;
use md5::{Digest, Md5};
use serde_json::{json, Value as JsonValue};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for mock data operations
#[derive(Debug, thiserror::Error)]
pub enum MockDataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize mock data: {0}")]
    Json(#[from] serde_json::Error),

    /// Data the mock detector could not read back
    #[error("Mock data is not a detection list: {0}")]
    InvalidData(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> MockDataError + '_ {
    move |source| MockDataError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Lowercase hex md5 of `bytes`
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Detection data written for newly discovered originals
pub fn template() -> JsonValue {
    json!({
        "detections": [
            { "id": 1, "xyxy": [100.0, 150.0, 150.0, 190.0], "conf": 0.9, "cls": 1 },
            { "id": 2, "xyxy": [200.0, 300.0, 260.0, 345.0], "conf": 0.8, "cls": 2 }
        ]
    })
}

/// What [`setup_mock_data`] changed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SetupReport {
    /// `(original name, new name)` pairs
    pub renamed: Vec<(String, String)>,

    /// Data files created
    pub created: Vec<String>,
}

/// Registers every `original_*.jpg` in `dir`
///
/// Each original is renamed to `<md5>.jpg` unless that file already exists,
/// and a template `<md5>.json` is written unless one exists. The directory
/// is created if missing.
pub fn setup_mock_data(dir: &Path) -> Result<SetupReport, MockDataError> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let mut originals: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            name.starts_with("original_") && name.ends_with(".jpg") && path.is_file()
        })
        .collect();
    originals.sort();

    let mut report = SetupReport::default();
    let template = serde_json::to_string_pretty(&template())?;

    for original in originals {
        let bytes = fs::read(&original).map_err(io_err(&original))?;
        let digest = md5_hex(&bytes);

        let image_path = dir.join(format!("{}.jpg", digest));
        if !image_path.exists() {
            fs::rename(&original, &image_path).map_err(io_err(&original))?;
            let from = original.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            tracing::info!(from = %from, to = %image_path.display(), "Renamed mock image");
            report.renamed.push((from, format!("{}.jpg", digest)));
        }

        let data_path = dir.join(format!("{}.json", digest));
        if !data_path.exists() {
            fs::write(&data_path, &template).map_err(io_err(&data_path))?;
            tracing::info!(path = %data_path.display(), digest = %digest, "Created mock data file");
            report.created.push(format!("{}.json", digest));
        }
    }

    Ok(report)
}

/// Files written by [`add_mock_image`]
#[derive(Debug, Clone, PartialEq)]
pub struct AddReport {
    pub digest: String,
    pub image_path: PathBuf,
    pub data_path: PathBuf,
}

/// Registers `original` so that uploading it returns `data`
///
/// `result` is copied to `<md5>.jpg` and `data` is written, pretty-printed,
/// to `<md5>.json`. Existing files are overwritten.
///
/// `data` must be a detection list or `{"detections": [...]}`; nothing is
/// written otherwise.
pub fn add_mock_image(
    dir: &Path,
    original: &Path,
    result: &Path,
    data: &JsonValue,
) -> Result<AddReport, MockDataError> {
    DetectionPayload::deserialize(data).map_err(|e| MockDataError::InvalidData(e.to_string()))?;

    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let bytes = fs::read(original).map_err(io_err(original))?;
    let digest = md5_hex(&bytes);

    let image_path = dir.join(format!("{}.jpg", digest));
    fs::copy(result, &image_path).map_err(io_err(result))?;

    let data_path = dir.join(format!("{}.json", digest));
    fs::write(&data_path, serde_json::to_string_pretty(data)?).map_err(io_err(&data_path))?;

    tracing::info!(
        digest = %digest,
        image = %image_path.display(),
        data = %data_path.display(),
        "Added mock image"
    );

    Ok(AddReport {
        digest,
        image_path,
        data_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_template_is_valid_payload() {
        let payload: DetectionPayload = serde_json::from_value(template()).unwrap();
        assert_eq!(payload.into_detections().len(), 2);
    }

    #[test]
    fn test_setup_mock_data() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("original_a.jpg"), b"image-a").unwrap();
        fs::write(dir.path().join("original_b.jpg"), b"image-b").unwrap();
        fs::write(dir.path().join("unrelated.jpg"), b"other").unwrap();
        fs::write(dir.path().join("original_c.png"), b"png").unwrap();

        let report = setup_mock_data(dir.path()).unwrap();
        let hash_a = md5_hex(b"image-a");

        assert_eq!(report.renamed.len(), 2);
        assert_eq!(report.renamed[0], ("original_a.jpg".to_string(), format!("{}.jpg", hash_a)));
        assert_eq!(report.created.len(), 2);

        assert!(dir.path().join(format!("{}.jpg", hash_a)).exists());
        assert!(dir.path().join(format!("{}.json", hash_a)).exists());
        assert!(!dir.path().join("original_a.jpg").exists());
        assert!(dir.path().join("unrelated.jpg").exists());
        assert!(dir.path().join("original_c.png").exists());

        // Second run has nothing to do
        let again = setup_mock_data(dir.path()).unwrap();
        assert_eq!(again, SetupReport::default());
    }

    #[test]
    fn test_setup_keeps_original_when_target_exists() {
        let dir = tempfile::tempdir().unwrap();
        let hash = md5_hex(b"same");
        fs::write(dir.path().join(format!("{}.jpg", hash)), b"annotated").unwrap();
        fs::write(dir.path().join("original_x.jpg"), b"same").unwrap();

        let report = setup_mock_data(dir.path()).unwrap();
        assert!(report.renamed.is_empty());
        assert_eq!(report.created, vec![format!("{}.json", hash)]);
        assert!(dir.path().join("original_x.jpg").exists());
    }

    #[test]
    fn test_add_mock_image() {
        let work = tempfile::tempdir().unwrap();
        let original = work.path().join("photo.jpg");
        let result = work.path().join("result.jpg");
        fs::write(&original, b"photo").unwrap();
        fs::write(&result, b"annotated").unwrap();

        let mock_dir = work.path().join("mock_data");
        let data = json!([{ "xyxy": [1, 2, 3, 4], "conf": 0.7, "cls": 4 }]);
        let report = add_mock_image(&mock_dir, &original, &result, &data).unwrap();

        assert_eq!(report.digest, md5_hex(b"photo"));
        assert_eq!(fs::read(&report.image_path).unwrap(), b"annotated");

        let written: JsonValue = serde_json::from_slice(&fs::read(&report.data_path).unwrap()).unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn test_add_mock_image_rejects_non_detection_data() {
        let work = tempfile::tempdir().unwrap();
        let original = work.path().join("photo.jpg");
        let result = work.path().join("result.jpg");
        fs::write(&original, b"photo").unwrap();
        fs::write(&result, b"annotated").unwrap();
        let mock_dir = work.path().join("mock_data");

        for data in [
            json!({ "detection_count": 2, "areas": [10, 20] }),
            json!([{ "xyxy": [1, 2, 3], "conf": 0.7, "cls": 1 }]),
            json!("downy"),
        ] {
            let err = add_mock_image(&mock_dir, &original, &result, &data).unwrap_err();
            assert!(matches!(err, MockDataError::InvalidData(_)), "{} should be rejected", data);
        }

        assert!(!mock_dir.join(format!("{}.json", md5_hex(b"photo"))).exists());
        assert!(!mock_dir.join(format!("{}.jpg", md5_hex(b"photo"))).exists());
    }

    #[test]
    fn test_add_mock_image_accepts_wrapped_detections() {
        let work = tempfile::tempdir().unwrap();
        let original = work.path().join("photo.jpg");
        let result = work.path().join("result.jpg");
        fs::write(&original, b"photo").unwrap();
        fs::write(&result, b"annotated").unwrap();

        let report = add_mock_image(&work.path().join("mock_data"), &original, &result, &template()).unwrap();
        let written: DetectionPayload = serde_json::from_slice(&fs::read(&report.data_path).unwrap()).unwrap();
        assert_eq!(written.into_detections().len(), 2);
    }

    #[test]
    fn test_add_mock_image_missing_original() {
        let work = tempfile::tempdir().unwrap();
        let err = add_mock_image(
            work.path(),
            &work.path().join("missing.jpg"),
            &work.path().join("result.jpg"),
            &json!([]),
        )
        .unwrap_err();
        assert!(matches!(err, MockDataError::Io { .. }));
    }
}

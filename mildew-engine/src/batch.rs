/// Batch frogeye analysis over a folder of images
///
/// For each `.jpg`, `.jpeg`, `.png` or `.bmp` file (case-insensitive) in the
/// input folder:
///
/// 1. Detect leaves and lesions (default conf 0.05, iou 0.05)
/// 2. Run lesion analysis and grade every leaf
/// 3. Write the annotated image to `<input>/result/<file name>`
///
/// One CSV row per leaf is collected into the output file. Images that fail
/// are logged and skipped.

use crate::detector::{DetectParams, Detector};
use crate::imaging;
use crate::lesion;
use crate::predictor::Predictor;
use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Thresholds used for frogeye detection
pub const FROGEYE_PARAMS: DetectParams = DetectParams { conf: 0.05, iou: 0.05 };

/// File extensions picked up from the input folder
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// One CSV row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafRow {
    #[serde(rename = "数据")]
    pub image: String,

    #[serde(rename = "叶片")]
    pub leaf_index: usize,

    #[serde(rename = "病害等级")]
    pub tier: u8,

    #[serde(rename = "病斑面积比")]
    pub lesion_ratio: f64,

    #[serde(rename = "病斑数")]
    pub lesion_count: u32,

    #[serde(rename = "平均灰度")]
    pub avg_gray_value: f64,
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub rows: Vec<LeafRow>,
}

/// Lists the images in `input`, sorted by file name
pub fn collect_images(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(input)
        .with_context(|| format!("Failed to read input folder {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    images.sort();
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Analyses every image in `input` and writes the CSV to `output`
pub async fn run_batch(
    detector: Arc<dyn Detector>,
    params: DetectParams,
    input: &Path,
    output: &Path,
) -> anyhow::Result<BatchSummary> {
    let images = collect_images(input)?;
    let result_dir = input.join("result");
    tokio::fs::create_dir_all(&result_dir)
        .await
        .with_context(|| format!("Failed to create {}", result_dir.display()))?;

    tracing::info!(images = images.len(), input = %input.display(), "Starting batch analysis");

    let predictor = Predictor::new(detector, params);
    let mut summary = BatchSummary::default();

    for path in images {
        match analyze_file(&predictor, &path, &result_dir).await {
            Ok(rows) => {
                tracing::info!(file = %path.display(), leaves = rows.len(), "Processed image");
                summary.processed += 1;
                summary.rows.extend(rows);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping image");
                summary.failed.push((path, format!("{:#}", e)));
            }
        }
    }

    write_csv(output, &summary.rows)?;
    tracing::info!(
        output = %output.display(),
        rows = summary.rows.len(),
        failed = summary.failed.len(),
        "Batch analysis finished"
    );

    Ok(summary)
}

async fn analyze_file(predictor: &Predictor, path: &Path, result_dir: &Path) -> anyhow::Result<Vec<LeafRow>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let detected = predictor.detect(Bytes::from(bytes)).await?;

    let (leaves, jpeg) = tokio::task::spawn_blocking(move || {
        let report = lesion::analyze(&detected.detections, &detected.image);
        let jpeg = report.annotated_jpeg(imaging::DEFAULT_JPEG_QUALITY)?;
        Ok::<_, imaging::ImageError>((report.leaves, jpeg))
    })
    .await??;

    let file_name = path.file_name().context("image path has no file name")?;
    tokio::fs::write(result_dir.join(file_name), jpeg).await?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(leaves
        .into_iter()
        .map(|leaf| LeafRow {
            image: stem.clone(),
            leaf_index: leaf.leaf_index,
            tier: leaf.tier,
            lesion_ratio: leaf.lesion_ratio,
            lesion_count: leaf.lesion_count,
            avg_gray_value: leaf.avg_gray_value,
        })
        .collect())
}

/// Writes rows with the fixed header `数据,叶片,病害等级,病斑面积比,病斑数,平均灰度`
///
/// The header is written even when there are no rows.
pub fn write_csv(output: &Path, rows: &[LeafRow]) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    writer.write_record(["数据", "叶片", "病害等级", "病斑面积比", "病斑数", "平均灰度"])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

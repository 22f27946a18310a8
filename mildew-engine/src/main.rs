//! # Mildew CLI
//!
//! Offline tooling around the detection engine.
//!
//! ## Usage
//!
//! ```bash
//! # Grade every leaf in a folder of frogeye photos
//! mildew-cli analyze --input photos/ --output leaf_analysis_results.csv
//!
//! # Register original_*.jpg files in the mock data directory
//! mildew-cli mock setup --dir mock_data
//!
//! # Register one image with a chosen result
//! mildew-cli mock add --original photo.jpg --result annotated.jpg --data boxes.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use mildew_engine::batch::{self, FROGEYE_PARAMS};
use mildew_engine::detector::{registry::build_detector, DetectParams, DetectorBackend, DetectorSettings, ModelPaths};
use mildew_engine::mock_data;
use mildew_shared::models::DetectionKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mildew-cli", version, about = "Mildew detection tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Batch frogeye analysis of a folder, written to CSV
    Analyze {
        /// Folder of images
        #[arg(long)]
        input: PathBuf,

        /// CSV file to write
        #[arg(long, default_value = "leaf_analysis_results.csv")]
        output: PathBuf,

        #[arg(long, default_value_t = FROGEYE_PARAMS.conf)]
        conf: f32,

        #[arg(long, default_value_t = FROGEYE_PARAMS.iou)]
        iou: f32,

        /// mock, remote or onnx
        #[arg(long, env = "DETECTOR_BACKEND", default_value = "mock")]
        backend: DetectorBackend,

        #[arg(long, env = "FROGEYE_MODEL", default_value = "assets/models/frogeye_l_20241109.onnx")]
        model: PathBuf,

        #[arg(long, env = "MOCK_DATA_DIR", default_value = "mock_data")]
        mock_dir: PathBuf,

        #[arg(long, env = "REMOTE_DETECTOR_URL")]
        remote_url: Option<String>,

        /// Per-image inference timeout in seconds
        #[arg(long, env = "INFERENCE_TIMEOUT_SECS", default_value_t = 60)]
        timeout: u64,
    },

    /// Mock data directory management
    Mock {
        #[command(subcommand)]
        action: MockAction,
    },
}

#[derive(Debug, Subcommand)]
enum MockAction {
    /// Rename original_*.jpg to <md5>.jpg and write template data
    Setup {
        #[arg(long, env = "MOCK_DATA_DIR", default_value = "mock_data")]
        dir: PathBuf,
    },

    /// Register one original image with a result image and detection data
    Add {
        #[arg(long, env = "MOCK_DATA_DIR", default_value = "mock_data")]
        dir: PathBuf,

        #[arg(long)]
        original: PathBuf,

        #[arg(long)]
        result: PathBuf,

        /// JSON file with the detections to return
        #[arg(long)]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mildew_engine=info,mildew_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            input,
            output,
            conf,
            iou,
            backend,
            model,
            mock_dir,
            remote_url,
            timeout,
        } => {
            let settings = DetectorSettings {
                backend,
                models: ModelPaths {
                    frogeye: model,
                    ..ModelPaths::default()
                },
                mock_data_dir: mock_dir,
                remote_url,
                timeout: Duration::from_secs(timeout),
            };
            let detector = build_detector(&settings, DetectionKind::Frogeye)?;

            let summary = batch::run_batch(detector, DetectParams::new(conf, iou), &input, &output).await?;
            println!(
                "Processed {} image(s), {} leaf row(s), {} failure(s). Saved to {}",
                summary.processed,
                summary.rows.len(),
                summary.failed.len(),
                output.display()
            );
        }
        Command::Mock { action } => match action {
            MockAction::Setup { dir } => {
                let report = mock_data::setup_mock_data(&dir)?;
                for (from, to) in &report.renamed {
                    println!("Renamed {} -> {}", from, to);
                }
                for created in &report.created {
                    println!("Created {}", created);
                }
                if report.renamed.is_empty() && report.created.is_empty() {
                    println!("Nothing to do in {}", dir.display());
                }
            }
            MockAction::Add {
                dir,
                original,
                result,
                data,
            } => {
                let raw = std::fs::read(&data).with_context(|| format!("Failed to read {}", data.display()))?;
                let value: serde_json::Value =
                    serde_json::from_slice(&raw).with_context(|| format!("{} is not valid JSON", data.display()))?;

                let report = mock_data::add_mock_image(&dir, &original, &result, &value)?;
                println!("Original image hash: {}", report.digest);
                println!("Result image: {}", report.image_path.display());
                println!("Data file: {}", report.data_path.display());
            }
        },
    }

    Ok(())
}

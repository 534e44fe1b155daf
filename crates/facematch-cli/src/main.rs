use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::pipeline::decode_image;
use facematch_core::{Config, FaceSelection, Outcome, Pipeline};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "facematch", about = "Tell whether two photos show the same person")]
struct Cli {
    /// TOML config file (overrides FACEMATCH_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two photos
    Compare {
        /// First photo (JPEG, PNG, ...)
        first: PathBuf,
        /// Second photo
        second: PathBuf,
        /// Cosine distance at or below which the photos match
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Face to use when a photo has several: first, largest, most-confident
        #[arg(short, long)]
        selection: Option<FaceSelection>,
        /// Print a JSON object instead of the message
        #[arg(long)]
        json: bool,
    },
    /// List the faces the detector finds in a photo
    Detect {
        image: PathBuf,
        #[arg(short, long)]
        selection: Option<FaceSelection>,
        #[arg(long)]
        json: bool,
    },
    /// Show configuration and model availability
    Status,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    match cli.command {
        Commands::Compare { first, second, threshold, selection, json } => {
            if let Some(t) = threshold {
                config.threshold = t;
            }
            if let Some(s) = selection {
                config.face_selection = s;
            }
            compare(&config, &first, &second, json)
        }
        Commands::Detect { image, selection, json } => {
            if let Some(s) = selection {
                config.face_selection = s;
            }
            detect(&config, &image, json)
        }
        Commands::Status => {
            status(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn compare(config: &Config, first: &Path, second: &Path, json: bool) -> Result<ExitCode> {
    let pipeline = Pipeline::load(config).context("failed to load models")?;

    tracing::info!(
        first = %first.display(),
        second = %second.display(),
        threshold = pipeline.threshold(),
        selection = %pipeline.selection(),
        "comparing photos"
    );
    let result = pipeline.compare_files(first, second);
    let outcome = Outcome::from_result(&result);

    if json {
        let comparison = result.as_ref().ok();
        println!(
            "{}",
            serde_json::json!({
                "outcome": outcome,
                "message": outcome.message(),
                "distance": comparison.map(|c| c.distance),
                "threshold": pipeline.threshold(),
                "error": result.as_ref().err().map(|e| e.to_string()),
            })
        );
    } else {
        println!("{outcome}");
    }

    Ok(if outcome.is_verdict() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn detect(config: &Config, path: &Path, json: bool) -> Result<ExitCode> {
    let pipeline = Pipeline::load(config).context("failed to load models")?;

    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let image = decode_image(&bytes, 0)?;
    let detection = pipeline.detect(&image)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "width": image.width(),
                "height": image.height(),
                "faces": detection.boxes,
                "selected": detection.selected,
                "selection": pipeline.selection(),
            })
        );
    } else {
        println!(
            "{}: {}x{}, {} face(s)",
            path.display(),
            image.width(),
            image.height(),
            detection.boxes.len()
        );
        for (i, face) in detection.boxes.iter().enumerate() {
            let marker = if Some(*face) == detection.selected { "*" } else { " " };
            println!(
                "{marker} [{i}] x={} y={} w={} h={} confidence={:.3}",
                face.x, face.y, face.width, face.height, face.confidence
            );
        }
    }

    Ok(if detection.selected.is_some() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn status(config: &Config) {
    let detector_path = config.detector_model_path();
    let embedder_path = config.embedder_model_path();

    println!(
        "{}",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "model_dir": config.model_dir,
            "detector_model": detector_path,
            "detector_model_present": Path::new(&detector_path).exists(),
            "embedder_model": embedder_path,
            "embedder_model_present": Path::new(&embedder_path).exists(),
            "embedder_layout": config.embedder_layout,
            "threshold": config.threshold,
            "face_selection": config.face_selection,
            "detection_confidence": config.detection_confidence,
        })
    );
}

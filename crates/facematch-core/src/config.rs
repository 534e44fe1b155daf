use crate::detector::SCRFD_CONFIDENCE_THRESHOLD;
use crate::embedder::TensorLayout;
use crate::matcher::DEFAULT_THRESHOLD;
use crate::types::FaceSelection;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_DETECTOR_MODEL: &str = "det_10g.onnx";
const DEFAULT_EMBEDDER_MODEL: &str = "vggface2_resnet50.onnx";
const DEFAULT_INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Pipeline configuration, loaded from environment variables and an optional TOML file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Detector model file name (or absolute path).
    pub detector_model: String,
    /// Embedder model file name (or absolute path).
    pub embedder_model: String,
    /// Cosine distance threshold for a positive match (inclusive).
    pub threshold: f32,
    /// Which face to keep when several are detected.
    pub face_selection: FaceSelection,
    /// Minimum SCRFD score for a detection to be reported.
    pub detection_confidence: f32,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// Input layout of the exported embedding network.
    pub embedder_layout: TensorLayout,
}

/// Keys accepted in a config file. Missing keys keep the environment/default value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    detector_model: Option<String>,
    embedder_model: Option<String>,
    threshold: Option<f32>,
    face_selection: Option<FaceSelection>,
    detection_confidence: Option<f32>,
    intra_threads: Option<usize>,
    embedder_layout: Option<TensorLayout>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            detector_model: DEFAULT_DETECTOR_MODEL.to_string(),
            embedder_model: DEFAULT_EMBEDDER_MODEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            face_selection: FaceSelection::default(),
            detection_confidence: SCRFD_CONFIDENCE_THRESHOLD,
            intra_threads: DEFAULT_INTRA_THREADS,
            embedder_layout: TensorLayout::default(),
        }
    }
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            model_dir: std::env::var("FACEMATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            detector_model: std::env::var("FACEMATCH_DETECTOR_MODEL")
                .unwrap_or(defaults.detector_model),
            embedder_model: std::env::var("FACEMATCH_EMBEDDER_MODEL")
                .unwrap_or(defaults.embedder_model),
            threshold: env_parse("FACEMATCH_THRESHOLD", defaults.threshold),
            face_selection: env_parse("FACEMATCH_FACE_SELECTION", defaults.face_selection),
            detection_confidence: env_parse(
                "FACEMATCH_DETECTION_CONFIDENCE",
                defaults.detection_confidence,
            ),
            intra_threads: env_parse("FACEMATCH_INTRA_THREADS", defaults.intra_threads),
            embedder_layout: env_parse("FACEMATCH_EMBEDDER_LAYOUT", defaults.embedder_layout),
        }
    }

    /// Load `path` as TOML on top of [`Config::from_env`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_env().merge_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?config, "loaded config file");
        Ok(config)
    }

    fn merge_toml(mut self, text: &str) -> Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;

        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.detector_model {
            self.detector_model = v;
        }
        if let Some(v) = file.embedder_model {
            self.embedder_model = v;
        }
        if let Some(v) = file.threshold {
            self.threshold = v;
        }
        if let Some(v) = file.face_selection {
            self.face_selection = v;
        }
        if let Some(v) = file.detection_confidence {
            self.detection_confidence = v;
        }
        if let Some(v) = file.intra_threads {
            self.intra_threads = v;
        }
        if let Some(v) = file.embedder_layout {
            self.embedder_layout = v;
        }

        Ok(self)
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the VGGFace2 embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join(&self.embedder_model)
            .to_string_lossy()
            .into_owned()
    }
}

/// `$XDG_DATA_HOME/facematch/models`, or `~/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparseable environment value");
            default
        }),
        Err(_) => default,
    }
}

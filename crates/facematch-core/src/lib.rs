//! facematch-core — Two-photo face verification engine.
//!
//! Uses SCRFD for face detection and a VGGFace2 ResNet-50 for face
//! embeddings, both running via ONNX Runtime for CPU inference, and decides
//! "same person" by cosine distance against a fixed threshold.

pub mod config;
pub mod detector;
pub mod embedder;
pub mod extractor;
pub mod matcher;
pub mod outcome;
pub mod pipeline;
pub mod types;

pub use config::{default_model_dir, Config, ConfigError};
pub use detector::{FaceDetect, ScrfdDetector};
pub use embedder::{FaceEmbed, TensorLayout, VggFace2Embedder};
pub use matcher::{CosineMatcher, Matcher};
pub use outcome::Outcome;
pub use pipeline::{Detection, Pipeline, PipelineError};
pub use types::{BoundingBox, Comparison, Embedding, FaceCrop, FaceSelection, Verdict};

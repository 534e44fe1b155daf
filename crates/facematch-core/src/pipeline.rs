//! Two-photo comparison: decode → extract face → embed (batch of 2) → match.

use crate::config::Config;
use crate::detector::{DetectorError, FaceDetect, ScrfdDetector};
use crate::embedder::{EmbedderError, FaceEmbed, VggFace2Embedder};
use crate::extractor::{self, ExtractError};
use crate::matcher::{CosineMatcher, MatchError, Matcher};
use crate::types::{BoundingBox, Comparison, FaceCrop, FaceSelection};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("photo {index} is not a valid image: {source}")]
    InvalidImage {
        index: usize,
        source: image::ImageError,
    },
    #[error("no face detected in photo {index}")]
    NoFaceDetected { index: usize },
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder error: {0}")]
    Inference(#[from] EmbedderError),
    #[error("matcher error: {0}")]
    Match(#[from] MatchError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Detector output for one image, plus the box the selection policy keeps.
#[derive(Debug, Clone)]
pub struct Detection {
    pub boxes: Vec<BoundingBox>,
    pub selected: Option<BoundingBox>,
}

/// Loaded models and matching settings.
///
/// Built once at startup and shared by reference across requests; the model
/// sessions are never re-created per comparison.
pub struct Pipeline {
    detector: Box<dyn FaceDetect>,
    embedder: Box<dyn FaceEmbed>,
    matcher: CosineMatcher,
    selection: FaceSelection,
}

impl Pipeline {
    pub fn new(
        detector: Box<dyn FaceDetect>,
        embedder: Box<dyn FaceEmbed>,
        threshold: f32,
        selection: FaceSelection,
    ) -> Self {
        Self {
            detector,
            embedder,
            matcher: CosineMatcher::new(threshold),
            selection,
        }
    }

    /// Load both ONNX models named by `config`. Fails fast if either is missing.
    pub fn load(config: &Config) -> Result<Self, PipelineError> {
        let detector = ScrfdDetector::load(
            &config.detector_model_path(),
            config.intra_threads,
            config.detection_confidence,
        )?;
        let embedder = VggFace2Embedder::load(
            &config.embedder_model_path(),
            config.intra_threads,
            config.embedder_layout,
        )?;

        Ok(Self::new(
            Box::new(detector),
            Box::new(embedder),
            config.threshold,
            config.face_selection,
        ))
    }

    pub fn threshold(&self) -> f32 {
        self.matcher.threshold
    }

    pub fn selection(&self) -> FaceSelection {
        self.selection
    }

    /// Compare two photos given as encoded image bytes (JPEG, PNG, ...).
    pub fn compare_bytes(&self, first: &[u8], second: &[u8]) -> Result<Comparison, PipelineError> {
        let first = decode_image(first, 0)?;
        let second = decode_image(second, 1)?;
        self.compare_images(&first, &second)
    }

    /// Compare two photos read from disk.
    pub fn compare_files(&self, first: &Path, second: &Path) -> Result<Comparison, PipelineError> {
        let first = read_file(first)?;
        let second = read_file(second)?;
        self.compare_bytes(&first, &second)
    }

    /// Compare two decoded photos.
    pub fn compare_images(
        &self,
        first: &RgbImage,
        second: &RgbImage,
    ) -> Result<Comparison, PipelineError> {
        let crops = [self.extract(first, 0)?, self.extract(second, 1)?];

        let embeddings = self.embedder.embed(&crops)?;
        let [a, b] = embeddings.as_slice() else {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected 2 embeddings, got {}",
                embeddings.len()
            ))
            .into());
        };

        let comparison = self.matcher.compare(a, b)?;
        tracing::debug!(
            distance = comparison.distance,
            threshold = comparison.threshold,
            verdict = ?comparison.verdict,
            "photos compared"
        );
        Ok(comparison)
    }

    /// Run only the detector, for diagnostics.
    pub fn detect(&self, image: &RgbImage) -> Result<Detection, PipelineError> {
        let boxes = self.detector.detect(image)?;
        let selected = self.selection.select(&boxes).copied();
        Ok(Detection { boxes, selected })
    }

    fn extract(&self, image: &RgbImage, index: usize) -> Result<FaceCrop, PipelineError> {
        extractor::extract(self.detector.as_ref(), image, self.selection).map_err(|e| match e {
            ExtractError::NoFaceDetected => PipelineError::NoFaceDetected { index },
            ExtractError::Detector(e) => PipelineError::Detector(e),
        })
    }
}

/// Decode any format the `image` crate recognizes into RGB8.
pub fn decode_image(bytes: &[u8], index: usize) -> Result<RgbImage, PipelineError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|source| PipelineError::InvalidImage { index, source })
}

fn read_file(path: &Path) -> Result<Vec<u8>, PipelineError> {
    std::fs::read(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Embedding, Verdict};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Reports one full-image face unless the image is entirely black.
    struct NonBlackDetector;

    impl FaceDetect for NonBlackDetector {
        fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            if image.pixels().all(|p| p.0 == [0, 0, 0]) {
                return Ok(Vec::new());
            }
            Ok(vec![BoundingBox {
                x: 0,
                y: 0,
                width: image.width() as i32,
                height: image.height() as i32,
                confidence: 0.9,
            }])
        }
    }

    /// Embeds the crop's mean color, counting calls.
    struct MeanColorEmbedder {
        calls: Arc<AtomicUsize>,
    }

    impl FaceEmbed for MeanColorEmbedder {
        fn embed(&self, crops: &[FaceCrop]) -> Result<Vec<Embedding>, EmbedderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crops
                .iter()
                .map(|crop| {
                    let mut sum = [0.0f32; 3];
                    for p in crop.pixels().pixels() {
                        for c in 0..3 {
                            sum[c] += p[c] as f32;
                        }
                    }
                    Embedding::new(sum.to_vec())
                })
                .collect())
        }
    }

    /// Returns a single embedding whatever the batch size.
    struct ShortEmbedder;

    impl FaceEmbed for ShortEmbedder {
        fn embed(&self, _crops: &[FaceCrop]) -> Result<Vec<Embedding>, EmbedderError> {
            Ok(vec![Embedding::new(vec![1.0])])
        }
    }

    fn pipeline() -> (Pipeline, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            Box::new(NonBlackDetector),
            Box::new(MeanColorEmbedder { calls: calls.clone() }),
            0.5,
            FaceSelection::First,
        );
        (pipeline, calls)
    }

    fn solid(rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(32, 32, image::Rgb(rgb))
    }

    #[test]
    fn test_pipeline_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }

    #[test]
    fn test_same_color_matches() {
        let (pipeline, calls) = pipeline();
        let result = pipeline.compare_images(&solid([200, 40, 40]), &solid([180, 30, 35])).unwrap();
        assert_eq!(result.verdict, Verdict::SamePerson);
        // both crops go through a single batched call
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_colors_do_not_match() {
        let (pipeline, _) = pipeline();
        let result = pipeline.compare_images(&solid([255, 0, 0]), &solid([0, 0, 255])).unwrap();
        assert_eq!(result.verdict, Verdict::DifferentPersons);
        assert!((result.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_face_reports_index() {
        let (pipeline, calls) = pipeline();
        let err = pipeline.compare_images(&solid([10, 10, 10]), &solid([0, 0, 0])).unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected { index: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_bytes() {
        let (pipeline, _) = pipeline();
        let err = pipeline.compare_bytes(b"not an image", b"also not").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage { index: 0, .. }));
    }

    #[test]
    fn test_short_embedder_output_is_inference_error() {
        let pipeline = Pipeline::new(
            Box::new(NonBlackDetector),
            Box::new(ShortEmbedder),
            0.5,
            FaceSelection::First,
        );
        let err = pipeline.compare_images(&solid([1, 2, 3]), &solid([1, 2, 3])).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(EmbedderError::InferenceFailed(_))));
    }

    #[test]
    fn test_missing_file() {
        let (pipeline, _) = pipeline();
        let err = pipeline
            .compare_files(Path::new("/nonexistent/a.jpg"), Path::new("/nonexistent/b.jpg"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn test_detect_reports_selection() {
        let (pipeline, _) = pipeline();
        let detection = pipeline.detect(&solid([9, 9, 9])).unwrap();
        assert_eq!(detection.boxes.len(), 1);
        assert_eq!(detection.selected, Some(detection.boxes[0]));

        let empty = pipeline.detect(&solid([0, 0, 0])).unwrap();
        assert!(empty.boxes.is_empty());
        assert!(empty.selected.is_none());
    }

    #[test]
    fn test_load_missing_models() {
        let config = Config {
            model_dir: PathBuf::from("/nonexistent/facematch"),
            ..Config::default()
        };
        let err = Pipeline::load(&config).err().unwrap();
        assert!(matches!(err, PipelineError::Detector(DetectorError::ModelNotFound(_))));
    }
}

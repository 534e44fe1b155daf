//! VGGFace2 ResNet-50 face embedder via ONNX Runtime.
//!
//! Produces 2048-dimensional identity embeddings from 224x224 face crops,
//! using a ResNet-50 trained on VGGFace2 exported without its classification
//! head and with global average pooling.

use crate::types::{Embedding, FaceCrop, FACE_CROP_SIZE};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// --- Named constants (different from SCRFD!) ---
const VGGFACE2_INPUT_SIZE: usize = FACE_CROP_SIZE as usize;
/// Per-channel means subtracted in BGR order (VGGFace2 "version 2" preprocessing).
const VGGFACE2_MEAN_BGR: [f32; 3] = [91.4953, 103.8827, 131.0912];
pub const VGGFACE2_EMBEDDING_DIM: usize = 2048;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — export the VGGFace2 ResNet-50 (no top, avg pooling) to ONNX and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty batch")]
    EmptyBatch,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Pluggable embedding backend.
///
/// Implementations return exactly one embedding per crop, in input order.
pub trait FaceEmbed: Send + Sync {
    fn embed(&self, crops: &[FaceCrop]) -> Result<Vec<Embedding>, EmbedderError>;
}

/// Memory layout the exported network expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// Batch × height × width × channels (Keras export).
    #[default]
    Nhwc,
    /// Batch × channels × height × width.
    Nchw,
}

impl std::str::FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout {other:?} (expected nhwc or nchw)")),
        }
    }
}

/// VGGFace2-based face embedder.
pub struct VggFace2Embedder {
    session: Mutex<Session>,
    layout: TensorLayout,
}

impl VggFace2Embedder {
    /// Load the VGGFace2 ONNX model from the given path.
    pub fn load(
        model_path: &str,
        intra_threads: usize,
        layout: TensorLayout,
    ) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            ?layout,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded VGGFace2 model"
        );

        Ok(Self {
            session: Mutex::new(session),
            layout,
        })
    }

    /// Convert a batch of crops into a float tensor: RGB → BGR, mean-subtracted.
    fn preprocess(crops: &[FaceCrop], layout: TensorLayout) -> Array4<f32> {
        let size = VGGFACE2_INPUT_SIZE;
        let n = crops.len();
        let mut tensor = match layout {
            TensorLayout::Nhwc => Array4::<f32>::zeros((n, size, size, 3)),
            TensorLayout::Nchw => Array4::<f32>::zeros((n, 3, size, size)),
        };

        for (i, crop) in crops.iter().enumerate() {
            for (x, y, pixel) in crop.pixels().enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                for (c, mean) in VGGFACE2_MEAN_BGR.iter().enumerate() {
                    // channel c of BGR is channel 2 - c of RGB
                    let value = pixel[2 - c] as f32 - mean;
                    match layout {
                        TensorLayout::Nhwc => tensor[[i, y, x, c]] = value,
                        TensorLayout::Nchw => tensor[[i, c, y, x]] = value,
                    }
                }
            }
        }

        tensor
    }
}

impl FaceEmbed for VggFace2Embedder {
    fn embed(&self, crops: &[FaceCrop]) -> Result<Vec<Embedding>, EmbedderError> {
        if crops.is_empty() {
            return Err(EmbedderError::EmptyBatch);
        }

        let input = Self::preprocess(crops, self.layout);

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let embeddings = split_batch(raw, crops.len(), VGGFACE2_EMBEDDING_DIM)?;
        tracing::debug!(batch = crops.len(), dim = VGGFACE2_EMBEDDING_DIM, "embedded face batch");
        Ok(embeddings)
    }
}

/// Split a flat `[batch, dim]` output into one embedding per row, in order.
fn split_batch(raw: &[f32], batch: usize, dim: usize) -> Result<Vec<Embedding>, EmbedderError> {
    if raw.len() != batch * dim {
        return Err(EmbedderError::InferenceFailed(format!(
            "expected {batch}x{dim} embedding output, got {} values",
            raw.len()
        )));
    }

    Ok(raw
        .chunks_exact(dim)
        .map(|row| Embedding::new(row.to_vec()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid_crop(rgb: [u8; 3]) -> FaceCrop {
        FaceCrop::new(RgbImage::from_pixel(FACE_CROP_SIZE, FACE_CROP_SIZE, Rgb(rgb))).unwrap()
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crops = [solid_crop([0, 0, 0]), solid_crop([0, 0, 0])];
        let nhwc = VggFace2Embedder::preprocess(&crops, TensorLayout::Nhwc);
        assert_eq!(nhwc.shape(), &[2, VGGFACE2_INPUT_SIZE, VGGFACE2_INPUT_SIZE, 3]);
        let nchw = VggFace2Embedder::preprocess(&crops, TensorLayout::Nchw);
        assert_eq!(nchw.shape(), &[2, 3, VGGFACE2_INPUT_SIZE, VGGFACE2_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_bgr_mean_subtraction() {
        let crops = [solid_crop([200, 100, 50])];
        let tensor = VggFace2Embedder::preprocess(&crops, TensorLayout::Nhwc);
        // B, G, R after mean subtraction
        let expected = [50.0 - 91.4953, 100.0 - 103.8827, 200.0 - 131.0912];
        for (c, want) in expected.iter().enumerate() {
            let got = tensor[[0, 10, 20, c]];
            assert!((got - want).abs() < 1e-4, "channel {c}: got {got}, expected {want}");
        }
    }

    #[test]
    fn test_preprocess_layouts_agree() {
        let crops = [solid_crop([10, 20, 30]), solid_crop([40, 50, 60])];
        let nhwc = VggFace2Embedder::preprocess(&crops, TensorLayout::Nhwc);
        let nchw = VggFace2Embedder::preprocess(&crops, TensorLayout::Nchw);
        for i in 0..2 {
            for c in 0..3 {
                assert_eq!(nhwc[[i, 5, 7, c]], nchw[[i, c, 5, 7]]);
            }
        }
    }

    #[test]
    fn test_preprocess_keeps_batch_order() {
        let crops = [solid_crop([0, 0, 0]), solid_crop([255, 255, 255])];
        let tensor = VggFace2Embedder::preprocess(&crops, TensorLayout::Nhwc);
        assert!(tensor[[0, 0, 0, 2]] < 0.0);
        assert!(tensor[[1, 0, 0, 2]] > 0.0);
    }

    #[test]
    fn test_split_batch_preserves_order() {
        let raw = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rows = split_batch(&raw, 2, 3).unwrap();
        assert_eq!(rows[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(rows[1].values, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_split_batch_rejects_wrong_size() {
        let raw = [0.0f32; 10];
        let err = split_batch(&raw, 2, VGGFACE2_EMBEDDING_DIM).unwrap_err();
        assert!(matches!(err, EmbedderError::InferenceFailed(_)));
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("NHWC".parse::<TensorLayout>(), Ok(TensorLayout::Nhwc));
        assert_eq!("nchw".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
        assert!("chw".parse::<TensorLayout>().is_err());
    }
}

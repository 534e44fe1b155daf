use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Side length of the square crop fed to the embedding network.
pub const FACE_CROP_SIZE: u32 = 224;

/// Bounding box for a detected face, in whole pixels of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Bottom-right corner `(x + width, y + height)`, saturating at the i32 range.
    pub fn corner(&self) -> (i32, i32) {
        (self.x.saturating_add(self.width), self.y.saturating_add(self.height))
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }
}

/// A 224x224 RGB face crop ready for the embedder.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pixels: RgbImage,
}

impl FaceCrop {
    /// Wrap an already resized crop. Returns `None` unless the image is exactly
    /// [`FACE_CROP_SIZE`] on both sides.
    pub fn new(pixels: RgbImage) -> Option<Self> {
        (pixels.width() == FACE_CROP_SIZE && pixels.height() == FACE_CROP_SIZE)
            .then_some(Self { pixels })
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Face embedding vector (2048-dimensional for VGGFace2 ResNet-50).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Which detection to keep when the detector reports more than one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaceSelection {
    /// The first box in detector order, whatever that order is.
    #[default]
    First,
    /// The box with the largest area.
    Largest,
    /// The box with the highest detector confidence.
    MostConfident,
}

impl FaceSelection {
    /// Pick one box from the detector output. `None` only for an empty slice.
    pub fn select<'a>(&self, boxes: &'a [BoundingBox]) -> Option<&'a BoundingBox> {
        match self {
            FaceSelection::First => boxes.first(),
            // max_by_key keeps the last maximum; iterate in reverse so ties go to the earliest box
            FaceSelection::Largest => boxes.iter().rev().max_by_key(|b| b.area()),
            FaceSelection::MostConfident => boxes.iter().rev().max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaceSelection::First => "first",
            FaceSelection::Largest => "largest",
            FaceSelection::MostConfident => "most-confident",
        }
    }
}

impl std::str::FromStr for FaceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(FaceSelection::First),
            "largest" => Ok(FaceSelection::Largest),
            "most-confident" | "confident" => Ok(FaceSelection::MostConfident),
            other => Err(format!(
                "unknown face selection policy {other:?} (expected first, largest or most-confident)"
            )),
        }
    }
}

impl std::fmt::Display for FaceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Same-person decision for one pair of photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    SamePerson,
    DifferentPersons,
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::SamePerson)
    }
}

/// Result of comparing two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub verdict: Verdict,
    /// Cosine distance in [0, 2]. Lower = more similar.
    pub distance: f32,
    pub threshold: f32,
}

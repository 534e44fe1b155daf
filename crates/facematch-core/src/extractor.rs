//! Single-face extraction: detect, pick one box, crop, resize to 224x224.

use crate::detector::{DetectorError, FaceDetect};
use crate::types::{BoundingBox, FaceCrop, FaceSelection, FACE_CROP_SIZE};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Pixel rectangle inside an image, after clamping a detector box to its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Clamp `face` to the image and return the `[x, x2) × [y, y2)` slice it covers,
/// or `None` if nothing is left.
pub fn crop_region(face: &BoundingBox, image_width: u32, image_height: u32) -> Option<CropRegion> {
    let (x2, y2) = face.corner();
    let clamp_x = |v: i32| v.clamp(0, image_width as i32) as u32;
    let clamp_y = |v: i32| v.clamp(0, image_height as i32) as u32;

    let (x1, x2) = (clamp_x(face.x), clamp_x(x2));
    let (y1, y2) = (clamp_y(face.y), clamp_y(y2));

    (x2 > x1 && y2 > y1).then_some(CropRegion {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    })
}

/// Cut `face` out of `image` and resize it to the embedder input size.
pub fn crop_face(image: &RgbImage, face: &BoundingBox) -> Option<FaceCrop> {
    let region = crop_region(face, image.width(), image.height())?;
    let slice = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
    let resized = imageops::resize(&slice, FACE_CROP_SIZE, FACE_CROP_SIZE, FilterType::CatmullRom);
    FaceCrop::new(resized)
}

/// Locate one face in `image` and return its 224x224 crop.
///
/// Fails with [`ExtractError::NoFaceDetected`] when the detector finds nothing
/// or the chosen box lies entirely outside the image.
pub fn extract(
    detector: &dyn FaceDetect,
    image: &RgbImage,
    selection: FaceSelection,
) -> Result<FaceCrop, ExtractError> {
    let boxes = detector.detect(image)?;
    let face = selection.select(&boxes).ok_or(ExtractError::NoFaceDetected)?;

    tracing::debug!(
        candidates = boxes.len(),
        policy = %selection,
        x = face.x,
        y = face.y,
        width = face.width,
        height = face.height,
        confidence = face.confidence,
        "face selected"
    );

    crop_face(image, face).ok_or_else(|| {
        tracing::warn!(?face, "selected face box lies outside the image");
        ExtractError::NoFaceDetected
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetect for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn bbox(x: i32, y: i32, w: i32, h: i32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    /// Left half red, right half blue.
    fn two_tone(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
        })
    }

    #[test]
    fn test_crop_region_inside() {
        let region = crop_region(&bbox(10, 20, 30, 40), 100, 100).unwrap();
        assert_eq!(region, CropRegion { x: 10, y: 20, width: 30, height: 40 });
    }

    #[test]
    fn test_crop_region_clamps_negative_origin() {
        let region = crop_region(&bbox(-5, -10, 30, 40), 100, 100).unwrap();
        assert_eq!(region, CropRegion { x: 0, y: 0, width: 25, height: 30 });
    }

    #[test]
    fn test_crop_region_clamps_overflow() {
        let region = crop_region(&bbox(90, 95, 30, 40), 100, 100).unwrap();
        assert_eq!(region, CropRegion { x: 90, y: 95, width: 10, height: 5 });
    }

    #[test]
    fn test_crop_region_extreme_box() {
        let region = crop_region(&bbox(50, 60, i32::MAX, i32::MAX), 100, 100).unwrap();
        assert_eq!(region, CropRegion { x: 50, y: 60, width: 50, height: 40 });
    }

    #[test]
    fn test_crop_region_outside() {
        assert!(crop_region(&bbox(120, 0, 30, 40), 100, 100).is_none());
        assert!(crop_region(&bbox(10, 10, 0, 40), 100, 100).is_none());
    }

    #[test]
    fn test_extract_resizes_to_crop_size() {
        let image = two_tone(200, 100);
        let detector = FixedDetector(vec![bbox(0, 0, 50, 50)]);
        let crop = extract(&detector, &image, FaceSelection::First).unwrap();
        assert_eq!(crop.pixels().dimensions(), (FACE_CROP_SIZE, FACE_CROP_SIZE));
        assert_eq!(crop.pixels().get_pixel(112, 112), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_extract_uses_selection_policy() {
        let image = two_tone(200, 100);
        // first box is in the red half, the larger one in the blue half
        let detector = FixedDetector(vec![bbox(0, 0, 20, 20), bbox(120, 10, 60, 60)]);

        let first = extract(&detector, &image, FaceSelection::First).unwrap();
        assert_eq!(first.pixels().get_pixel(0, 0), &Rgb([255, 0, 0]));

        let largest = extract(&detector, &image, FaceSelection::Largest).unwrap();
        assert_eq!(largest.pixels().get_pixel(0, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_extract_no_face() {
        let image = two_tone(64, 64);
        let detector = FixedDetector(Vec::new());
        let err = extract(&detector, &image, FaceSelection::First).unwrap_err();
        assert!(matches!(err, ExtractError::NoFaceDetected));
    }

    #[test]
    fn test_extract_box_outside_image() {
        let image = two_tone(64, 64);
        let detector = FixedDetector(vec![bbox(100, 100, 20, 20)]);
        let err = extract(&detector, &image, FaceSelection::First).unwrap_err();
        assert!(matches!(err, ExtractError::NoFaceDetected));
    }
}

//! Image redaction and filing
//!
//! Makes the plate region unreadable in every image that leaves the
//! pipeline: crop the detected box, blur it beyond stroke recovery, paste it
//! back in place. Everything outside the box stays pixel-identical. The
//! anonymized copy is written before the original is deleted, so a crash
//! between the two never loses the only copy.

use crate::services::gateway::BoundingBox;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImage, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Gaussian sigma for the plate blur. Generous relative to plate glyph
/// stroke width at gateway-resized resolution.
const BLUR_SIGMA: f32 = 6.0;

/// Maximum dimensions sent to the recognition gateway
const MAX_WIDTH: u32 = 1980;
const MAX_HEIGHT: u32 = 1080;

/// Redaction and filing errors (per-photo, never batch-fatal)
#[derive(Debug, Error)]
pub enum RedactionError {
    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Empty bounding box ({0},{1})-({2},{3})")]
    EmptyBox(u32, u32, u32, u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load an image from disk and downscale it to fit the gateway limits,
/// preserving aspect ratio and never upscaling. The resized image is both
/// the recognition input and the redaction target, so the returned bounding
/// box coordinates line up.
pub fn load_and_resize(path: &Path) -> Result<RgbImage, RedactionError> {
    let img = image::open(path).map_err(|e| RedactionError::Decode(e.to_string()))?;

    let resized = if img.width() > MAX_WIDTH || img.height() > MAX_HEIGHT {
        img.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3)
    } else {
        img
    };

    Ok(resized.to_rgb8())
}

/// Encode an image as base64 JPEG for gateway transport
pub fn encode_jpeg_base64(image: &RgbImage) -> Result<String, RedactionError> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
        .map_err(|e| RedactionError::Encode(e.to_string()))?;
    Ok(BASE64.encode(buffer))
}

/// Destructively blur the plate region.
///
/// Pixels strictly outside the (clamped) box are bit-identical to the input.
pub fn redact(image: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage, RedactionError> {
    let xmin = bbox.xmin.min(image.width());
    let ymin = bbox.ymin.min(image.height());
    let xmax = bbox.xmax.min(image.width());
    let ymax = bbox.ymax.min(image.height());

    if xmax <= xmin || ymax <= ymin {
        return Err(RedactionError::EmptyBox(
            bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax,
        ));
    }

    let patch = image::imageops::crop_imm(image, xmin, ymin, xmax - xmin, ymax - ymin).to_image();
    let blurred = image::imageops::blur(&patch, BLUR_SIGMA);

    let mut output = image.clone();
    output
        .copy_from(&blurred, xmin, ymin)
        .map_err(|e| RedactionError::Encode(e.to_string()))?;

    Ok(output)
}

/// Write the anonymized image to its per-vehicle location and delete the
/// original.
///
/// Path is deterministic and collision-free:
/// `<output_root>/<vehicle_id>/<vehicle_id>_<photo_id>_<YYYYMMDD_HHMMSS>.jpg`.
/// The original is removed only after the copy is durably written.
pub fn organize(
    image: &RgbImage,
    original_path: &Path,
    output_root: &Path,
    vehicle_id: Uuid,
    photo_id: Uuid,
    captured_at: DateTime<Utc>,
) -> Result<PathBuf, RedactionError> {
    let vehicle_dir = output_root.join(vehicle_id.to_string());
    std::fs::create_dir_all(&vehicle_dir)?;

    let filename = format!(
        "{}_{}_{}.jpg",
        vehicle_id,
        photo_id,
        captured_at.format("%Y%m%d_%H%M%S")
    );
    let destination = vehicle_dir.join(filename);

    image
        .save(&destination)
        .map_err(|e| RedactionError::Encode(e.to_string()))?;

    // Flush the replacement to disk before the original goes away
    let file = std::fs::File::open(&destination)?;
    file.sync_all()?;

    std::fs::remove_file(original_path)?;

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Image with a deterministic gradient so blurring visibly changes it
    fn test_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn bbox(xmin: u32, ymin: u32, xmax: u32, ymax: u32) -> BoundingBox {
        BoundingBox { xmin, ymin, xmax, ymax }
    }

    #[test]
    fn test_redaction_locality() {
        let image = test_image(120, 80);
        let region = bbox(30, 20, 70, 40);
        let redacted = redact(&image, &region).unwrap();

        let mut inside_changed = 0u32;
        for (x, y, pixel) in image.enumerate_pixels() {
            let after = redacted.get_pixel(x, y);
            let inside = (30..70).contains(&x) && (20..40).contains(&y);
            if inside {
                if after != pixel {
                    inside_changed += 1;
                }
            } else {
                assert_eq!(after, pixel, "pixel outside the box changed at ({x},{y})");
            }
        }

        // The blur is non-trivial: most of the box differs from the input
        assert!(inside_changed > (40 * 20) / 2, "only {} pixels changed", inside_changed);
    }

    #[test]
    fn test_box_clamped_to_image_bounds() {
        let image = test_image(50, 40);
        let redacted = redact(&image, &bbox(30, 20, 500, 400)).unwrap();
        assert_eq!(redacted.dimensions(), (50, 40));
    }

    #[test]
    fn test_empty_box_rejected() {
        let image = test_image(50, 40);
        assert!(matches!(
            redact(&image, &bbox(10, 10, 10, 30)),
            Err(RedactionError::EmptyBox(..))
        ));
    }

    #[test]
    fn test_organize_writes_then_deletes_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("incoming.jpg");
        let image = test_image(60, 40);
        image.save(&original).unwrap();

        let output_root = dir.path().join("sorted");
        let vehicle_id = Uuid::new_v4();
        let photo_id = Uuid::new_v4();
        let captured_at = DateTime::parse_from_rfc3339("2024-07-15T14:30:02Z")
            .unwrap()
            .with_timezone(&Utc);

        let destination = organize(
            &image,
            &original,
            &output_root,
            vehicle_id,
            photo_id,
            captured_at,
        )
        .unwrap();

        assert_eq!(
            destination,
            output_root
                .join(vehicle_id.to_string())
                .join(format!("{}_{}_20240715_143002.jpg", vehicle_id, photo_id))
        );
        assert!(destination.exists());
        assert!(!original.exists(), "original must be deleted after filing");
    }

    #[test]
    fn test_load_and_resize_never_upscales() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        test_image(64, 48).save(&path).unwrap();

        let loaded = load_and_resize(&path).unwrap();
        assert_eq!(loaded.dimensions(), (64, 48));
    }

    #[test]
    fn test_load_and_resize_fits_large_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.png");
        test_image(3960, 1600).save(&path).unwrap();

        let loaded = load_and_resize(&path).unwrap();
        assert!(loaded.width() <= 1980 && loaded.height() <= 1080);
        // Aspect ratio preserved
        let ratio_before = 3960.0 / 1600.0;
        let ratio_after = loaded.width() as f64 / loaded.height() as f64;
        assert!((ratio_before - ratio_after).abs() < 0.01);
    }
}

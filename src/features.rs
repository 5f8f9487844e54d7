//! Fixed-canvas feature extraction for hand-drawn samples.
//!
//! Every input, whatever its size or aspect ratio, is composited over a white
//! background, reduced to luma and resized to exactly `CANVAS_WIDTH x CANVAS_HEIGHT`
//! before flattening. The classifiers rely on the constant vector length, so the
//! resize deliberately ignores the source aspect ratio.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::error::{EngineError, EngineResult};

/// Canvas width in pixels.
pub const CANVAS_WIDTH: u32 = 100;
/// Canvas height in pixels.
pub const CANVAS_HEIGHT: u32 = 100;
/// Number of `f32` values in a feature vector.
pub const FEATURE_LEN: usize = (CANVAS_WIDTH * CANVAS_HEIGHT) as usize;

/// Flattened intensity values in `[0, 1]`, row-major, always `FEATURE_LEN` long.
pub type FeatureVector = Vec<f32>;

/// Decode raw image bytes or a `data:image/...;base64,` URL and normalize it.
pub fn normalize(bytes: &[u8]) -> EngineResult<FeatureVector> {
    let image = decode_image(bytes)?;
    Ok(normalize_image(&image))
}

/// Normalize an already decoded image.
pub fn normalize_image(image: &DynamicImage) -> FeatureVector {
    flatten(&canvas(image))
}

/// Decode image bytes, accepting both raw encoded images and base64 data URLs.
pub fn decode_image(bytes: &[u8]) -> EngineResult<DynamicImage> {
    let payload = decode_payload(bytes)?;
    image::load_from_memory(&payload).map_err(|err| EngineError::SampleDecode(err.to_string()))
}

/// Strip a `data:<mime>;base64,` header and decode the body; other input is returned as-is.
pub fn decode_payload(bytes: &[u8]) -> EngineResult<Vec<u8>> {
    if !bytes.starts_with(b"data:") {
        return Ok(bytes.to_vec());
    }
    let comma = bytes
        .iter()
        .position(|&b| b == b',')
        .ok_or_else(|| EngineError::SampleDecode("data URL without payload".to_string()))?;
    let header = &bytes[..comma];
    if !header.ends_with(b";base64") {
        return Err(EngineError::SampleDecode(
            "only base64 data URLs are supported".to_string(),
        ));
    }
    let body: Vec<u8> = bytes[comma + 1..]
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(body)
        .map_err(|err| EngineError::SampleDecode(err.to_string()))
}

/// Render the canonical stored form of a sample: a 100x100 8-bit grayscale PNG.
///
/// Normalizing the returned bytes yields the same vector as normalizing `image`.
pub fn canonical_png(image: &DynamicImage) -> EngineResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(canvas(image))
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| EngineError::SampleDecode(err.to_string()))?;
    Ok(out.into_inner())
}

fn canvas(image: &DynamicImage) -> GrayImage {
    let gray = over_white(image);
    if gray.dimensions() == (CANVAS_WIDTH, CANVAS_HEIGHT) {
        return gray;
    }
    imageops::resize(&gray, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Lanczos3)
}

/// Luma with transparent pixels blended onto white, as they appear on a drawing canvas.
fn over_white(image: &DynamicImage) -> GrayImage {
    if !image.color().has_alpha() {
        return image.to_luma8();
    }
    let luma_alpha = image.to_luma_alpha8();
    let (width, height) = luma_alpha.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let [l, a] = luma_alpha.get_pixel(x, y).0;
        let (l, a) = (u32::from(l), u32::from(a));
        let blended = (l * a + 255 * (255 - a) + 127) / 255;
        Luma([blended as u8])
    })
}

fn flatten(gray: &GrayImage) -> FeatureVector {
    gray.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(image: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn striped(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 7 == 0 {
                Rgb([10, 20, 30])
            } else {
                Rgb([250, 240, 230])
            }
        }))
    }

    #[test]
    fn always_produces_fixed_length() {
        for (w, h) in [(100, 100), (40, 160), (300, 20), (1, 1), (257, 257)] {
            let vector = normalize(&encode(striped(w, h))).unwrap();
            assert_eq!(vector.len(), FEATURE_LEN, "{w}x{h}");
            assert!(vector.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn normalization_is_deterministic() {
        let bytes = encode(striped(123, 77));
        assert_eq!(normalize(&bytes).unwrap(), normalize(&bytes).unwrap());
    }

    #[test]
    fn canonical_png_preserves_features() {
        let image = striped(64, 180);
        let stored = canonical_png(&image).unwrap();
        let reloaded = image::load_from_memory(&stored).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(normalize(&stored).unwrap(), normalize_image(&image));
    }

    #[test]
    fn transparent_pixels_read_as_white() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0])));
        let vector = normalize_image(&image);
        assert!(vector.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn accepts_base64_data_urls() {
        let bytes = encode(striped(30, 30));
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
        assert_eq!(
            normalize(url.as_bytes()).unwrap(),
            normalize(&bytes).unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        let err = normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, EngineError::SampleDecode(_)));
        let err = normalize(b"data:image/png,abc").unwrap_err();
        assert!(matches!(err, EngineError::SampleDecode(_)));
    }
}

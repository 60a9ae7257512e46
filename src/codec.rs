//! Tile and thumbnail image codec helpers shared by the producer and
//! assembler.

use image::{DynamicImage, GrayImage};

use crate::error::CoreError;

/// Decode arbitrary encoded bytes into an 8-bit grayscale buffer. No pixel
/// ceiling is imposed beyond the underlying decoder's own limits, since
/// slices up to 10⁹ pixels must be permitted.
pub fn decode_gray(bytes: &[u8]) -> Result<GrayImage, CoreError> {
    let dynamic = image::load_from_memory(bytes).map_err(|e| CoreError::decode("decoding slice", e))?;
    Ok(dynamic.to_luma8())
}

/// Encode a grayscale buffer as a lossless PNG.
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| CoreError::ComputeFailure(format!("encoding PNG: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn round_trips_through_png() {
        let mut img = GrayImage::new(16, 16);
        for (i, p) in img.pixels_mut().enumerate() {
            *p = Luma([(i % 256) as u8]);
        }
        let bytes = encode_png(&img).unwrap();
        let decoded = decode_gray(&bytes).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn garbage_bytes_are_a_decode_failure() {
        let err = decode_gray(b"not an image").unwrap_err();
        assert!(matches!(err, CoreError::DecodeFailure { .. }));
    }
}

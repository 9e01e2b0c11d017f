//! Upload decoding

use std::io::Cursor;

use image::{ImageReader, Limits};
use tracing::debug;
use upload_validator::{ValidationConfig, Validator};

use crate::{DecodedBitmap, ImageProcessingError};

/// Largest accepted edge in pixels; guards against decompression bombs
const MAX_DIMENSION: u32 = 16_384;

/// Decoder for uploaded images
///
/// Validation runs on the declared filename and the raw byte length before any
/// decoding work is done. The payload format itself is sniffed from content.
#[derive(Debug, Clone, Default)]
pub struct ImageDecoder {
    validator: Validator,
}

impl ImageDecoder {
    /// Create a decoder with the given validation rules
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            validator: Validator::new(config),
        }
    }

    /// Validation rules applied before decoding
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate the upload, then decode `bytes` into an RGB bitmap
    pub fn decode(&self, bytes: &[u8], filename: &str) -> Result<DecodedBitmap, ImageProcessingError> {
        self.validator.validate_filename(filename)?;
        self.validator.validate_size(bytes.len())?;
        self.decode_bytes(bytes)
    }

    /// Decode a payload that already passed [`ImageDecoder::validator`]
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodedBitmap, ImageProcessingError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageProcessingError::Decode(e.to_string()))?;

        let source_format = reader.format();
        if source_format.is_none() {
            return Err(ImageProcessingError::Decode(
                "unrecognized image format".to_string(),
            ));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_DIMENSION);
        limits.max_image_height = Some(MAX_DIMENSION);
        reader.limits(limits);

        let image = reader
            .decode()
            .map_err(|e| ImageProcessingError::Decode(e.to_string()))?;

        debug!(
            "Decoded {} bytes ({:?}, {:?}, {}x{})",
            bytes.len(),
            source_format,
            image.color(),
            image.width(),
            image.height()
        );

        // Grayscale, alpha and palette sources all collapse to RGB8 here
        Ok(DecodedBitmap::new(image.to_rgb8(), source_format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use upload_validator::ValidationError;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn rgb_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn test_decode_png() {
        let decoder = ImageDecoder::default();
        let bitmap = decoder.decode(&rgb_png(32, 16), "leaf.png").unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (32, 16));
        assert_eq!(bitmap.get_pixel(5, 7), Some([5, 7, 128]));
        assert_eq!(bitmap.source_format(), Some(ImageFormat::Png));
    }

    #[test]
    fn test_decode_jpeg() {
        let img = RgbImage::from_pixel(24, 24, Rgb([200, 40, 40]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        let bitmap = ImageDecoder::default().decode(&bytes, "leaf.JPEG").unwrap();
        assert_eq!(bitmap.source_format(), Some(ImageFormat::Jpeg));
        assert_eq!(bitmap.channels(), 3);
    }

    #[test]
    fn test_decode_webp() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 160, 0, 255]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::WebP);
        let bitmap = ImageDecoder::default().decode(&bytes, "leaf.webp").unwrap();
        assert_eq!(bitmap.get_pixel(0, 0), Some([0, 160, 0]));
    }

    #[test]
    fn test_grayscale_becomes_rgb() {
        let img = GrayImage::from_pixel(10, 10, Luma([77]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);
        let bitmap = ImageDecoder::default().decode(&bytes, "gray.png").unwrap();
        assert_eq!(bitmap.get_pixel(3, 3), Some([77, 77, 77]));
    }

    #[test]
    fn test_alpha_is_dropped() {
        let img = RgbaImage::from_pixel(6, 6, Rgba([10, 20, 30, 0]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);
        let bitmap = ImageDecoder::default().decode(&bytes, "alpha.png").unwrap();
        assert_eq!(bitmap.get_pixel(0, 0), Some([10, 20, 30]));
        assert_eq!(bitmap.as_image().as_raw().len(), 6 * 6 * 3);
    }

    #[test]
    fn test_rejects_disallowed_extension_before_decoding() {
        let err = ImageDecoder::default().decode(&rgb_png(4, 4), "leaf.gif").unwrap_err();
        assert!(matches!(
            err,
            ImageProcessingError::Validation(ValidationError::InvalidFileType { .. })
        ));

        let err = ImageDecoder::default().decode(&rgb_png(4, 4), "leaf").unwrap_err();
        assert!(matches!(
            err,
            ImageProcessingError::Validation(ValidationError::MissingExtension(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let decoder = ImageDecoder::new(ValidationConfig::with_max_bytes(64));
        let err = decoder.decode(&rgb_png(64, 64), "leaf.png").unwrap_err();
        assert!(matches!(
            err,
            ImageProcessingError::Validation(ValidationError::PayloadTooLarge { max: 64, .. })
        ));
    }

    #[test]
    fn test_decode_bytes_skips_upload_checks() {
        let decoder = ImageDecoder::new(ValidationConfig::with_max_bytes(64));
        let bytes = rgb_png(64, 64);
        assert!(decoder.decode(&bytes, "leaf.png").is_err());

        let bitmap = decoder.decode_bytes(&bytes).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (64, 64));
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        let decoder = ImageDecoder::default();
        assert!(matches!(
            decoder.decode(b"definitely not an image", "leaf.png"),
            Err(ImageProcessingError::Decode(_))
        ));
        assert!(matches!(
            decoder.decode(&[], "leaf.png"),
            Err(ImageProcessingError::Decode(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_png() {
        let bytes = rgb_png(64, 64);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            ImageDecoder::default().decode(truncated, "leaf.png"),
            Err(ImageProcessingError::Decode(_))
        ));
    }
}

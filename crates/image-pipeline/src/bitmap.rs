//! Decoded bitmap type

use image::{ImageFormat, RgbImage};

/// Decoded RGB bitmap (width * height * 3)
#[derive(Debug, Clone)]
pub struct DecodedBitmap {
    /// RGB pixel data
    pixels: RgbImage,
    /// Container format detected from the payload, if known
    source_format: Option<ImageFormat>,
}

impl DecodedBitmap {
    /// Wrap an RGB image
    pub fn new(pixels: RgbImage, source_format: Option<ImageFormat>) -> Self {
        Self {
            pixels,
            source_format,
        }
    }

    /// Create a bitmap from raw interleaved RGB data
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|pixels| Self::new(pixels, None))
    }

    /// Bitmap filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)), None)
    }

    /// Bitmap width
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Bitmap height
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Channel count, always 3
    pub fn channels(&self) -> usize {
        3
    }

    /// Detected source format
    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.pixels.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Borrow the underlying RGB image
    pub fn as_image(&self) -> &RgbImage {
        &self.pixels
    }
}

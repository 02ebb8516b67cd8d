//! Decoded raster frames.

use image::DynamicImage;

use crate::error::{MediaError, MediaResult};

/// One decoded frame in the canonical channel order (packed RGB24, row-major).
///
/// Frames are owned by a single pipeline step and dropped as soon as the
/// detection call for them returns.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RasterFrame {
    pub const CHANNELS: usize = 3;

    /// Wrap packed RGB24 bytes, checking the buffer length.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        let expected = Self::byte_len(width, height);
        if width == 0 || height == 0 || data.len() != expected {
            return Err(MediaError::internal(format!(
                "Invalid frame buffer: {}x{} expects {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Convert any decoded image into the canonical RGB layout.
    pub fn from_image(image: DynamicImage) -> Self {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self {
            width,
            height,
            data: rgb.into_raw(),
        }
    }

    /// Number of bytes of an RGB24 frame with the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgb_checks_length() {
        assert!(RasterFrame::from_rgb(2, 2, vec![0; 12]).is_ok());
        assert!(RasterFrame::from_rgb(2, 2, vec![0; 11]).is_err());
        assert!(RasterFrame::from_rgb(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_from_image_converts_to_rgb() {
        let rgba = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        let frame = RasterFrame::from_image(DynamicImage::ImageRgba8(rgba));
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.as_bytes().len(), 36);
        assert_eq!(&frame.as_bytes()[..3], &[10, 20, 30]);
    }
}

//! Still-image and stream-payload decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use herd_models::strip_data_url_prefix;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::frame::RasterFrame;

/// Decode an encoded image (JPEG, PNG, WebP, BMP, GIF, TIFF) into an RGB raster.
pub fn decode_image(bytes: &[u8]) -> MediaResult<RasterFrame> {
    if bytes.is_empty() {
        return Err(MediaError::unreadable("empty image payload"));
    }

    let image = image::load_from_memory(bytes).map_err(|e| {
        MediaError::unreadable(format!(
            "Cannot open image file. The file may be corrupted or in an unsupported format: {}",
            e
        ))
    })?;

    let frame = RasterFrame::from_image(image);
    debug!(width = frame.width(), height = frame.height(), "Decoded image");
    Ok(frame)
}

/// Decode a base64 stream payload, optionally data-URL prefixed.
pub fn decode_base64_frame(data: &str) -> MediaResult<RasterFrame> {
    let payload = strip_data_url_prefix(data).trim();
    if payload.is_empty() {
        return Err(MediaError::unreadable("empty frame payload"));
    }

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| MediaError::unreadable(format!("invalid base64 frame payload: {}", e)))?;

    decode_image(&bytes).map_err(|_| MediaError::unreadable("Failed to decode frame"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_decode_png() {
        let frame = decode_image(&png_bytes(8, 6)).unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert_eq!(&frame.as_bytes()[..3], &[200, 100, 50]);
    }

    #[test]
    fn test_decode_garbage_is_unreadable() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, MediaError::UnreadableMedia(_)));
    }

    #[test]
    fn test_decode_base64_with_data_url_prefix() {
        let encoded = STANDARD.encode(png_bytes(4, 4));
        let frame = decode_base64_frame(&format!("data:image/png;base64,{}", encoded)).unwrap();
        assert_eq!(frame.width(), 4);

        let frame = decode_base64_frame(&encoded).unwrap();
        assert_eq!(frame.height(), 4);
    }

    #[test]
    fn test_decode_base64_rejects_bad_payloads() {
        assert!(matches!(
            decode_base64_frame(""),
            Err(MediaError::UnreadableMedia(_))
        ));
        assert!(matches!(
            decode_base64_frame("data:image/jpeg;base64,"),
            Err(MediaError::UnreadableMedia(_))
        ));
        assert!(matches!(
            decode_base64_frame("!!!not-base64!!!"),
            Err(MediaError::UnreadableMedia(_))
        ));
        // Valid base64, not an image
        assert!(matches!(
            decode_base64_frame(&STANDARD.encode(b"hello world")),
            Err(MediaError::UnreadableMedia(_))
        ));
    }
}

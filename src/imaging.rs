use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageFormat};

const JPEG_QUALITY: u8 = 90;

/// Baseline RGB JPEG with its pixel dimensions
#[derive(Debug, Clone)]
pub struct JpegImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode any supported raster format and re-encode it as RGB JPEG
pub fn encode_jpeg(bytes: &[u8]) -> Result<JpegImage, ImageError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY).encode_image(&rgb)?;

    Ok(JpegImage {
        data,
        width,
        height,
    })
}

pub fn is_jpeg(bytes: &[u8]) -> bool {
    matches!(image::guess_format(bytes), Ok(ImageFormat::Jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgba([200u8, 40, 40, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_png_is_reencoded_as_jpeg() {
        let source = png(12, 8);
        assert!(!is_jpeg(&source));

        let jpeg = encode_jpeg(&source).unwrap();
        assert_eq!((jpeg.width, jpeg.height), (12, 8));
        assert!(is_jpeg(&jpeg.data));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(encode_jpeg(b"definitely not an image").is_err());
        assert!(!is_jpeg(b"definitely not an image"));
    }
}

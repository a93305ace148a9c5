//! Image encoding: rendered slide → PNG bytes → base64 `ImageData`.
//!
//! PNG is lossless, so slide text stays crisp both for the vision model and
//! for the video frame built from the same file. `detail: "high"` asks
//! GPT-4-class models to use their full tile budget so small print on dense
//! slides is not lost.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered slide as PNG bytes.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap PNG bytes read from `images/` for a multimodal chat request.
pub fn encode_slide(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded slide image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = png_bytes(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");

        let data = encode_slide(&png);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, png);
    }
}

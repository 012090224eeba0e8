//! Image encoding: cached page-image bytes → base64 `ImageData`.
//!
//! Vision APIs take images as base64 data embedded in the JSON request body.
//! Page images are cached as PNG, but the MIME type is sniffed from the bytes
//! so a cache seeded with JPEGs still produces a correct request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF";

/// MIME type for raw image bytes. Defaults to PNG when unrecognised.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(JPEG_MAGIC) {
        "image/jpeg"
    } else {
        if !bytes.starts_with(PNG_MAGIC) {
            debug!("Unrecognised image signature; sending as image/png");
        }
        "image/png"
    }
}

/// Wrap page-image bytes for a vision request.
///
/// `detail: "high"` keeps the full tile budget on OpenAI models; margin
/// glyphs vanish in the single low-detail tile.
pub fn encode_image(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, sniff_mime(bytes)).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn encodes_png_with_mime() {
        let bytes = png_bytes();
        let data = encode_image(&bytes);
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), bytes);
    }

    #[test]
    fn sniffs_jpeg() {
        assert_eq!(sniff_mime(b"\xFF\xD8\xFF\xE0rest"), "image/jpeg");
        assert_eq!(sniff_mime(b"garbage"), "image/png");
    }
}

//! Image compression pipeline used before an image is embedded in a message.
//!
//! Validates the declared type and size, scales down to fit the configured
//! box, flattens transparency onto white and re-encodes as JPEG at
//! decreasing quality until the byte budget is met or the quality floor is
//! reached. Deterministic for a given input and options.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

use crate::constants::{
    ACCEPTED_IMAGE_TYPES, MAX_IMAGE_FILE_SIZE, QUALITY_FLOOR_PERCENT, QUALITY_STEP_PERCENT,
};
use crate::error::ImageError;

/// An image file as handed over by the UI: declared type plus raw bytes.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    /// Declared MIME type, e.g. `image/png`.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Guess the declared type from a file name extension.
    pub fn mime_from_name(name: &str) -> Option<&'static str> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            _ => None,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Reject files whose declared type is not accepted or that exceed the
    /// 5 MiB ceiling. Cheap; runs before any decoding.
    pub fn validate(&self) -> Result<(), ImageError> {
        if !ACCEPTED_IMAGE_TYPES.contains(&self.mime_type.as_str()) {
            return Err(ImageError::InvalidFile(format!(
                "unsupported type '{}'",
                self.mime_type
            )));
        }
        if self.bytes.is_empty() {
            return Err(ImageError::InvalidFile("empty file".to_string()));
        }
        if self.bytes.len() > MAX_IMAGE_FILE_SIZE {
            return Err(ImageError::InvalidFile(format!(
                "file too large: {} bytes (max {})",
                self.bytes.len(),
                MAX_IMAGE_FILE_SIZE
            )));
        }
        Ok(())
    }
}

/// Compression settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Starting quality in `(0.0, 1.0]`.
    pub quality: f32,
    /// Target size of the encoded image.
    pub max_size_bytes: usize,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: 0.8,
            max_size_bytes: 500 * 1024,
        }
    }
}

impl CompressOptions {
    /// Square thumbnail preset.
    pub fn thumbnail(size: u32) -> Self {
        Self {
            max_width: size,
            max_height: size,
            quality: 0.6,
            max_size_bytes: 50 * 1024,
        }
    }

    fn start_quality(&self) -> Result<u8, ImageError> {
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(ImageError::InvalidOptions(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        let percent = (self.quality * 100.0).round() as u8;
        Ok(percent.max(QUALITY_FLOOR_PERCENT))
    }
}

/// Result of a compression run.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    /// `data:image/jpeg;base64,...`, ready to embed as message content.
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    /// Quality of the accepted encoding, in percent.
    pub quality: u8,
    /// Size of the encoded JPEG in bytes.
    pub size_bytes: usize,
}

/// Compress `file` according to `options`.
pub fn compress(file: &ImageFile, options: &CompressOptions) -> Result<CompressedImage, ImageError> {
    file.validate()?;
    if options.max_width == 0 || options.max_height == 0 {
        return Err(ImageError::InvalidOptions(
            "maximum dimensions must be positive".to_string(),
        ));
    }
    let start_quality = options.start_quality()?;

    let decoded = image::load_from_memory(&file.bytes).map_err(ImageError::Decode)?;
    let (width, height) = fit_dimensions(
        decoded.width(),
        decoded.height(),
        options.max_width,
        options.max_height,
    );

    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Triangle)
    };
    let canvas = flatten_onto_white(&resized);

    let mut quality = start_quality;
    let mut best = encode_jpeg(&canvas, quality)?;
    let mut best_quality = quality;

    while best.len() > options.max_size_bytes && quality > QUALITY_FLOOR_PERCENT {
        quality = quality
            .saturating_sub(QUALITY_STEP_PERCENT)
            .max(QUALITY_FLOOR_PERCENT);
        let attempt = encode_jpeg(&canvas, quality)?;
        debug!(quality, size = attempt.len(), "Re-encoded image");
        if attempt.len() <= best.len() {
            best = attempt;
            best_quality = quality;
        }
    }

    debug!(
        file = %file.name,
        original = file.size(),
        compressed = best.len(),
        width,
        height,
        quality = best_quality,
        "Image compressed"
    );

    Ok(CompressedImage {
        data_url: to_data_url(&best),
        width,
        height,
        quality: best_quality,
        size_bytes: best.len(),
    })
}

/// Scale `(width, height)` down, preserving aspect ratio, so that neither
/// side exceeds its maximum. Never scales up.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let scaled_w = ((width as f64 * ratio).round() as u32).clamp(1, max_width);
    let scaled_h = ((height as f64 * ratio).round() as u32).clamp(1, max_height);
    (scaled_w, scaled_h)
}

// Source transparency is composited onto an opaque white background.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(img).map_err(ImageError::Encode)?;
    Ok(buf)
}

fn to_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

/// Decode the payload of a `data:` URL produced by [`compress`].
pub fn decode_data_url(data_url: &str) -> Option<Vec<u8>> {
    let (_, payload) = data_url.split_once(";base64,")?;
    STANDARD.decode(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn png_file(width: u32, height: u32, pixel: Rgba<u8>) -> ImageFile {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, pixel);
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        ImageFile::new("test.png", "image/png", buf)
    }

    fn noisy_png(width: u32, height: u32) -> ImageFile {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(31) ^ y.wrapping_mul(17)).wrapping_mul(2654435761) >> 24;
            Rgba([v as u8, (v >> 1) as u8, (x ^ y) as u8, 255])
        });
        let mut buf = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buf);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        ImageFile::new("noise.png", "image/png", buf)
    }

    #[test]
    fn test_fit_dimensions_scales_down_preserving_ratio() {
        assert_eq!(fit_dimensions(2400, 1200, 1200, 1200), (1200, 600));
        assert_eq!(fit_dimensions(1000, 3000, 1200, 1200), (400, 1200));
        // Landscape image whose height still exceeds a smaller max height.
        assert_eq!(fit_dimensions(2000, 1500, 1600, 600), (800, 600));
    }

    #[test]
    fn test_fit_dimensions_never_upscales() {
        assert_eq!(fit_dimensions(100, 50, 1200, 1200), (100, 50));
        assert_eq!(fit_dimensions(1200, 1200, 1200, 1200), (1200, 1200));
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let mut file = png_file(4, 4, Rgba([0, 0, 0, 255]));
        file.mime_type = "application/pdf".into();
        let err = compress(&file, &CompressOptions::default()).unwrap_err();
        assert!(matches!(err, ImageError::InvalidFile(_)));
    }

    #[test]
    fn test_rejects_oversized_file_before_decoding() {
        let file = ImageFile::new("big.png", "image/png", vec![0u8; 8 * 1024 * 1024]);
        let err = compress(&file, &CompressOptions::default()).unwrap_err();
        assert!(matches!(err, ImageError::InvalidFile(_)));
    }

    #[test]
    fn test_undecodable_bytes() {
        let file = ImageFile::new("broken.png", "image/png", b"not an image".to_vec());
        let err = compress(&file, &CompressOptions::default()).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn test_compress_small_image_keeps_size_and_quality() {
        let file = png_file(64, 32, Rgba([200, 10, 10, 255]));
        let out = compress(&file, &CompressOptions::default()).unwrap();
        assert_eq!((out.width, out.height), (64, 32));
        assert_eq!(out.quality, 80);
        assert!(out.size_bytes <= CompressOptions::default().max_size_bytes);
        assert!(out.data_url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_compress_scales_to_box() {
        let file = png_file(300, 150, Rgba([0, 120, 0, 255]));
        let out = compress(&file, &CompressOptions::thumbnail(100)).unwrap();
        assert_eq!((out.width, out.height), (100, 50));
    }

    #[test]
    fn test_quality_stops_at_floor_when_budget_unreachable() {
        let file = noisy_png(128, 128);
        let options = CompressOptions {
            max_size_bytes: 1,
            ..CompressOptions::default()
        };
        let out = compress(&file, &options).unwrap();
        assert_eq!(out.quality, QUALITY_FLOOR_PERCENT);
        assert!(out.size_bytes > 1);
    }

    #[test]
    fn test_transparency_flattened_to_white() {
        let file = png_file(8, 8, Rgba([0, 0, 0, 0]));
        let out = compress(&file, &CompressOptions::default()).unwrap();
        let jpeg = decode_data_url(&out.data_url).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        let px = decoded.get_pixel(4, 4);
        assert!(px.0.iter().all(|c| *c > 240), "expected white, got {:?}", px);
    }

    #[test]
    fn test_invalid_quality_option() {
        let file = png_file(4, 4, Rgba([0, 0, 0, 255]));
        let options = CompressOptions {
            quality: 0.0,
            ..CompressOptions::default()
        };
        assert!(matches!(
            compress(&file, &options),
            Err(ImageError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_mime_from_name() {
        assert_eq!(ImageFile::mime_from_name("a.JPG"), Some("image/jpeg"));
        assert_eq!(ImageFile::mime_from_name("b.webp"), Some("image/webp"));
        assert_eq!(ImageFile::mime_from_name("c.txt"), None);
        assert_eq!(ImageFile::mime_from_name("noext"), None);
    }
}

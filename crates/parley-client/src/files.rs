//! Loading images from disk and running the compressor off the async
//! runtime.

use std::path::Path;

use parley_shared::image::{self, CompressOptions, CompressedImage, ImageFile};
use parley_shared::ImageError;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Read an image file. The declared type comes from the extension.
pub async fn load_image(path: &Path) -> std::result::Result<ImageFile, ImageError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = ImageFile::mime_from_name(&name).ok_or_else(|| {
        ImageError::InvalidFile(format!("{name}: unsupported file type"))
    })?;

    let bytes = tokio::fs::read(path).await?;
    debug!(path = %path.display(), size = bytes.len(), "Image loaded");
    Ok(ImageFile::new(name, mime_type, bytes))
}

/// Compress on the blocking pool.
pub async fn compress(file: ImageFile, options: CompressOptions) -> Result<CompressedImage> {
    tokio::task::spawn_blocking(move || image::compress(&file, &options))
        .await
        .map_err(|e| ClientError::Task(e.to_string()))?
        .map_err(ClientError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_load_and_compress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        std::fs::write(&path, png_bytes(64, 32)).unwrap();

        let file = load_image(&path).await.unwrap();
        assert_eq!(file.mime_type, "image/png");

        let out = compress(file, CompressOptions::default()).await.unwrap();
        assert_eq!((out.width, out.height), (64, 32));
        assert!(out.data_url.starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_image(&dir.path().join("nope.png")).await.unwrap_err();
        assert!(matches!(err, ImageError::Read(_)));
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let err = load_image(Path::new("notes.txt")).await.unwrap_err();
        assert!(matches!(err, ImageError::InvalidFile(_)));
    }
}

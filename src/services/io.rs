//! Image I/O operations service
//!
//! Keeps file formats out of the pipeline: files are decoded into [`ColorImage`]
//! and [`Mask`] values on the way in, and composites are encoded to PNG on the way out.

use crate::{
    error::{BgComposeError, Result},
    types::{ColorImage, CompositeImage, Mask},
};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// File extensions accepted as pipeline input
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image file as 8-bit RGB, recording its path
    ///
    /// # Errors
    /// - `UnsupportedFormat` if the extension is not one of [`SUPPORTED_EXTENSIONS`]
    /// - `Io` if the file does not exist or cannot be read
    /// - `Processing` if the contents cannot be decoded
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgcompose::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// println!("{}x{}", image.width(), image.height());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ColorImage> {
        let path_ref = path.as_ref();

        if !Self::is_supported_format(path_ref) {
            let extension = path_ref
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("none");
            return Err(BgComposeError::unsupported_format(format!(
                "'{}' (extension: {}); supported: {}",
                path_ref.display(),
                extension,
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }

        let decoded = Self::decode_file(path_ref)?;
        Ok(ColorImage::from_rgb(decoded.to_rgb8()).with_source_path(path_ref))
    }

    /// Load a mask image (any decodable format); luma `v` becomes `v / 255`
    ///
    /// # Errors
    /// - `Io` if the file does not exist or cannot be read
    /// - `Processing` if the contents cannot be decoded
    pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<Mask> {
        let decoded = Self::decode_file(path.as_ref())?;
        Ok(Mask::from_luma(&decoded.to_luma8()))
    }

    /// Decode an RGB image from raw bytes
    ///
    /// # Errors
    /// - `Processing` if the bytes cannot be decoded
    pub fn load_from_bytes(bytes: &[u8]) -> Result<ColorImage> {
        let decoded = image::load_from_memory(bytes).map_err(|e| {
            BgComposeError::processing(format!("Failed to decode image from bytes: {}", e))
        })?;
        Ok(ColorImage::from_rgb(decoded.to_rgb8()))
    }

    /// Decode a mask from raw bytes; luma `v` becomes `v / 255`
    ///
    /// # Errors
    /// - `Processing` if the bytes cannot be decoded
    pub fn load_mask_from_bytes(bytes: &[u8]) -> Result<Mask> {
        let decoded = image::load_from_memory(bytes).map_err(|e| {
            BgComposeError::processing(format!("Failed to decode mask from bytes: {}", e))
        })?;
        Ok(Mask::from_luma(&decoded.to_luma8()))
    }

    /// Decode an RGB image from an async reader
    ///
    /// # Errors
    /// - `Processing` if reading fails or the data cannot be decoded
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(
        mut reader: R,
    ) -> Result<ColorImage> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            BgComposeError::processing(format!("Failed to read from stream: {}", e))
        })?;

        Self::load_from_bytes(&buffer)
    }

    /// Save a composite as PNG, creating parent directories as needed
    ///
    /// # Errors
    /// - `Io` if the directory cannot be created
    /// - `Processing` if encoding or writing fails
    pub fn save_png<P: AsRef<Path>>(image: &CompositeImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgComposeError::file_io_error("create output directory", parent, &e)
            })?;
        }

        image
            .as_rgba()
            .save_with_format(path_ref, ImageFormat::Png)
            .map_err(|e| {
                BgComposeError::processing_stage_error(
                    "image save",
                    &format!("Failed to save as PNG: {}", e),
                    Some(&format!(
                        "{}x{}, path: {}",
                        image.width(),
                        image.height(),
                        path_ref.display()
                    )),
                )
            })?;

        log::debug!(
            "Saved {}x{} PNG to {}",
            image.width(),
            image.height(),
            path_ref.display()
        );
        Ok(())
    }

    /// Encode a composite to PNG bytes
    ///
    /// # Errors
    /// - `Processing` if encoding fails
    pub fn encode_png(image: &CompositeImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        image
            .as_rgba()
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| BgComposeError::processing(format!("Failed to encode PNG: {}", e)))?;
        Ok(buffer)
    }

    /// Write a composite as PNG to an async writer, returning the byte count
    ///
    /// # Errors
    /// - `Processing` if encoding, writing or flushing fails
    pub async fn save_to_writer<W: tokio::io::AsyncWrite + Unpin>(
        image: &CompositeImage,
        mut writer: W,
    ) -> Result<u64> {
        use tokio::io::AsyncWriteExt;

        let bytes = Self::encode_png(image)?;

        writer
            .write_all(&bytes)
            .await
            .map_err(|e| BgComposeError::processing(format!("Failed to write to stream: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| BgComposeError::processing(format!("Failed to flush stream: {}", e)))?;

        Ok(bytes.len() as u64)
    }

    /// Check if a file path has a supported image extension (case-insensitive)
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext_lower = ext.to_lowercase();
                SUPPORTED_EXTENSIONS.contains(&ext_lower.as_str())
            })
    }

    fn decode_file(path_ref: &Path) -> Result<DynamicImage> {
        if !path_ref.exists() {
            return Err(BgComposeError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                // Extension may lie about the contents; retry with format sniffing
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgComposeError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(|content_err| {
                    let extension = path_ref
                        .extension()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown");

                    BgComposeError::processing_stage_error(
                        "image loading",
                        &format!(
                            "Failed to load image with both extension-based ({}) and content-based detection. Extension error: {}. Content error: {}",
                            extension, e, content_err
                        ),
                        Some(&format!("path: {}, size: {} bytes", path_ref.display(), data.len())),
                    )
                })
            },
        }
    }
}

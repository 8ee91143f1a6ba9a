//! Final image encoding.
//!
//! The stitched canvas is RGBA. JPEG output drops the alpha channel and is
//! written at a configurable quality. Every other extension the `image` crate
//! can write (PNG, TIFF, BMP, WebP, GIF) is encoded by that crate as-is.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageFormat, RgbImage, RgbaImage};

use crate::error::OutputError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Baseline JPEG at a chosen quality, alpha dropped.
    Jpeg,
    /// Any other format the `image` crate was built to write.
    Image(ImageFormat),
}

impl OutputFormat {
    /// Resolve a file extension (case-insensitive, leading `.` allowed).
    ///
    /// Returns `None` for unknown extensions and for formats this build
    /// cannot encode.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if ext.is_empty() {
            return None;
        }

        match ImageFormat::from_extension(&ext)? {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            format if format.writing_enabled() => Some(OutputFormat::Image(format)),
            _ => None,
        }
    }
}

/// Validate JPEG quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

/// `{out_dir}/{stem}.{format}`.
pub fn output_path(out_dir: &Path, stem: &str, format: &str) -> PathBuf {
    out_dir.join(format!("{}.{}", stem, format.trim_start_matches('.')))
}

/// Encode `image` into `writer`.
///
/// The JPEG path converts straight to RGB; the RGBA canvas is never cloned.
pub fn write_image<W: Write + Seek>(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
    writer: &mut W,
) -> Result<(), ImageError> {
    match format {
        OutputFormat::Jpeg => {
            let rgb: RgbImage = image.convert();
            let mut encoder = JpegEncoder::new_with_quality(writer, clamp_quality(quality));
            encoder.encode_image(&rgb)
        }
        OutputFormat::Image(format) => image.write_to(writer, format),
    }
}

/// Encode `image` in memory.
pub fn encode_image(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    write_image(image, format, quality, &mut buf)?;
    Ok(buf.into_inner())
}

/// Encode `image` according to the extension of `path` and write it.
///
/// `quality` only applies to JPEG output. A file left half-written by a
/// failed encode is removed.
pub fn save_image(image: &RgbaImage, path: &Path, quality: u8) -> Result<(), OutputError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let format = OutputFormat::from_extension(&ext).ok_or_else(|| OutputError::Encode {
        path: path.to_path_buf(),
        message: format!("unsupported output format {:?}", ext),
    })?;

    let io_error = |e: std::io::Error| OutputError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);

    let written = write_image(image, format, quality, &mut writer)
        .map_err(|e| match e {
            ImageError::IoError(e) => io_error(e),
            e => OutputError::Encode {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })
        .and_then(|()| writer.flush().map_err(io_error));

    if written.is_err() {
        drop(writer);
        let _ = std::fs::remove_file(path);
    }
    written
}

// =============================================================================
// Tests
// =============================================================================

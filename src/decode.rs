//! Image sources: turning a key into decoded pixels.
//!
//! `ImageSource` is the seam between the pipeline and wherever images come
//! from. The pipeline never interprets keys; `FileSource` treats them as
//! filesystem paths, but any closure with the right signature works too.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, ImageReader};
use log::trace;
use thiserror::Error;

/// A decoded image. Cloning shares the pixel buffer.
#[derive(Clone)]
pub struct Image {
    pixels: Arc<DynamicImage>,
}

impl Image {
    pub fn new(pixels: DynamicImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// True if both handles share the same pixel buffer.
    pub fn ptr_eq(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Why a key could not be turned into an image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: image::ImageError,
    },
    #[error("{key} decoded to an empty image")]
    Empty { key: String },
    #[error("{key}: {reason}")]
    Unsupported { key: String, reason: String },
}

/// Something that can produce an image for a key.
///
/// Implementations run on decode worker threads and may block on I/O.
pub trait ImageSource: Send + Sync {
    fn load(&self, key: &str) -> Result<Image, LoadError>;
}

impl<F> ImageSource for F
where
    F: Fn(&str) -> Result<Image, LoadError> + Send + Sync,
{
    fn load(&self, key: &str) -> Result<Image, LoadError> {
        self(key)
    }
}

/// Decodes keys as local file paths, guessing the format from content.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl ImageSource for FileSource {
    fn load(&self, key: &str) -> Result<Image, LoadError> {
        trace!("decode: opening {key}");
        let reader = ImageReader::open(Path::new(key))
            .and_then(|r| r.with_guessed_format())
            .map_err(|source| LoadError::Io {
                key: key.to_string(),
                source,
            })?;
        if reader.format().is_none() {
            return Err(LoadError::Unsupported {
                key: key.to_string(),
                reason: "unrecognized image format".into(),
            });
        }
        let pixels = reader.decode().map_err(|source| LoadError::Decode {
            key: key.to_string(),
            source,
        })?;
        let image = Image::new(pixels);
        if image.is_empty() {
            return Err(LoadError::Empty {
                key: key.to_string(),
            });
        }
        trace!("decode: {key} -> {}x{}", image.width(), image.height());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn closure_is_a_source() {
        let source = |key: &str| -> Result<Image, LoadError> {
            if key == "ok" {
                Ok(Image::new(DynamicImage::ImageRgba8(RgbaImage::new(3, 2))))
            } else {
                Err(LoadError::Empty {
                    key: key.to_string(),
                })
            }
        };
        let image = source.load("ok").unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        assert!(source.load("bad").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = FileSource.load("/nonexistent/gridload/missing.png").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn unrecognized_content_is_unsupported() {
        let path = std::env::temp_dir().join(format!("gridload-decode-{}.bin", std::process::id()));
        std::fs::write(&path, b"definitely not an image").unwrap();
        let err = FileSource.load(path.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, LoadError::Unsupported { .. }), "got {err:?}");
    }

    #[test]
    fn clones_share_pixels() {
        let a = Image::new(DynamicImage::ImageRgba8(RgbaImage::new(1, 1)));
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.is_empty());
        assert!(Image::new(DynamicImage::ImageRgba8(RgbaImage::new(0, 4))).is_empty());
    }
}

//! Pixel transform seam between the generator and an image library.

use crate::error::ProcessError;
use crate::registry::Transform;

/// Turns source image bytes into thumbnail bytes.
///
/// Called on a blocking thread; implementations may do CPU-heavy work.
pub trait Processor: Send + Sync {
    /// `extension` is the lowercased output extension, e.g. `"png"`.
    fn process(
        &self,
        source: &[u8],
        transform: &Transform,
        extension: &str,
    ) -> Result<Vec<u8>, ProcessError>;
}

#[cfg(feature = "image")]
pub use self::image_processor::ImageProcessor;

#[cfg(feature = "image")]
mod image_processor {
    use std::io::Cursor;

    use image::codecs::jpeg::JpegEncoder;
    use image::imageops::FilterType;
    use image::{DynamicImage, ImageFormat};

    use super::Processor;
    use crate::error::ProcessError;
    use crate::registry::{ResizeMethod, Transform};

    const DEFAULT_JPEG_QUALITY: u8 = 85;

    /// [`Processor`] backed by the `image` crate.
    #[derive(Debug, Clone, Copy)]
    pub struct ImageProcessor {
        filter: FilterType,
    }

    impl ImageProcessor {
        pub fn new(filter: FilterType) -> Self {
            Self { filter }
        }

        fn resize(&self, img: DynamicImage, transform: &Transform) -> DynamicImage {
            let (width, height) = (transform.width, transform.height);
            match transform.method {
                // Never upscale when fitting into the box.
                ResizeMethod::Fit if img.width() <= width && img.height() <= height => img,
                ResizeMethod::Fit => img.resize(width, height, self.filter),
                ResizeMethod::Fill => img.resize_to_fill(width, height, self.filter),
                ResizeMethod::Exact => img.resize_exact(width, height, self.filter),
            }
        }
    }

    impl Default for ImageProcessor {
        fn default() -> Self {
            Self::new(FilterType::Lanczos3)
        }
    }

    impl Processor for ImageProcessor {
        fn process(
            &self,
            source: &[u8],
            transform: &Transform,
            extension: &str,
        ) -> Result<Vec<u8>, ProcessError> {
            let format = ImageFormat::from_extension(extension)
                .filter(|f| f.can_write())
                .ok_or_else(|| ProcessError::UnsupportedFormat(extension.to_string()))?;

            let img =
                image::load_from_memory(source).map_err(|e| ProcessError::Decode(e.to_string()))?;
            let thumbnail = self.resize(img, transform);

            let mut buf = Vec::new();
            match format {
                ImageFormat::Jpeg => {
                    let quality = transform.quality.unwrap_or(DEFAULT_JPEG_QUALITY);
                    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                    DynamicImage::ImageRgb8(thumbnail.to_rgb8())
                        .write_with_encoder(encoder)
                        .map_err(|e| ProcessError::Encode(e.to_string()))?;
                }
                other => thumbnail
                    .write_to(&mut Cursor::new(&mut buf), other)
                    .map_err(|e| ProcessError::Encode(e.to_string()))?,
            }
            Ok(buf)
        }
    }

}

// Encoded photo tiles and the PNG/JPEG codec helpers around them

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageOutputFormat, RgbaImage};
use std::io::Cursor;

use crate::errors::StripError;

const JPEG_QUALITY: u8 = 90;

/// One normalized photo destined for the strip.
///
/// The encoded buffer is immutable; cloning a tile only bumps a refcount, so
/// the compositor can hand copies to concurrent decode tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoTile {
    data: Bytes,
    width: u32,
    height: u32,
}

impl PhotoTile {
    /// Encode a rendered raster as a PNG tile.
    pub fn from_image(image: &RgbaImage) -> Result<Self, StripError> {
        let data = encode_png(image)?;
        Ok(PhotoTile {
            data,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Wrap an already encoded raster (e.g. the output of a crop widget).
    ///
    /// Only the header is read to learn the dimensions; the pixels are
    /// decoded later by the compositor.
    pub fn from_encoded(data: Bytes) -> Result<Self, StripError> {
        let (width, height) = probe_dimensions(&data)?;
        if width == 0 || height == 0 {
            return Err(StripError::InvalidDimensions(format!(
                "{}x{} tile",
                width, height
            )));
        }
        Ok(PhotoTile {
            data,
            width,
            height,
        })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn decode(&self) -> Result<RgbaImage, StripError> {
        decode(&self.data).map(|img| img.to_rgba8())
    }

    /// Decode and resize to exactly `width` x `height`, ignoring aspect.
    pub fn decode_scaled(&self, width: u32, height: u32) -> Result<RgbaImage, StripError> {
        let photo = self.decode()?;
        if photo.dimensions() == (width, height) {
            return Ok(photo);
        }
        Ok(imageops::resize(&photo, width, height, FilterType::Lanczos3))
    }
}

/// Run CPU-bound image work on tokio's blocking pool.
pub async fn run_blocking<T, F>(work: F) -> Result<T, StripError>
where
    F: FnOnce() -> Result<T, StripError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StripError::Composition(format!("image task failed: {}", e)))?
}

pub fn decode(data: &[u8]) -> Result<DynamicImage, StripError> {
    image::load_from_memory(data).map_err(|e| StripError::DecodeFailure(e.to_string()))
}

pub fn is_png(data: &[u8]) -> bool {
    matches!(image::guess_format(data), Ok(ImageFormat::Png))
}

pub fn probe_dimensions(data: &[u8]) -> Result<(u32, u32), StripError> {
    image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| StripError::DecodeFailure(e.to_string()))?
        .into_dimensions()
        .map_err(|e| StripError::DecodeFailure(e.to_string()))
}

pub fn encode_png(image: &RgbaImage) -> Result<Bytes, StripError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .map_err(|e| StripError::EncodeFailure(e.to_string()))?;
    Ok(Bytes::from(buffer.into_inner()))
}

/// JPEG has no alpha channel, so the raster is flattened to RGB first.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Bytes, StripError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut buffer, ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| StripError::EncodeFailure(e.to_string()))?;
    Ok(Bytes::from(buffer.into_inner()))
}

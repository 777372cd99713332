// Cover-fit normalization of arbitrary rasters into fixed-size photo tiles

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::errors::StripError;
use crate::tile::PhotoTile;

/// Placement of a scaled source inside a target canvas.
///
/// Offsets are relative to the canvas origin and may be negative: the parts
/// of the scaled source that fall outside the canvas are clipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub render_width: f64,
    pub render_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CoverFit {
    pub fn compute(
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Self, StripError> {
        if source_width == 0 || source_height == 0 {
            return Err(StripError::InvalidDimensions(format!(
                "source is {}x{}",
                source_width, source_height
            )));
        }
        if target_width == 0 || target_height == 0 {
            return Err(StripError::InvalidDimensions(format!(
                "target is {}x{}",
                target_width, target_height
            )));
        }

        let (sw, sh) = (source_width as f64, source_height as f64);
        let (tw, th) = (target_width as f64, target_height as f64);

        let fit = if sw / sh > tw / th {
            // Source is relatively wider: match heights, crop the sides
            let render_width = sw * (th / sh);
            CoverFit {
                render_width,
                render_height: th,
                offset_x: (tw - render_width) / 2.0,
                offset_y: 0.0,
            }
        } else {
            let render_height = sh * (tw / sw);
            CoverFit {
                render_width: tw,
                render_height,
                offset_x: 0.0,
                offset_y: (th - render_height) / 2.0,
            }
        };

        Ok(fit)
    }

    /// The rectangle of the source (x, y, width, height) that ends up visible.
    fn visible_source_region(
        &self,
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> (u32, u32, u32, u32) {
        let scale = self.render_width / source_width as f64;

        let x = ((-self.offset_x / scale).round() as u32).min(source_width - 1);
        let y = ((-self.offset_y / scale).round() as u32).min(source_height - 1);
        let width = ((target_width as f64 / scale).round() as u32)
            .max(1)
            .min(source_width - x);
        let height = ((target_height as f64 / scale).round() as u32)
            .max(1)
            .min(source_height - y);

        (x, y, width, height)
    }
}

/// Render `source` so that it fully covers a `target_width` x `target_height`
/// canvas, center-cropping whatever overflows.
pub fn cover(
    source: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<RgbaImage, StripError> {
    let fit = CoverFit::compute(source.width(), source.height(), target_width, target_height)?;
    let (x, y, width, height) =
        fit.visible_source_region(source.width(), source.height(), target_width, target_height);

    debug!(
        "Cover fit {}x{} -> {}x{}: visible source region {}x{} at ({}, {})",
        source.width(),
        source.height(),
        target_width,
        target_height,
        width,
        height,
        x,
        y
    );

    Ok(source
        .crop_imm(x, y, width, height)
        .resize_exact(target_width, target_height, FilterType::Lanczos3)
        .to_rgba8())
}

pub fn normalize(
    source: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<PhotoTile, StripError> {
    let rendered = cover(source, target_width, target_height)?;
    PhotoTile::from_image(&rendered)
}

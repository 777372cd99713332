// Strip compositing: header, framed photos and dated footer on one raster

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use futures::stream::{FuturesUnordered, StreamExt};
use image::imageops;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{point, Font, Scale};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::background::PaintProcedure;
use crate::config::StripConfig;
use crate::errors::StripError;
use crate::tile::{self, PhotoTile};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TITLE_FONT_SIZE: f32 = 50.0;
const FOOTER_FONT_SIZE: f32 = 30.0;
const FRAME_WIDTH: i32 = 5;

/// Tallest strip that will be allocated. Four 4:3 photos need under 2000.
pub const MAX_STRIP_HEIGHT: f64 = 16_384.0;

/// Fixed measurements of a strip, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    pub strip_width: u32,
    pub photo_margin: u32,
    pub photo_gap: u32,
    pub header_height: u32,
    pub footer_height: u32,
}

impl Default for StripLayout {
    fn default() -> Self {
        StripLayout {
            strip_width: 600,
            photo_margin: 30,
            photo_gap: 30,
            header_height: 150,
            footer_height: 100,
        }
    }
}

/// Geometry of one compositing run, derived from the layout, the number of
/// photos and the aspect ratio of the first photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripGeometry {
    pub layout: StripLayout,
    pub photo_count: usize,
    pub photo_width: f64,
    pub photo_height: f64,
    pub total_height: f64,
}

impl StripGeometry {
    pub fn compute(
        layout: StripLayout,
        photo_aspect: f64,
        photo_count: usize,
    ) -> Result<Self, StripError> {
        if photo_count == 0 {
            return Err(StripError::EmptyInput);
        }
        if !photo_aspect.is_finite() || photo_aspect <= 0.0 {
            return Err(StripError::InvalidDimensions(format!(
                "photo aspect ratio {}",
                photo_aspect
            )));
        }

        let n = photo_count as f64;
        let gap = layout.photo_gap as f64;
        let photo_width = layout.strip_width as f64 - 2.0 * layout.photo_margin as f64;
        let photo_height = photo_width / photo_aspect;

        // The trailing `+ gap` is bottom padding beyond the n-1 row gaps
        let total_height = layout.header_height as f64
            + n * photo_height
            + (n - 1.0) * gap
            + layout.footer_height as f64
            + gap;
        if total_height > MAX_STRIP_HEIGHT {
            return Err(StripError::InvalidDimensions(format!(
                "strip would be {:.0}px tall (limit {})",
                total_height, MAX_STRIP_HEIGHT
            )));
        }

        Ok(StripGeometry {
            layout,
            photo_count,
            photo_width,
            photo_height,
            total_height,
        })
    }

    /// Top edge of the photo in row `index`.
    pub fn row_y(&self, index: usize) -> f64 {
        self.layout.header_height as f64
            + index as f64 * (self.photo_height + self.layout.photo_gap as f64)
    }

    /// Pixel box every photo is scaled into.
    pub fn photo_size(&self) -> (u32, u32) {
        (
            (self.photo_width.round() as u32).max(1),
            (self.photo_height.round() as u32).max(1),
        )
    }

    /// Height of the output raster; fractional heights are truncated.
    pub fn canvas_height(&self) -> u32 {
        self.total_height.floor() as u32
    }

    pub fn title_center(&self) -> (f64, f64) {
        (
            self.layout.strip_width as f64 / 2.0,
            self.layout.header_height as f64 / 2.0,
        )
    }

    pub fn footer_center(&self) -> (f64, f64) {
        (
            self.layout.strip_width as f64 / 2.0,
            self.total_height - self.layout.footer_height as f64 / 2.0,
        )
    }
}

/// A single draw call issued while compositing, in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOp {
    Background,
    Title,
    Frame { index: usize },
    Photo { index: usize },
    Footer,
}

/// A finished strip. Only ever produced after every photo and the footer
/// have been drawn.
#[derive(Debug, Clone)]
pub struct Strip {
    image: RgbaImage,
    geometry: StripGeometry,
    draw_log: Vec<DrawOp>,
}

impl Strip {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn geometry(&self) -> &StripGeometry {
        &self.geometry
    }

    pub fn draw_log(&self) -> &[DrawOp] {
        &self.draw_log
    }

    /// Encode as PNG on the blocking pool.
    pub async fn into_png(self) -> Result<Bytes, StripError> {
        tile::run_blocking(move || tile::encode_png(&self.image)).await
    }
}

/// `<product>-<unix epoch millis>.png`
pub fn download_file_name(product_name: &str, epoch_millis: i64) -> String {
    format!("{}-{}.png", product_name, epoch_millis)
}

/// Footer date in day-month-year order, e.g. `19 October 2026`.
pub fn footer_date(date: NaiveDate) -> String {
    date.format("%-d %B %Y").to_string()
}

/// Turns an encoded tile back into pixels sized for its slot in the strip.
#[async_trait]
pub trait TileDecoder: Send + Sync {
    async fn decode_scaled(
        &self,
        tile: PhotoTile,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, StripError>;
}

/// Decodes and resizes on tokio's blocking pool so concurrent tiles overlap.
pub struct BlockingDecoder;

#[async_trait]
impl TileDecoder for BlockingDecoder {
    async fn decode_scaled(
        &self,
        tile: PhotoTile,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, StripError> {
        tile::run_blocking(move || tile.decode_scaled(width, height)).await
    }
}

/// Fonts for the header and footer text. A missing font skips its text.
#[derive(Default)]
pub struct StripFonts {
    title: Option<Font<'static>>,
    footer: Option<Font<'static>>,
}

impl StripFonts {
    pub fn load(config: &StripConfig) -> Self {
        StripFonts {
            title: load_font(&config.title_font_path),
            footer: load_font(&config.footer_font_path),
        }
    }
}

fn load_font(path: &Path) -> Option<Font<'static>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("Font not found at {:?} ({}). Text will be skipped.", path, e);
            return None;
        }
    };
    let font = Font::try_from_vec(data);
    if font.is_none() {
        warn!("Failed to parse font {:?}. Text will be skipped.", path);
    }
    font
}

pub struct StripCompositor {
    layout: StripLayout,
    fonts: StripFonts,
    decoder: Arc<dyn TileDecoder>,
}

impl StripCompositor {
    pub fn new(fonts: StripFonts) -> Self {
        StripCompositor {
            layout: StripLayout::default(),
            fonts,
            decoder: Arc::new(BlockingDecoder),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TileDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Composite `tiles` into a strip.
    ///
    /// Layout is derived from the first tile's aspect ratio; later tiles are
    /// scaled into the same box whatever their own aspect. All tiles are
    /// decoded concurrently and drawn as they complete, and the footer is
    /// drawn once the last one has been drawn. A decode failure rejects the
    /// whole strip. Pixel-heavy steps run on the blocking pool.
    pub async fn composite(
        &self,
        tiles: &[PhotoTile],
        background: &PaintProcedure,
        title_text: &str,
        footer_text: &str,
    ) -> Result<Strip, StripError> {
        if tiles.is_empty() {
            return Err(StripError::EmptyInput);
        }
        let n = tiles.len();

        // Tile dimensions come from the encoded header, so no decode is needed
        let first = &tiles[0];
        if first.width() == 0 || first.height() == 0 {
            return Err(StripError::InvalidDimensions(
                "first photo has no pixels".to_string(),
            ));
        }
        let photo_aspect = first.width() as f64 / first.height() as f64;

        let geometry = StripGeometry::compute(self.layout, photo_aspect, n)?;
        info!(
            "Compositing {} photo(s) into a {}x{} strip",
            n,
            self.layout.strip_width,
            geometry.canvas_height()
        );

        let (width, height) = (self.layout.strip_width, geometry.canvas_height());
        let paint = background.clone();
        let mut canvas = tile::run_blocking(move || {
            let mut canvas = RgbaImage::new(width, height);
            let full = Rect::at(0, 0).of_size(width, height);
            paint(&mut canvas, full);
            Ok(canvas)
        })
        .await?;
        let mut draw_log = Vec::with_capacity(2 * n + 3);
        draw_log.push(DrawOp::Background);

        let (cx, cy) = geometry.title_center();
        draw_centered_text(
            &mut canvas,
            self.fonts.title.as_ref(),
            TITLE_FONT_SIZE,
            title_text,
            cx,
            cy,
        );
        draw_log.push(DrawOp::Title);

        let (box_width, box_height) = geometry.photo_size();
        let mut pending: FuturesUnordered<_> = tiles
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, tile)| {
                let decoder = self.decoder.clone();
                async move {
                    let decoded = decoder.decode_scaled(tile, box_width, box_height).await;
                    (index, decoded)
                }
            })
            .collect();

        let mut completed = 0;
        while let Some((index, decoded)) = pending.next().await {
            let photo = decoded.map_err(|e| {
                warn!("Photo {} failed to decode, abandoning strip: {}", index, e);
                e
            })?;

            draw_framed_photo(&mut canvas, &geometry, index, &photo);
            draw_log.push(DrawOp::Frame { index });
            draw_log.push(DrawOp::Photo { index });
            debug!("Drew photo {} ({}/{})", index, completed + 1, n);

            completed += 1;
            if completed == n {
                let (fx, fy) = geometry.footer_center();
                draw_centered_text(
                    &mut canvas,
                    self.fonts.footer.as_ref(),
                    FOOTER_FONT_SIZE,
                    footer_text,
                    fx,
                    fy,
                );
                draw_log.push(DrawOp::Footer);
            }
        }

        Ok(Strip {
            image: canvas,
            geometry,
            draw_log,
        })
    }
}

/// White frame first, then the already scaled photo on top of it.
fn draw_framed_photo(
    canvas: &mut RgbaImage,
    geometry: &StripGeometry,
    index: usize,
    photo: &RgbaImage,
) {
    let x = geometry.layout.photo_margin as i32;
    let y = geometry.row_y(index).round() as i32;
    let (width, height) = geometry.photo_size();

    let frame = Rect::at(x - FRAME_WIDTH, y - FRAME_WIDTH)
        .of_size(width + 2 * FRAME_WIDTH as u32, height + 2 * FRAME_WIDTH as u32);
    draw_filled_rect_mut(canvas, frame, WHITE);
    imageops::overlay(canvas, photo, x as i64, y as i64);
}

fn measure_text_width(font: &Font, text: &str, scale: Scale) -> f32 {
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Draw `text` centered on (`cx`, `cy`) both horizontally and vertically.
fn draw_centered_text(
    canvas: &mut RgbaImage,
    font: Option<&Font>,
    size: f32,
    text: &str,
    cx: f64,
    cy: f64,
) {
    let Some(font) = font else {
        return;
    };
    if text.is_empty() {
        return;
    }

    let scale = Scale::uniform(size);
    let width = measure_text_width(font, text, scale);
    let v_metrics = font.v_metrics(scale);
    let line_height = v_metrics.ascent - v_metrics.descent;

    // draw_text_mut positions the top of the line box at y
    let x = (cx as f32 - width / 2.0).round() as i32;
    let y = (cy as f32 - line_height / 2.0).round() as i32;
    draw_text_mut(canvas, WHITE, x, y, scale, font, text);
}

// Strip backgrounds and the paint procedures they resolve to

use bytes::Bytes;
use image::imageops;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::errors::StripError;
use crate::normalizer;
use crate::tile;

/// Paints a background into `rect` of the given canvas.
pub type PaintProcedure = Arc<dyn Fn(&mut RgbaImage, Rect) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Position along the gradient, 0.0 = top-left corner, 1.0 = bottom-right
    pub offset: f32,
    pub color: Rgba<u8>,
}

impl GradientStop {
    pub fn new(offset: f32, color: Rgba<u8>) -> Self {
        GradientStop { offset, color }
    }
}

#[derive(Debug, Clone)]
pub enum Background {
    SolidColor(Rgba<u8>),
    Gradient(Vec<GradientStop>),
    /// Already decoded; a custom background never holds an undecoded image.
    CustomImage(Arc<DynamicImage>),
}

/// The built-in background choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundPreset {
    SolidBlue,
    SolidRed,
    SolidGreen,
    GradientPurple,
}

impl BackgroundPreset {
    pub fn background(self) -> Background {
        match self {
            BackgroundPreset::SolidBlue => Background::SolidColor(Rgba([0x6c, 0x5c, 0xe7, 0xff])),
            BackgroundPreset::SolidRed => Background::SolidColor(Rgba([0xff, 0x76, 0x75, 0xff])),
            BackgroundPreset::SolidGreen => Background::SolidColor(Rgba([0x55, 0xef, 0xc4, 0xff])),
            BackgroundPreset::GradientPurple => Background::Gradient(vec![
                GradientStop::new(0.0, Rgba([0xa2, 0x9b, 0xfe, 0xff])),
                GradientStop::new(1.0, Rgba([0x74, 0xb9, 0xff, 0xff])),
            ]),
        }
    }
}

impl Default for Background {
    fn default() -> Self {
        BackgroundPreset::SolidBlue.background()
    }
}

impl Background {
    pub fn solid(hex: &str) -> Result<Self, StripError> {
        parse_hex_color(hex).map(Background::SolidColor)
    }

    /// Stops must be non-empty, within [0, 1] and in ascending order.
    pub fn gradient(stops: Vec<GradientStop>) -> Result<Self, StripError> {
        if stops.is_empty() {
            return Err(StripError::InvalidColor(
                "gradient needs at least one stop".to_string(),
            ));
        }
        if stops.iter().any(|s| !(0.0..=1.0).contains(&s.offset)) {
            return Err(StripError::InvalidColor(
                "gradient stop offsets must be within [0, 1]".to_string(),
            ));
        }
        if stops.windows(2).any(|w| w[0].offset > w[1].offset) {
            return Err(StripError::InvalidColor(
                "gradient stops must be ordered by offset".to_string(),
            ));
        }
        Ok(Background::Gradient(stops))
    }

    pub fn custom(image: DynamicImage) -> Self {
        Background::CustomImage(Arc::new(image))
    }

    /// Decode a cropped background raster; fails before any state changes.
    pub fn custom_from_encoded(data: &Bytes) -> Result<Self, StripError> {
        let image = tile::decode(data)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(StripError::InvalidDimensions(
                "empty background image".to_string(),
            ));
        }
        Ok(Background::custom(image))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Background::SolidColor(_) => "solid-color",
            Background::Gradient(_) => "gradient",
            Background::CustomImage(_) => "custom-image",
        }
    }

    pub fn resolve(&self) -> PaintProcedure {
        match self {
            Background::SolidColor(color) => {
                let color = *color;
                Arc::new(move |canvas: &mut RgbaImage, rect: Rect| {
                    draw_filled_rect_mut(canvas, rect, color)
                })
            }
            Background::Gradient(stops) => {
                let stops = stops.clone();
                Arc::new(move |canvas: &mut RgbaImage, rect: Rect| {
                    paint_gradient(canvas, rect, &stops)
                })
            }
            Background::CustomImage(image) => {
                let source = image.clone();
                Arc::new(move |canvas: &mut RgbaImage, rect: Rect| {
                    paint_cover(canvas, rect, &source)
                })
            }
        }
    }
}

pub fn parse_hex_color(hex: &str) -> Result<Rgba<u8>, StripError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    let invalid = || StripError::InvalidColor(hex.to_string());

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match digits.len() {
        3 => {
            let expand = |i: usize| channel(&digits[i..i + 1].repeat(2));
            Ok(Rgba([expand(0)?, expand(1)?, expand(2)?, 255]))
        }
        6 => Ok(Rgba([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            255,
        ])),
        _ => Err(invalid()),
    }
}

fn sample_stops(stops: &[GradientStop], t: f32) -> Rgba<u8> {
    let first = &stops[0];
    let last = &stops[stops.len() - 1];
    if t <= first.offset {
        return first.color;
    }
    if t >= last.offset {
        return last.color;
    }

    let (left, right) = stops
        .windows(2)
        .map(|w| (&w[0], &w[1]))
        .find(|(l, r)| l.offset <= t && t <= r.offset)
        .unwrap_or((first, last));

    let span = right.offset - left.offset;
    let local_t = if span > 0.0 { (t - left.offset) / span } else { 0.0 };
    let inv = 1.0 - local_t;
    let mix = |c: usize| {
        (left.color[c] as f32 * inv + right.color[c] as f32 * local_t).round() as u8
    };
    Rgba([mix(0), mix(1), mix(2), mix(3)])
}

/// Linear gradient from the rect's top-left corner to its bottom-right corner.
fn paint_gradient(canvas: &mut RgbaImage, rect: Rect, stops: &[GradientStop]) {
    let (ax, ay) = (rect.left() as f32, rect.top() as f32);
    let (dx, dy) = (rect.width() as f32, rect.height() as f32);
    let len_sq = dx * dx + dy * dy;

    let x_end = (rect.right() + 1).clamp(0, canvas.width() as i32) as u32;
    let y_end = (rect.bottom() + 1).clamp(0, canvas.height() as i32) as u32;
    let x_range = rect.left().max(0) as u32..x_end;
    let y_range = rect.top().max(0) as u32..y_end;

    for y in y_range {
        for x in x_range.clone() {
            let px = x as f32 + 0.5 - ax;
            let py = y as f32 + 0.5 - ay;
            let t = if len_sq > 0.0 {
                ((px * dx + py * dy) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            canvas.put_pixel(x, y, sample_stops(stops, t));
        }
    }
}

fn paint_cover(canvas: &mut RgbaImage, rect: Rect, source: &DynamicImage) {
    match normalizer::cover(source, rect.width(), rect.height()) {
        Ok(covered) => imageops::overlay(canvas, &covered, rect.left() as i64, rect.top() as i64),
        // Unreachable for a decoded, non-empty image; leave the rect untouched
        Err(e) => warn!("Skipping custom background: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(canvas: &RgbaImage) -> Rect {
        Rect::at(0, 0).of_size(canvas.width(), canvas.height())
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#6c5ce7").unwrap(), Rgba([0x6c, 0x5c, 0xe7, 255]));
        assert_eq!(parse_hex_color("fff").unwrap(), Rgba([255, 255, 255, 255]));
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#gggggg").is_err());
        assert!(parse_hex_color("#ééé").is_err());
    }

    #[test]
    fn test_solid_fills_only_the_rect() {
        let mut canvas = RgbaImage::new(20, 20);
        let paint = Background::solid("#ff7675").unwrap().resolve();
        paint(&mut canvas, Rect::at(5, 5).of_size(10, 10));

        assert_eq!(canvas.get_pixel(5, 5), &Rgba([0xff, 0x76, 0x75, 255]));
        assert_eq!(canvas.get_pixel(14, 14), &Rgba([0xff, 0x76, 0x75, 255]));
        assert_eq!(canvas.get_pixel(4, 4), &Rgba([0, 0, 0, 0]));
        assert_eq!(canvas.get_pixel(15, 15), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_gradient_runs_corner_to_corner() {
        let black = Rgba([0, 0, 0, 255]);
        let white = Rgba([255, 255, 255, 255]);
        let mut canvas = RgbaImage::new(100, 100);
        let paint = Background::gradient(vec![
            GradientStop::new(0.0, black),
            GradientStop::new(1.0, white),
        ])
        .unwrap()
        .resolve();
        let rect = full(&canvas);
        paint(&mut canvas, rect);

        let tl = canvas.get_pixel(0, 0)[0];
        let center = canvas.get_pixel(50, 50)[0];
        let br = canvas.get_pixel(99, 99)[0];
        assert!(tl < 5, "top-left {}", tl);
        assert!(br > 250, "bottom-right {}", br);
        assert!((125..=131).contains(&center), "center {}", center);
        // Anti-diagonal pixels share the same projection
        assert_eq!(canvas.get_pixel(99, 0), canvas.get_pixel(0, 99));
    }

    #[test]
    fn test_gradient_with_middle_stop() {
        let stops = vec![
            GradientStop::new(0.0, Rgba([0, 0, 0, 255])),
            GradientStop::new(0.5, Rgba([200, 0, 0, 255])),
            GradientStop::new(1.0, Rgba([200, 200, 0, 255])),
        ];
        assert_eq!(sample_stops(&stops, 0.5), Rgba([200, 0, 0, 255]));
        assert_eq!(sample_stops(&stops, 0.75), Rgba([200, 100, 0, 255]));
        assert_eq!(sample_stops(&stops, 2.0), Rgba([200, 200, 0, 255]));
    }

    #[test]
    fn test_gradient_validation() {
        assert!(Background::gradient(vec![]).is_err());
        assert!(Background::gradient(vec![GradientStop::new(1.5, Rgba([0, 0, 0, 255]))]).is_err());
        assert!(Background::gradient(vec![
            GradientStop::new(0.8, Rgba([0, 0, 0, 255])),
            GradientStop::new(0.2, Rgba([0, 0, 0, 255])),
        ])
        .is_err());
    }

    #[test]
    fn test_custom_image_covers_rect_centered() {
        // 300x100 image into a 100x100 rect: only the middle third is visible
        let source = RgbaImage::from_fn(300, 100, |x, _| {
            if (100..200).contains(&x) {
                Rgba([0, 255, 0, 255])
            } else {
                Rgba([255, 0, 0, 255])
            }
        });
        let mut canvas = RgbaImage::new(100, 100);
        let paint = Background::custom(DynamicImage::ImageRgba8(source)).resolve();
        let rect = full(&canvas);
        paint(&mut canvas, rect);

        for p in canvas.pixels() {
            assert!(p[1] > 247 && p[0] < 8, "{:?}", p);
        }
    }

    #[test]
    fn test_custom_from_encoded_rejects_garbage() {
        let result = Background::custom_from_encoded(&Bytes::from_static(b"\x00\x01"));
        assert!(matches!(result, Err(StripError::DecodeFailure(_))));
    }

    #[test]
    fn test_default_is_solid_blue() {
        match Background::default() {
            Background::SolidColor(c) => assert_eq!(c, Rgba([0x6c, 0x5c, 0xe7, 0xff])),
            other => panic!("unexpected default background {:?}", other.kind()),
        }
    }
}

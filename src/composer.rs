//! ==============================================================================
//! composer.rs - burns the enriched view into a photo
//! ==============================================================================
//!
//! purpose:
//!     pure (base image, EnrichedView) -> new image. every size is a ratio of
//!     the base image so 640x360 previews and 4k captures look the same.
//!
//! layout:
//!
//! ```text
//!     ┌────────────────────────────────────────────────────┐
//!     │                                            [logo]  │
//!     │                                                    │
//!     │                          ╭──────────────────────╮  │
//!     │  Harvest Chamber         │ Carbon Dioxide:  440 │  │
//!     │  Day 45                  │    Temperature: 29.10│  │
//!     │                          ╰──────────────────────╯  │
//!     └────────────────────────────────────────────────────┘
//! ```
//!
//! elements:
//!     - name + age: bottom-left, outlined text
//!     - sensor panel: bottom-right, semi-transparent rounded box, labels
//!       right-aligned against the value column. no rows, no panel
//!     - logo (optional): scaled to a fraction of the width, partly
//!       transparent, in the configured corner
//!
//! compositing:
//!     everything is drawn onto one transparent layer which is composited
//!     over the base once, so overlapping elements never double-darken.
//!
//! relationships:
//!     - uses: text.rs (metrics + stroked text), config::StyleConfig
//!     - consumes: domain::EnrichedView from annotation.rs
//!
//! ==============================================================================

use crate::config::{LogoCorner, StyleConfig};
use crate::domain::EnrichedView;
use crate::text::{self, TextExtent, TextStyle};

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use rusttype::Font;
use std::path::{Path, PathBuf};

/// the rounded panel is rasterized this many times larger, then downsampled
const PANEL_SUPERSAMPLE: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("cannot read asset {path}: {source}")]
    AssetRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("not a usable font: {0}")]
    Font(PathBuf),
    #[error("cannot decode logo {path}: {source}")]
    Logo {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("cannot open base image {path}: {source}")]
    BaseImage {
        path: PathBuf,
        source: image::ImageError,
    },
}

// ==============================================================================
// style
// ==============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub name: Rgba<u8>,
    pub name_stroke: Rgba<u8>,
    pub age: Rgba<u8>,
    pub age_stroke: Rgba<u8>,
    pub sensor_label: Rgba<u8>,
    pub sensor_value: Rgba<u8>,
    pub panel_fill: Rgba<u8>,
    pub panel_outline: Rgba<u8>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            name: Rgba([137, 255, 142, 255]),
            name_stroke: Rgba([12, 33, 13, 255]),
            age: Rgba([247, 255, 158, 255]),
            age_stroke: Rgba([32, 33, 14, 255]),
            sensor_label: Rgba([191, 243, 255, 255]),
            sensor_value: Rgba([0, 208, 255, 255]),
            panel_fill: Rgba([0, 0, 0, 150]),
            panel_outline: Rgba([255, 255, 255, 255]),
        }
    }
}

/// sizes as fractions of the base image height unless the name says width
#[derive(Debug, Clone, Copy)]
pub struct LayoutRatios {
    pub name_font: f32,
    pub age_font: f32,
    pub sensor_font: f32,
    pub panel_interior_padding: f32,
    pub panel_margin: f32,
    pub panel_outline: f32,
    pub panel_radius_of_width: f32,
    /// stroke width = font px / this
    pub stroke_divisor: f32,
    pub logo_width_of_width: f32,
    pub logo_margin: f32,
    pub logo_opacity: f32,
}

impl Default for LayoutRatios {
    fn default() -> Self {
        Self {
            name_font: 0.03,
            age_font: 0.025,
            sensor_font: 0.0225,
            panel_interior_padding: 0.0175,
            panel_margin: 0.015,
            panel_outline: 0.001,
            panel_radius_of_width: 0.01,
            stroke_divisor: 5.0,
            logo_width_of_width: 0.12,
            logo_margin: 0.015,
            logo_opacity: 0.7,
        }
    }
}

pub struct FontSet {
    pub name: Font<'static>,
    pub age: Font<'static>,
    pub sensor: Font<'static>,
}

pub struct LogoMark {
    pub image: RgbaImage,
    pub corner: LogoCorner,
}

pub struct ComposerStyle {
    pub fonts: FontSet,
    pub palette: Palette,
    pub ratios: LayoutRatios,
    pub logo: Option<LogoMark>,
}

impl ComposerStyle {
    pub fn new(fonts: FontSet) -> Self {
        Self {
            fonts,
            palette: Palette::default(),
            ratios: LayoutRatios::default(),
            logo: None,
        }
    }

    pub fn with_logo(mut self, image: RgbaImage, corner: LogoCorner) -> Self {
        self.logo = Some(LogoMark { image, corner });
        self
    }

    /// read every asset named in the config. any missing asset fails the load
    pub fn load(config: &StyleConfig) -> Result<Self, ComposeError> {
        let fonts = FontSet {
            name: load_font(&config.name_font)?,
            age: load_font(&config.age_font)?,
            sensor: load_font(&config.sensor_font)?,
        };
        let mut style = Self::new(fonts);
        if let Some(path) = &config.logo {
            let image = image::open(path)
                .map_err(|source| ComposeError::Logo { path: path.clone(), source })?
                .to_rgba8();
            style = style.with_logo(image, config.logo_corner);
        }
        Ok(style)
    }
}

pub fn load_font(path: &Path) -> Result<Font<'static>, ComposeError> {
    let bytes = std::fs::read(path).map_err(|source| ComposeError::AssetRead {
        path: path.to_path_buf(),
        source,
    })?;
    Font::try_from_vec(bytes).ok_or_else(|| ComposeError::Font(path.to_path_buf()))
}

// ==============================================================================
// layout math
// ==============================================================================

/// where the name/age block goes
#[derive(Debug, Clone, PartialEq)]
pub struct NameBlockLayout {
    pub name_px: f32,
    pub age_px: f32,
    pub x: f32,
    pub name_baseline: f32,
    pub age_baseline: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    pub label_x: f32,
    pub value_x: f32,
    pub baseline: f32,
}

/// the sensor panel box plus where each row's strings start
#[derive(Debug, Clone, PartialEq)]
pub struct PanelLayout {
    pub font_px: f32,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub radius: u32,
    pub outline: u32,
    pub rows: Vec<RowLayout>,
}

pub struct ImageAnnotator {
    style: ComposerStyle,
}

impl ImageAnnotator {
    pub fn new(style: ComposerStyle) -> Self {
        Self { style }
    }

    /// open `path` and compose onto it
    pub fn annotate_file(&self, path: &Path, view: &EnrichedView) -> Result<RgbaImage, ComposeError> {
        let base = image::open(path)
            .map_err(|source| ComposeError::BaseImage { path: path.to_path_buf(), source })?
            .to_rgba8();
        Ok(self.compose(&base, view))
    }

    pub fn compose(&self, base: &RgbaImage, view: &EnrichedView) -> RgbaImage {
        let (width, height) = base.dimensions();
        let mut layer = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));

        self.draw_name_block(&mut layer, view);
        if let Some(layout) = self.panel_layout(width, height, view) {
            self.draw_panel(&mut layer, view, &layout);
        }
        if let Some(logo) = &self.style.logo {
            self.draw_logo(&mut layer, logo);
        }

        let mut out = base.clone();
        imageops::overlay(&mut out, &layer, 0, 0);
        out
    }

    pub fn name_block_layout(&self, height: u32, view: &EnrichedView) -> NameBlockLayout {
        let ratios = &self.style.ratios;
        let h = height as f32;
        let name_px = font_px(h * ratios.name_font);
        let age_px = font_px(h * ratios.age_font);
        let padding = (name_px / 2.0).floor();

        let age = text::measure(&self.style.fonts.age, age_px, &view.age_text());
        let name = text::measure(&self.style.fonts.name, name_px, &view.grow_system_name);

        // age sits on the bottom margin, the name one padding above its ink
        let age_baseline = h - padding - age.descent;
        let age_top = age_baseline - age.ascent;
        let name_baseline = age_top - padding - name.descent;

        NameBlockLayout {
            name_px,
            age_px,
            x: padding,
            name_baseline,
            age_baseline,
        }
    }

    /// `None` when there are no rows to show
    pub fn panel_layout(&self, width: u32, height: u32, view: &EnrichedView) -> Option<PanelLayout> {
        if view.rows.is_empty() {
            return None;
        }
        let ratios = &self.style.ratios;
        let font = &self.style.fonts.sensor;
        let h = height as f32;

        let font_px = font_px(h * ratios.sensor_font);
        let margin = (h * ratios.panel_margin).floor();
        let interior = (h * ratios.panel_interior_padding).floor();
        let row_spacing = (font_px / 2.0).floor();
        let gap = text::space_width(font, font_px);

        let extents: Vec<(TextExtent, TextExtent)> = view
            .rows
            .iter()
            .map(|row| (text::measure(font, font_px, &row.label), text::measure(font, font_px, &row.value)))
            .collect();

        let label_column = extents.iter().map(|(l, _)| l.width).fold(0.0, f32::max);
        let value_column = extents.iter().map(|(_, v)| v.width).fold(0.0, f32::max);

        let row_metrics: Vec<(f32, f32)> = extents
            .iter()
            .map(|(l, v)| (l.ascent.max(v.ascent), l.descent.max(v.descent)))
            .collect();
        let rows_height: f32 = row_metrics.iter().map(|(a, d)| a + d).sum();

        let panel_w = (2.0 * interior + label_column + value_column + gap).ceil() as u32;
        let panel_h = (2.0 * interior + rows_height + (view.rows.len() - 1) as f32 * row_spacing).ceil() as u32;
        let x = width as i64 - panel_w as i64 - margin as i64;
        let y = height as i64 - panel_h as i64 - margin as i64;

        let mut cursor = y as f32 + interior;
        let rows = extents
            .iter()
            .zip(&row_metrics)
            .map(|((label, _), (ascent, descent))| {
                let baseline = cursor + ascent;
                cursor += ascent + descent + row_spacing;
                RowLayout {
                    label_x: x as f32 + interior + (label_column - label.width),
                    value_x: x as f32 + interior + label_column + gap,
                    baseline,
                }
            })
            .collect();

        Some(PanelLayout {
            font_px,
            x,
            y,
            width: panel_w.max(1),
            height: panel_h.max(1),
            radius: (width as f32 * ratios.panel_radius_of_width).floor() as u32,
            outline: (h * ratios.panel_outline).round().max(1.0) as u32,
            rows,
        })
    }

    // ==========================================================================
    // drawing
    // ==========================================================================

    fn draw_name_block(&self, layer: &mut RgbaImage, view: &EnrichedView) {
        let layout = self.name_block_layout(layer.height(), view);
        let palette = &self.style.palette;
        let divisor = self.style.ratios.stroke_divisor;

        text::draw_text(
            layer,
            &self.style.fonts.name,
            layout.name_px,
            &view.grow_system_name,
            layout.x,
            layout.name_baseline,
            TextStyle {
                fill: palette.name,
                stroke: Some((palette.name_stroke, (layout.name_px / divisor) as u32)),
            },
        );
        text::draw_text(
            layer,
            &self.style.fonts.age,
            layout.age_px,
            &view.age_text(),
            layout.x,
            layout.age_baseline,
            TextStyle {
                fill: palette.age,
                stroke: Some((palette.age_stroke, (layout.age_px / divisor) as u32)),
            },
        );
    }

    fn draw_panel(&self, layer: &mut RgbaImage, view: &EnrichedView, layout: &PanelLayout) {
        let palette = &self.style.palette;
        let panel = rounded_panel(
            layout.width,
            layout.height,
            layout.radius,
            layout.outline,
            palette.panel_outline,
            palette.panel_fill,
        );
        imageops::overlay(layer, &panel, layout.x, layout.y);

        let font = &self.style.fonts.sensor;
        for (row, pos) in view.rows.iter().zip(&layout.rows) {
            text::draw_text(
                layer,
                font,
                layout.font_px,
                &row.label,
                pos.label_x,
                pos.baseline,
                TextStyle { fill: palette.sensor_label, stroke: None },
            );
            text::draw_text(
                layer,
                font,
                layout.font_px,
                &row.value,
                pos.value_x,
                pos.baseline,
                TextStyle { fill: palette.sensor_value, stroke: None },
            );
        }
    }

    fn draw_logo(&self, layer: &mut RgbaImage, logo: &LogoMark) {
        let ratios = &self.style.ratios;
        let (width, height) = layer.dimensions();
        let (logo_w, logo_h) = logo.image.dimensions();
        if logo_w == 0 || logo_h == 0 {
            return;
        }

        let target_w = (width as f32 * ratios.logo_width_of_width).round().max(1.0) as u32;
        let target_h = (logo_h as f32 * target_w as f32 / logo_w as f32).round().max(1.0) as u32;
        let mut scaled = imageops::resize(&logo.image, target_w, target_h, FilterType::Lanczos3);
        for p in scaled.pixels_mut() {
            p.0[3] = (p.0[3] as f32 * ratios.logo_opacity).round() as u8;
        }

        let margin = (height as f32 * ratios.logo_margin).floor() as i64;
        let right = width as i64 - target_w as i64 - margin;
        let bottom = height as i64 - target_h as i64 - margin;
        let (x, y) = match logo.corner {
            LogoCorner::TopLeft => (margin, margin),
            LogoCorner::TopRight => (right, margin),
            LogoCorner::BottomLeft => (margin, bottom),
            LogoCorner::BottomRight => (right, bottom),
        };
        imageops::overlay(layer, &scaled, x, y);
    }
}

/// font sizes are whole pixels, never below one
fn font_px(raw: f32) -> f32 {
    raw.floor().max(1.0)
}

/// anti-aliased rounded rectangle: drawn at PANEL_SUPERSAMPLE scale on a
/// transparent canvas, outline first then the fill inset by the outline
/// width, then downsampled
fn rounded_panel(
    width: u32,
    height: u32,
    radius: u32,
    outline: u32,
    outline_color: Rgba<u8>,
    fill: Rgba<u8>,
) -> RgbaImage {
    let s = PANEL_SUPERSAMPLE;
    let (big_w, big_h) = (width * s, height * s);
    let mut big = RgbaImage::from_pixel(big_w, big_h, Rgba([0, 0, 0, 0]));

    fill_rounded_rect(&mut big, 0, 0, big_w, big_h, radius * s, outline_color);
    let inset = outline * s;
    if big_w > 2 * inset && big_h > 2 * inset {
        fill_rounded_rect(
            &mut big,
            inset as i32,
            inset as i32,
            big_w - 2 * inset,
            big_h - 2 * inset,
            (radius * s).saturating_sub(inset),
            fill,
        );
    }

    imageops::resize(&big, width, height, FilterType::Lanczos3)
}

/// overwrites (does not blend) the pixels of a rounded rectangle
fn fill_rounded_rect(canvas: &mut RgbaImage, x: i32, y: i32, w: u32, h: u32, radius: u32, color: Rgba<u8>) {
    if w == 0 || h == 0 {
        return;
    }
    let r = radius.min(w / 2).min(h / 2);
    if r == 0 {
        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(w, h), color);
        return;
    }

    let ri = r as i32;
    if w > 2 * r {
        draw_filled_rect_mut(canvas, Rect::at(x + ri, y).of_size(w - 2 * r, h), color);
    }
    if h > 2 * r {
        draw_filled_rect_mut(canvas, Rect::at(x, y + ri).of_size(w, h - 2 * r), color);
    }

    let left = x + ri;
    let right = x + w as i32 - 1 - ri;
    let top = y + ri;
    let bottom = y + h as i32 - 1 - ri;
    for center in [(left, top), (right, top), (left, bottom), (right, bottom)] {
        draw_filled_circle_mut(canvas, center, ri, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DisplayRow;

    fn fonts() -> FontSet {
        let bold = include_bytes!("../assets/DejaVuSans-Bold.ttf");
        let mono = include_bytes!("../assets/DejaVuSansMono.ttf");
        FontSet {
            name: Font::try_from_bytes(bold).unwrap(),
            age: Font::try_from_bytes(bold).unwrap(),
            sensor: Font::try_from_bytes(mono).unwrap(),
        }
    }

    fn annotator() -> ImageAnnotator {
        ImageAnnotator::new(ComposerStyle::new(fonts()))
    }

    fn base(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([(x % 200) as u8 + 30, 90, (y % 100) as u8 + 60, 255]))
    }

    fn view(rows: Vec<(&str, &str)>) -> EnrichedView {
        EnrichedView {
            grow_system_name: "Harvest Chamber".to_string(),
            age_in_days: 45,
            rows: rows
                .into_iter()
                .map(|(label, value)| DisplayRow { label: label.to_string(), value: value.to_string() })
                .collect(),
        }
    }

    fn demo_rows() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Carbon Dioxide (PPM):", "    440"),
            ("Temperature (°C):", "  29.10"),
            ("Humidity (%):", "  46.30"),
            ("Soil Moisture (%):", "  60.40"),
        ]
    }

    fn region_equal(a: &RgbaImage, b: &RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
        (y0..y1).all(|y| (x0..x1).all(|x| a.get_pixel(x, y) == b.get_pixel(x, y)))
    }

    #[test]
    fn test_zero_rows_draws_no_panel() {
        let annotator = annotator();
        let img = base(640, 360);
        let out = annotator.compose(&img, &view(vec![]));

        assert!(annotator.panel_layout(640, 360, &view(vec![])).is_none());
        // right half is untouched, the name block changed the bottom-left
        assert!(region_equal(&img, &out, 320, 0, 640, 360));
        assert!(!region_equal(&img, &out, 0, 300, 320, 360));
    }

    #[test]
    fn test_rows_only_touch_panel_area() {
        let annotator = annotator();
        let img = base(640, 360);
        let without = annotator.compose(&img, &view(vec![]));
        let with = annotator.compose(&img, &view(demo_rows()));

        let layout = annotator.panel_layout(640, 360, &view(demo_rows())).unwrap();
        assert!(layout.x > 0 && layout.y > 0);
        let (px, py) = (layout.x as u32, layout.y as u32);

        // outside the panel box the two renders agree
        for (x, y, p) in with.enumerate_pixels() {
            let inside = x >= px && y >= py && x < px + layout.width && y < py + layout.height;
            if !inside {
                assert_eq!(p, without.get_pixel(x, y), "pixel ({}, {}) changed outside panel", x, y);
            }
        }
        assert!(!region_equal(&with, &without, px, py, px + layout.width, py + layout.height));
    }

    #[test]
    fn test_compose_is_deterministic_and_keeps_size() {
        let annotator = annotator();
        let img = base(400, 300);
        let a = annotator.compose(&img, &view(demo_rows()));
        let b = annotator.compose(&img, &view(demo_rows()));
        assert_eq!(a.dimensions(), (400, 300));
        assert_eq!(a, b);
        assert_ne!(a, img);
    }

    #[test]
    fn test_panel_is_flush_with_bottom_right_margin() {
        let annotator = annotator();
        let layout = annotator.panel_layout(1920, 1080, &view(demo_rows())).unwrap();
        let margin = (1080.0f32 * 0.015).floor() as i64;
        assert_eq!(layout.x + layout.width as i64, 1920 - margin);
        assert_eq!(layout.y + layout.height as i64, 1080 - margin);
        assert_eq!(layout.rows.len(), 4);

        // rows stack top to bottom in order, values share one column
        for pair in layout.rows.windows(2) {
            assert!(pair[1].baseline > pair[0].baseline);
            assert_eq!(pair[0].value_x, pair[1].value_x);
        }
        // the longest label starts at the interior padding
        let interior = (1080.0f32 * 0.0175).floor();
        assert_eq!(layout.rows[0].label_x, layout.x as f32 + interior);
    }

    #[test]
    fn test_layout_scales_with_resolution() {
        let annotator = annotator();
        let small = annotator.panel_layout(1920, 1080, &view(demo_rows())).unwrap();
        let large = annotator.panel_layout(3840, 2160, &view(demo_rows())).unwrap();

        let ratio_w = large.width as f32 / small.width as f32;
        let ratio_h = large.height as f32 / small.height as f32;
        assert!((ratio_w - 2.0).abs() < 0.1, "width ratio {}", ratio_w);
        assert!((ratio_h - 2.0).abs() < 0.1, "height ratio {}", ratio_h);
        assert_eq!(large.radius, 38);
        assert_eq!(small.radius, 19);

        let small_name = annotator.name_block_layout(1080, &view(vec![]));
        let large_name = annotator.name_block_layout(2160, &view(vec![]));
        assert_eq!(small_name.name_px, 32.0);
        assert_eq!(large_name.name_px, 64.0);
        assert!(large_name.name_baseline < large_name.age_baseline);
        assert!(large_name.age_baseline < 2160.0);
    }

    #[test]
    fn test_long_strings_grow_the_panel() {
        let annotator = annotator();
        let short = annotator.panel_layout(1920, 1080, &view(vec![("A:", "      1")])).unwrap();
        let long = annotator
            .panel_layout(1920, 1080, &view(vec![("A much longer sensor label:", "123456789012")]))
            .unwrap();
        assert!(long.width > short.width);
    }

    #[test]
    fn test_logo_lands_in_corner() {
        let style = ComposerStyle::new(fonts())
            .with_logo(RgbaImage::from_pixel(50, 25, Rgba([255, 0, 0, 255])), LogoCorner::TopRight);
        let annotator = ImageAnnotator::new(style);
        let img = RgbaImage::from_pixel(400, 200, Rgba([0, 0, 255, 255]));
        let out = annotator.compose(&img, &view(vec![]));

        // 0.12 * 400 = 48 wide, margin 3; centre of the logo is reddish
        let centre = out.get_pixel(400 - 3 - 24, 3 + 12);
        assert!(centre.0[0] > 150 && centre.0[2] < 120, "got {:?}", centre);
        // still partly see-through
        assert!(centre.0[2] > 0);
        // top-left corner untouched
        assert_eq!(out.get_pixel(5, 5), img.get_pixel(5, 5));
    }

    #[test]
    fn test_rounded_panel_corners_are_transparent() {
        let panel = rounded_panel(100, 50, 10, 1, Rgba([255, 255, 255, 255]), Rgba([0, 0, 0, 150]));
        assert_eq!(panel.dimensions(), (100, 50));
        assert!(panel.get_pixel(0, 0).0[3] < 20);
        assert!(panel.get_pixel(99, 49).0[3] < 20);
        let centre = panel.get_pixel(50, 25);
        assert!((centre.0[3] as i32 - 150).abs() <= 3);
    }

    #[test]
    fn test_missing_base_image_is_error() {
        let err = annotator()
            .annotate_file(Path::new("/no/such/capture.jpg"), &view(vec![]))
            .unwrap_err();
        assert!(matches!(err, ComposeError::BaseImage { .. }));
    }

    #[test]
    fn test_missing_font_is_error() {
        let config = StyleConfig {
            name_font: PathBuf::from("/no/such/font.ttf"),
            ..StyleConfig::default()
        };
        assert!(matches!(ComposerStyle::load(&config), Err(ComposeError::AssetRead { .. })));
    }
}

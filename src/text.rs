//! ==============================================================================
//! text.rs - glyph measurement and stroked text rendering
//! ==============================================================================
//!
//! purpose:
//!     the composer positions everything from text metrics, so measuring and
//!     drawing share one layout path here.
//!
//! conventions:
//!     - origin is the pen position on the baseline
//!     - width is the advance width (leading spaces count, so space-padded
//!       value strings line up as columns)
//!     - ascent / descent are ink extents above / below the baseline
//!
//! ==============================================================================

use image::{GrayImage, Luma, Pixel, Rgba, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use rusttype::{point, Font, PositionedGlyph, Scale};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextExtent {
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl TextExtent {
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub fill: Rgba<u8>,
    /// outline color and width in pixels
    pub stroke: Option<(Rgba<u8>, u32)>,
}

fn layout<'f>(font: &'f Font<'static>, px: f32, text: &str) -> Vec<PositionedGlyph<'f>> {
    font.layout(text, Scale::uniform(px), point(0.0, 0.0)).collect()
}

/// union of glyph pixel boxes relative to the origin: (min_x, min_y, max_x, max_y)
fn ink_bounds(glyphs: &[PositionedGlyph<'_>]) -> Option<(i32, i32, i32, i32)> {
    glyphs
        .iter()
        .filter_map(|g| g.pixel_bounding_box())
        .fold(None, |acc, bb| {
            Some(match acc {
                None => (bb.min.x, bb.min.y, bb.max.x, bb.max.y),
                Some((x0, y0, x1, y1)) => (x0.min(bb.min.x), y0.min(bb.min.y), x1.max(bb.max.x), y1.max(bb.max.y)),
            })
        })
}

pub fn measure(font: &Font<'static>, px: f32, text: &str) -> TextExtent {
    let glyphs = layout(font, px, text);
    let width = glyphs
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0);
    match ink_bounds(&glyphs) {
        Some((_, min_y, _, max_y)) => TextExtent {
            width,
            ascent: (-min_y).max(0) as f32,
            descent: max_y.max(0) as f32,
        },
        None => TextExtent { width, ..Default::default() },
    }
}

pub fn space_width(font: &Font<'static>, px: f32) -> f32 {
    font.glyph(' ').scaled(Scale::uniform(px)).h_metrics().advance_width
}

/// draw `text` with its pen origin at (x, baseline), blending onto `layer`
pub fn draw_text(
    layer: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    text: &str,
    x: f32,
    baseline: f32,
    style: TextStyle,
) {
    let glyphs = layout(font, px, text);
    let Some((min_x, min_y, max_x, max_y)) = ink_bounds(&glyphs) else {
        return;
    };

    let stroke_width = style.stroke.map(|(_, w)| w.min(u8::MAX as u32)).unwrap_or(0);
    let pad = stroke_width as i32 + 1;
    let mut mask = GrayImage::new((max_x - min_x + 2 * pad) as u32, (max_y - min_y + 2 * pad) as u32);

    for glyph in &glyphs {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, v| {
            let mx = (gx as i32 + bb.min.x - min_x + pad) as u32;
            let my = (gy as i32 + bb.min.y - min_y + pad) as u32;
            let coverage = (v * 255.0).round().clamp(0.0, 255.0) as u8;
            let cell = mask.get_pixel_mut(mx, my);
            cell.0[0] = cell.0[0].max(coverage);
        });
    }

    let origin_x = x.round() as i32 + min_x - pad;
    let origin_y = baseline.round() as i32 + min_y - pad;

    if let Some((stroke_color, _)) = style.stroke {
        if stroke_width > 0 {
            let outline = stroke_mask(&mask, stroke_width as u8);
            blend_mask(layer, &outline, origin_x, origin_y, stroke_color);
        }
    }
    blend_mask(layer, &mask, origin_x, origin_y, style.fill);
}

/// grow the glyph mask into a pen outline. diamond then square gives an
/// octagonal pen, close enough to round at these sizes
fn stroke_mask(mask: &GrayImage, width: u8) -> GrayImage {
    let diamond = width / 2;
    let square = width - diamond;
    let mut grown = mask.clone();
    if diamond > 0 {
        grown = dilate(&grown, Norm::L1, diamond);
    }
    if square > 0 {
        grown = dilate(&grown, Norm::LInf, square);
    }
    imageproc::filter::gaussian_blur_f32(&grown, 0.6)
}

fn blend_mask(layer: &mut RgbaImage, mask: &GrayImage, origin_x: i32, origin_y: i32, color: Rgba<u8>) {
    let (w, h) = layer.dimensions();
    for (mx, my, Luma([coverage])) in mask.enumerate_pixels() {
        if *coverage == 0 {
            continue;
        }
        let lx = origin_x + mx as i32;
        let ly = origin_y + my as i32;
        if lx < 0 || ly < 0 || lx >= w as i32 || ly >= h as i32 {
            continue;
        }
        let alpha = (color.0[3] as u32 * *coverage as u32 / 255) as u8;
        let src = Rgba([color.0[0], color.0[1], color.0[2], alpha]);
        layer.get_pixel_mut(lx as u32, ly as u32).blend(&src);
    }
}

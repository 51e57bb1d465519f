use super::{AnnotateError, ChannelOrder, PixelBuffer};
use crate::detection::RawDetectionResult;
use crate::labels::ClassNames;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

/// Box colors, indexed by class.
pub const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub fn class_color(class_index: u32) -> Rgb<u8> {
    Rgb(PALETTE[class_index as usize % PALETTE.len()])
}

/// Border thickness scaled with the image size, at least 2px.
pub fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

/// Draws detections onto a copy of the source image.
pub trait Render: Send + Sync {
    fn render(
        &self,
        raw: &RawDetectionResult,
        names: &ClassNames,
    ) -> Result<PixelBuffer, AnnotateError>;
}

/// Colored boxes with a `label confidence` strip above each box.
///
/// Text is only drawn when a font is configured; without one the boxes are
/// still rendered.
#[derive(Clone, Default)]
pub struct BoxRenderer {
    font: Option<FontArc>,
    output_order: ChannelOrder,
}

impl BoxRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_font_file(self, path: &Path) -> Result<Self, AnnotateError> {
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| AnnotateError::Render(format!("invalid font {}: {}", path.display(), e)))?;
        Ok(self.with_font(font))
    }

    /// Channel order of the produced buffer.
    pub fn with_output_order(mut self, order: ChannelOrder) -> Self {
        self.output_order = order;
        self
    }

    fn draw_label(&self, canvas: &mut RgbImage, bbox: (i32, i32, i32), color: Rgb<u8>, text: &str) {
        let Some(font) = &self.font else {
            return;
        };
        let (x1, y1, lw) = bbox;

        let scale = PxScale::from(((lw * 6).max(12)) as f32);
        let (text_w, text_h) = text_size(scale, font, text);
        let strip_h = text_h as i32 + lw;

        // Above the box when there is room, otherwise just inside its top edge
        let strip_y = if y1 >= strip_h { y1 - strip_h } else { y1 };
        let strip = Rect::at(x1, strip_y).of_size(text_w + lw as u32, strip_h as u32);

        draw_filled_rect_mut(canvas, strip, color);
        draw_text_mut(canvas, TEXT_COLOR, x1 + lw / 2, strip_y + lw / 2, scale, font, text);
    }
}

impl Render for BoxRenderer {
    fn render(
        &self,
        raw: &RawDetectionResult,
        names: &ClassNames,
    ) -> Result<PixelBuffer, AnnotateError> {
        let (width, height) = raw.image.dimensions();
        if width == 0 || height == 0 {
            return Err(AnnotateError::Render(format!(
                "cannot annotate an empty {}x{} image",
                width, height
            )));
        }

        let mut canvas = raw.image.clone();
        let lw = line_width(width, height);
        draw_boxes(&mut canvas, raw, lw)?;

        for record in &raw.records {
            let label = format!("{} {:.2}", names.label(record.class_index), record.confidence);
            let origin = (record.bbox[0].round() as i32, record.bbox[1].round() as i32, lw as i32);
            self.draw_label(&mut canvas, origin, class_color(record.class_index), &label);
        }

        Ok(PixelBuffer::from_rgb_image(canvas).into_order(self.output_order))
    }
}

/// Draw every record as a hollow box `lw` pixels thick, in place.
pub(crate) fn draw_boxes(
    canvas: &mut RgbImage,
    raw: &RawDetectionResult,
    lw: u32,
) -> Result<(), AnnotateError> {
    for record in &raw.records {
        if record.bbox.iter().any(|v| !v.is_finite()) {
            return Err(AnnotateError::Render(format!(
                "non-finite box {:?}",
                record.bbox
            )));
        }

        let [x1, y1, x2, y2] = record.bbox.map(|v| v.round() as i32);
        let color = class_color(record.class_index);

        for inset in 0..lw as i32 {
            let w = x2 - x1 - 2 * inset;
            let h = y2 - y1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }
    Ok(())
}

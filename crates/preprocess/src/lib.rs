//! Letterbox preprocessing for square-input detectors.
//!
//! Source pixels are scaled to fit the model input while keeping their aspect
//! ratio, centered on a gray canvas and converted to an NCHW `f32` tensor.
//! [`LetterboxTransform`] maps model-space coordinates back onto the source.

pub mod cpu;

use ndarray::{Array, IxDyn};

pub use cpu::CpuPreProcessor;

/// Largest accepted model input side, in pixels.
pub const MAX_INPUT_SIZE: u32 = 4096;

/// Padding value used around the resized image.
pub const LETTERBOX_COLOR: u8 = 114;

/// Parameters needed to undo a letterbox resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub orig_width: u32,
    pub orig_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    /// Scale factor applied to the source image
    pub scale: f32,
    /// Horizontal padding on the left edge (in input pixels)
    pub offset_x: f32,
    /// Vertical padding on the top edge (in input pixels)
    pub offset_y: f32,
}

impl LetterboxTransform {
    /// Map a point from model-input space back onto the source image,
    /// clamped to the source bounds.
    #[inline]
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.offset_x) / self.scale).clamp(0.0, self.orig_width as f32);
        let sy = ((y - self.offset_y) / self.scale).clamp(0.0, self.orig_height as f32);
        (sx, sy)
    }

    /// Map an `[x1, y1, x2, y2]` box from model-input space onto the source image.
    pub fn box_to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
        let (x1, y1) = self.to_source(bbox[0], bbox[1]);
        let (x2, y2) = self.to_source(bbox[2], bbox[3]);
        [x1, y1, x2, y2]
    }
}

/// Preprocessed tensor plus the transform that produced it.
#[derive(Debug)]
pub struct PreprocessResult {
    /// `[1, 3, H, W]` input tensor
    pub tensor: Array<f32, IxDyn>,
    pub transform: LetterboxTransform,
}

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Preprocess an RGB image given as packed HWC bytes.
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult>;

    /// Get the input size this preprocessor targets
    fn input_size(&self) -> (u32, u32);
}

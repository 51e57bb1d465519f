use crate::{LETTERBOX_COLOR, LetterboxTransform, MAX_INPUT_SIZE, Preprocess, PreprocessResult};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};

pub struct CpuPreProcessor {
    pub input_size: (u32, u32),
    letterboxed_buffer: Vec<u8>,
}

impl CpuPreProcessor {
    /// Fails when either side is zero or larger than [`MAX_INPUT_SIZE`].
    pub fn new(input_size: (u32, u32)) -> anyhow::Result<Self> {
        let (width, height) = input_size;
        if !(1..=MAX_INPUT_SIZE).contains(&width) || !(1..=MAX_INPUT_SIZE).contains(&height) {
            anyhow::bail!(
                "Input size {}x{} outside 1..={}",
                width,
                height,
                MAX_INPUT_SIZE
            );
        }
        let len = rgb_len(width, height)
            .ok_or_else(|| anyhow::anyhow!("Input size {}x{} overflows", width, height))?;

        Ok(Self {
            input_size,
            letterboxed_buffer: vec![LETTERBOX_COLOR; len],
        })
    }

    fn resize_and_letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<LetterboxTransform> {
        let _s = span!("resize_and_letterbox");

        let (input_width, input_height) = self.input_size;
        let scale = (input_width as f32 / width as f32).min(input_height as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, input_width);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, input_height);

        let offset_x = (input_width - new_width) / 2;
        let offset_y = (input_height - new_height) / 2;

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;

        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = input_width * 3;
        let row_bytes = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        Ok(LetterboxTransform {
            orig_width: width,
            orig_height: height,
            input_width,
            input_height,
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        })
    }

    fn normalize(&self) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let (width, height) = (self.input_size.0 as usize, self.input_size.1 as usize);
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.letterboxed_buffer.chunks_exact(3).enumerate() {
            for c in 0..3 {
                output[i + c * spatial] = px[c] as f32 / 255.0;
            }
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Preprocess for CpuPreProcessor {
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("preprocess_image");

        tracing::trace!(
            width,
            height,
            pixel_bytes = pixels.len(),
            "Preprocessing image dimensions"
        );

        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        let expected_size = rgb_len(width, height)
            .ok_or_else(|| anyhow::anyhow!("Image {}x{} is too large", width, height))?;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {}, got {} bytes",
                expected_size,
                pixels.len()
            );
        }

        let transform = self.resize_and_letterbox(pixels, width, height)?;
        let tensor = self.normalize()?;

        Ok(PreprocessResult { tensor, transform })
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}

/// Byte length of a packed RGB image.
fn rgb_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(3)
}

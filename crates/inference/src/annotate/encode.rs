use super::{AnnotateError, ChannelOrder, PixelBuffer};
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

/// JPEG encoder for rendered pixel buffers.
pub trait Encoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Channel order the encoder expects its input in.
    fn channel_order(&self) -> ChannelOrder;

    fn encode_jpeg(&self, pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>, AnnotateError>;
}

fn check_order(encoder: &dyn Encoder, pixels: &PixelBuffer) -> Result<(), AnnotateError> {
    if pixels.order != encoder.channel_order() {
        return Err(AnnotateError::Encode {
            encoder: encoder.name(),
            source: anyhow::anyhow!(
                "expected {:?} pixels, got {:?}",
                encoder.channel_order(),
                pixels.order
            ),
        });
    }
    Ok(())
}

/// Pure-Rust encoder from the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateEncoder;

impl Encoder for ImageCrateEncoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn encode_jpeg(&self, pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>, AnnotateError> {
        check_order(self, pixels)?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(&pixels.data, pixels.width, pixels.height, ExtendedColorType::Rgb8)
            .map_err(|e| AnnotateError::Encode {
                encoder: self.name(),
                source: e.into(),
            })?;
        Ok(jpeg)
    }
}

/// libjpeg-turbo encoder fed with BGR pixels.
#[cfg(feature = "native-jpeg")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TurboJpegEncoder;

#[cfg(feature = "native-jpeg")]
impl Encoder for TurboJpegEncoder {
    fn name(&self) -> &'static str {
        "turbojpeg"
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Bgr
    }

    fn encode_jpeg(&self, pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>, AnnotateError> {
        check_order(self, pixels)?;

        let width = pixels.width as usize;
        let image = turbojpeg::Image {
            pixels: pixels.data.as_slice(),
            width,
            pitch: width * 3,
            height: pixels.height as usize,
            format: turbojpeg::PixelFormat::BGR,
        };

        let jpeg = turbojpeg::compress(image, i32::from(quality), turbojpeg::Subsamp::Sub2x2)
            .map_err(|e| AnnotateError::Encode {
                encoder: self.name(),
                source: e.into(),
            })?;
        Ok(jpeg.to_vec())
    }
}

/// The native encoder compiled into this build, if any.
pub fn native_encoder() -> Option<Box<dyn Encoder>> {
    #[cfg(feature = "native-jpeg")]
    {
        Some(Box::new(TurboJpegEncoder))
    }
    #[cfg(not(feature = "native-jpeg"))]
    {
        None
    }
}

//! Annotated image persistence.
//!
//! [`AnnotatedImageWriter::write`] tries three strategies in order and stops
//! at the first that produces `{output_dir}/{stem}_annot.jpg`:
//!
//! 1. render, then encode with the native encoder
//! 2. encode the same rendered buffer with the `image` crate
//! 3. save through a [`BatchSave`] into a scratch run directory and copy the
//!    newest file a [`ScratchScanner`] finds in that run directory
//!
//! A strategy only runs when the previous one failed with a recoverable
//! [`AnnotateError`]. Failures never reach the caller; they surface as `None`.

pub mod encode;
pub mod render;
pub mod scratch;

pub use encode::{Encoder, ImageCrateEncoder, native_encoder};
pub use render::{BoxRenderer, Render};
pub use scratch::{BatchSave, ModifiedTimeScanner, RunDirectorySaver, ScratchScanner};

use crate::detection::RawDetectionResult;
use crate::labels::ClassNames;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Suffix appended to the source stem for the annotated artifact.
pub const ANNOTATED_SUFFIX: &str = "_annot.jpg";

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("No native JPEG encoder in this build")]
    EncoderUnavailable,

    #[error("{encoder} encoder failed: {source}")]
    Encode {
        encoder: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Batch save failed: {0}")]
    BatchSave(#[source] anyhow::Error),

    #[error("Scratch scan failed: {0}")]
    Scan(String),

    #[error("No saved prediction under {0}")]
    ScratchEmpty(PathBuf),

    #[error("Source path has no file stem: {0}")]
    InvalidSource(PathBuf),
}

impl AnnotateError {
    /// Whether a later strategy may still succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AnnotateError::InvalidSource(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Packed 8-bit, 3-channel pixels tagged with their channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub order: ChannelOrder,
}

impl PixelBuffer {
    pub fn from_rgb_image(image: RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
            order: ChannelOrder::Rgb,
        }
    }

    /// Reorder channels in place when `order` differs from the current one.
    pub fn into_order(mut self, order: ChannelOrder) -> Self {
        if self.order != order {
            for px in self.data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            self.order = order;
        }
        self
    }
}

/// Which strategy produced the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Native,
    Generic,
    Scratch,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Native => "native",
            Tier::Generic => "generic",
            Tier::Scratch => "scratch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedArtifact {
    pub path: PathBuf,
    pub tier: Tier,
}

pub struct AnnotatedImageWriter {
    renderer: Box<dyn Render>,
    native_encoder: Option<Box<dyn Encoder>>,
    fallback_encoder: ImageCrateEncoder,
    batch_saver: Box<dyn BatchSave>,
    scanner: Box<dyn ScratchScanner>,
    jpeg_quality: u8,
}

impl AnnotatedImageWriter {
    /// Writer with the default renderer, the build's native encoder and a
    /// run-directory saver rooted at `scratch_root`.
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            renderer: Box::new(BoxRenderer::new()),
            native_encoder: native_encoder(),
            fallback_encoder: ImageCrateEncoder,
            batch_saver: Box::new(RunDirectorySaver::new(scratch_root)),
            scanner: Box::new(ModifiedTimeScanner),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_renderer(mut self, renderer: impl Render + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_native_encoder(mut self, encoder: Option<Box<dyn Encoder>>) -> Self {
        self.native_encoder = encoder;
        self
    }

    pub fn with_batch_saver(mut self, saver: impl BatchSave + 'static) -> Self {
        self.batch_saver = Box::new(saver);
        self
    }

    pub fn with_scanner(mut self, scanner: impl ScratchScanner + 'static) -> Self {
        self.scanner = Box::new(scanner);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Persist the annotated image; `None` when every strategy failed.
    pub fn write(
        &self,
        raw: &RawDetectionResult,
        names: &ClassNames,
        output_dir: &Path,
    ) -> Option<PathBuf> {
        self.write_artifact(raw, names, output_dir)
            .map(|artifact| artifact.path)
    }

    /// Like [`write`](Self::write), also reporting the strategy that succeeded.
    #[tracing::instrument(skip_all, fields(source = %raw.source_path.display()))]
    pub fn write_artifact(
        &self,
        raw: &RawDetectionResult,
        names: &ClassNames,
        output_dir: &Path,
    ) -> Option<AnnotatedArtifact> {
        let target = match annotated_path(&raw.source_path, output_dir) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping annotation");
                return None;
            }
        };

        if let Err(e) = fs::create_dir_all(output_dir) {
            tracing::warn!(
                error = %e,
                dir = %output_dir.display(),
                "Cannot create output directory"
            );
            return None;
        }

        match self.render_and_encode(raw, names, &target) {
            Ok(tier) => return Some(AnnotatedArtifact { path: target, tier }),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Rendering failed, falling back to batch save");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Annotation aborted");
                return None;
            }
        }

        match self.copy_from_scratch(raw, names, &target) {
            Ok(()) => Some(AnnotatedArtifact {
                path: target,
                tier: Tier::Scratch,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Annotated image could not be written");
                None
            }
        }
    }

    fn render_and_encode(
        &self,
        raw: &RawDetectionResult,
        names: &ClassNames,
        target: &Path,
    ) -> Result<Tier, AnnotateError> {
        let buffer = self.renderer.render(raw, names)?;

        match self.encode_native(&buffer) {
            Ok(jpeg) => {
                fs::write(target, jpeg)?;
                return Ok(Tier::Native);
            }
            Err(e) if e.is_recoverable() => {
                tracing::debug!(error = %e, "Native encoder unusable, using image crate");
            }
            Err(e) => return Err(e),
        }

        let pixels = buffer.into_order(self.fallback_encoder.channel_order());
        let jpeg = self.fallback_encoder.encode_jpeg(&pixels, self.jpeg_quality)?;
        fs::write(target, jpeg)?;
        Ok(Tier::Generic)
    }

    fn encode_native(&self, buffer: &PixelBuffer) -> Result<Vec<u8>, AnnotateError> {
        let encoder = self
            .native_encoder
            .as_deref()
            .ok_or(AnnotateError::EncoderUnavailable)?;

        let pixels = buffer.clone().into_order(encoder.channel_order());
        encoder.encode_jpeg(&pixels, self.jpeg_quality)
    }

    fn copy_from_scratch(
        &self,
        raw: &RawDetectionResult,
        names: &ClassNames,
        target: &Path,
    ) -> Result<(), AnnotateError> {
        let saved = self.batch_saver.save_batch(raw, names)?;

        // Only this call's run directory; siblings belong to concurrent writes
        let run_dir = saved
            .parent()
            .unwrap_or_else(|| self.batch_saver.scratch_root());
        let newest = self
            .scanner
            .newest_file(run_dir)?
            .ok_or_else(|| AnnotateError::ScratchEmpty(run_dir.to_path_buf()))?;

        fs::copy(&newest, target)?;
        tracing::debug!(from = %newest.display(), "Copied scratch prediction");
        Ok(())
    }
}

/// `{output_dir}/{stem}_annot.jpg` for `source`.
pub fn annotated_path(source: &Path, output_dir: &Path) -> Result<PathBuf, AnnotateError> {
    let stem = source
        .file_stem()
        .ok_or_else(|| AnnotateError::InvalidSource(source.to_path_buf()))?;
    Ok(output_dir.join(format!("{}{}", stem.to_string_lossy(), ANNOTATED_SUFFIX)))
}

use crate::annotate::{AnnotatedImageWriter, BoxRenderer};
use crate::config::InferenceConfig;
use crate::error::InferenceError;
use crate::extract::{CountsMap, extract};
use crate::metrics::PipelineMetrics;
use crate::model::{DetectionSettings, ModelHandle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Counts plus the annotated image of one prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceOutcome {
    pub counts: CountsMap,
    /// `None` when no annotated image could be written
    pub annotated_path: Option<PathBuf>,
}

/// Detect once, then derive counts and the annotated image from the same result.
pub struct InferencePipeline {
    settings: DetectionSettings,
    writer: AnnotatedImageWriter,
    metrics: PipelineMetrics,
}

impl InferencePipeline {
    pub fn new(settings: DetectionSettings, writer: AnnotatedImageWriter) -> Self {
        Self {
            settings,
            writer,
            metrics: PipelineMetrics::default(),
        }
    }

    /// Build the writer from configuration. A label font that cannot be
    /// loaded only disables label text.
    pub fn from_config(config: &InferenceConfig) -> Self {
        let mut renderer = BoxRenderer::new();
        if let Some(font_path) = &config.label_font_path {
            match renderer.clone().with_font_file(font_path) {
                Ok(with_font) => renderer = with_font,
                Err(e) => tracing::warn!(
                    error = %e,
                    path = %font_path.display(),
                    "Label font unavailable, drawing boxes only"
                ),
            }
        }

        let writer = AnnotatedImageWriter::new(&config.scratch_dir)
            .with_renderer(renderer)
            .with_jpeg_quality(config.jpeg_quality);

        Self::new(config.detection, writer)
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Run one prediction.
    ///
    /// Detection failures abort the call. Annotation failures do not: the
    /// outcome then carries counts without an annotated path.
    #[tracing::instrument(skip_all, fields(image = %image_path.display()))]
    pub fn run_inference(
        &self,
        model: &ModelHandle,
        image_path: &Path,
        output_dir: &Path,
    ) -> Result<InferenceOutcome, InferenceError> {
        let start = Instant::now();

        let raw = model.detect(image_path, &self.settings).inspect_err(|e| {
            tracing::error!(error = %e, "Detection failed");
            self.metrics.record_failure();
        })?;

        let counts = extract(&raw, model.class_names());
        let artifact = self.writer.write_artifact(&raw, model.class_names(), output_dir);

        self.metrics.record_success(
            start.elapsed(),
            raw.len(),
            artifact.as_ref().map(|a| a.tier),
        );

        tracing::info!(
            detections = raw.len(),
            classes = counts.len(),
            annotated = artifact.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inference complete"
        );

        Ok(InferenceOutcome {
            counts,
            annotated_path: artifact.map(|a| a.path),
        })
    }
}

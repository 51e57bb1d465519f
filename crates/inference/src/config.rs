use crate::annotate::DEFAULT_JPEG_QUALITY;
use crate::model::DetectionSettings;
use preprocess::MAX_INPUT_SIZE;
use std::path::PathBuf;

pub use common::{EnvLookup, Environment};

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub weights_dir: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub detection: DetectionSettings,
    pub jpeg_quality: u8,
    pub label_font_path: Option<PathBuf>,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&EnvLookup::process())
    }

    pub fn from_lookup(lookup: &EnvLookup) -> anyhow::Result<Self> {
        let defaults = DetectionSettings::default();

        let config = Self {
            environment: Environment::from_lookup(lookup),
            otel_endpoint: lookup.get("OTEL_ENDPOINT"),
            weights_dir: lookup.string_or("WEIGHTS_DIR", "weights").into(),
            labels_path: lookup.get("LABELS_PATH").map(PathBuf::from),
            output_dir: lookup.string_or("OUTPUT_DIR", "predicted_results").into(),
            scratch_dir: lookup.string_or("SCRATCH_DIR", "runs/detect").into(),
            detection: DetectionSettings {
                confidence_threshold: lookup
                    .parse_or("CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
                iou_threshold: lookup.parse_or("IOU_THRESHOLD", defaults.iou_threshold),
                input_size: lookup.parse_or("INPUT_SIZE", defaults.input_size),
                max_detections: lookup.parse_or("MAX_DETECTIONS", defaults.max_detections),
            },
            jpeg_quality: lookup.parse_or("JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
            label_font_path: lookup.get("LABEL_FONT_PATH").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let DetectionSettings {
            confidence_threshold,
            iou_threshold,
            max_detections,
            ..
        } = self.detection;

        if !(confidence_threshold > 0.0 && confidence_threshold < 1.0) {
            anyhow::bail!(
                "CONFIDENCE_THRESHOLD must be in (0, 1), got {}",
                confidence_threshold
            );
        }
        if !(iou_threshold > 0.0 && iou_threshold <= 1.0) {
            anyhow::bail!("IOU_THRESHOLD must be in (0, 1], got {}", iou_threshold);
        }
        if max_detections == 0 {
            anyhow::bail!("MAX_DETECTIONS must be at least 1");
        }
        if self.detection.input_size > MAX_INPUT_SIZE {
            anyhow::bail!(
                "INPUT_SIZE must be at most {}, got {}",
                MAX_INPUT_SIZE,
                self.detection.input_size
            );
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            anyhow::bail!("JPEG_QUALITY must be in 1..=100, got {}", self.jpeg_quality);
        }
        Ok(())
    }
}

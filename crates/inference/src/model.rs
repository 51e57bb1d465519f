use crate::backend::DetectionBackend;
use crate::detection::RawDetectionResult;
use crate::error::InferenceError;
use crate::labels::{ClassNames, parse_imgsz};
use crate::processing::PostProcessor;
use image::{ImageReader, RgbImage};
use preprocess::{CpuPreProcessor, MAX_INPUT_SIZE, Preprocess, PreprocessResult};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Model stride; input sizes are rounded up to a multiple of it.
pub const MODEL_STRIDE: u32 = 32;

/// Input size used when neither the caller nor the model names one.
pub const FALLBACK_INPUT_SIZE: u32 = 640;

/// Labels file looked up next to the checkpoint when the model carries no names.
const SIDECAR_LABELS: &str = "labels.txt";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square input size; `0` selects the model's native size
    pub input_size: u32,
    pub max_detections: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.184,
            iou_threshold: 0.7,
            input_size: 960,
            max_detections: 300,
        }
    }
}

impl DetectionSettings {
    /// Input size actually fed to the model, at most `MAX_INPUT_SIZE`.
    pub fn effective_input_size(&self, native: Option<u32>) -> u32 {
        let requested = match self.input_size {
            0 => native.unwrap_or(FALLBACK_INPUT_SIZE),
            size => size,
        };
        requested.clamp(1, MAX_INPUT_SIZE).div_ceil(MODEL_STRIDE) * MODEL_STRIDE
    }
}

/// A loaded detector plus the metadata needed to interpret its output.
///
/// Built once at startup and shared behind an `Arc`. The backend is
/// serialized by a mutex, so at most one `detect` runs the model at a time.
pub struct ModelHandle {
    checkpoint_path: PathBuf,
    class_names: ClassNames,
    native_input_size: Option<u32>,
    backend: Mutex<Box<dyn DetectionBackend>>,
}

impl ModelHandle {
    /// Load an ONNX checkpoint with ONNX Runtime.
    #[cfg(feature = "ort-backend")]
    pub fn load(
        checkpoint_path: &Path,
        labels_path: Option<&Path>,
    ) -> Result<Self, InferenceError> {
        let backend = crate::backend::ort::OrtBackend::load_model(checkpoint_path)
            .map_err(|e| InferenceError::model_load(checkpoint_path, e))?;
        Self::new(Box::new(backend), checkpoint_path, labels_path)
    }

    /// Wrap an already constructed backend.
    ///
    /// Class names come from `labels_path` when given, then from the model's
    /// `names` metadata, then from a `labels.txt` next to the checkpoint.
    pub fn new(
        backend: Box<dyn DetectionBackend>,
        checkpoint_path: impl Into<PathBuf>,
        labels_path: Option<&Path>,
    ) -> Result<Self, InferenceError> {
        let checkpoint_path = checkpoint_path.into();
        let load_err = |e: anyhow::Error| InferenceError::model_load(&checkpoint_path, e);

        let class_names = match labels_path {
            Some(path) => ClassNames::from_file(path).map_err(|e| load_err(e.into()))?,
            None => Self::discover_class_names(backend.as_ref(), &checkpoint_path)
                .map_err(load_err)?,
        };

        let native_input_size = backend
            .metadata("imgsz")
            .map_err(load_err)?
            .as_deref()
            .and_then(parse_imgsz);

        tracing::info!(
            checkpoint = %checkpoint_path.display(),
            classes = class_names.len(),
            native_input_size = ?native_input_size,
            "Model handle ready"
        );

        Ok(Self {
            checkpoint_path,
            class_names,
            native_input_size,
            backend: Mutex::new(backend),
        })
    }

    fn discover_class_names(
        backend: &dyn DetectionBackend,
        checkpoint_path: &Path,
    ) -> anyhow::Result<ClassNames> {
        if let Some(raw) = backend.metadata("names")? {
            return Ok(ClassNames::parse_metadata(&raw)?);
        }

        let sidecar = checkpoint_path.with_file_name(SIDECAR_LABELS);
        if sidecar.is_file() {
            tracing::debug!(path = %sidecar.display(), "Reading class names from sidecar file");
            return Ok(ClassNames::from_file(&sidecar)?);
        }

        anyhow::bail!("model carries no class names and no labels file was provided")
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    pub fn native_input_size(&self) -> Option<u32> {
        self.native_input_size
    }

    /// Run the detector on one image file.
    #[tracing::instrument(skip(self, image_path, settings), fields(image = %image_path.display()))]
    pub fn detect(
        &self,
        image_path: &Path,
        settings: &DetectionSettings,
    ) -> Result<RawDetectionResult, InferenceError> {
        let image = decode_image(image_path).map_err(|e| InferenceError::detection(image_path, e))?;
        let records = self
            .run_model(&image, settings)
            .map_err(|e| InferenceError::detection(image_path, e))?;

        Ok(RawDetectionResult {
            source_path: image_path.to_path_buf(),
            image,
            records,
        })
    }

    fn run_model(
        &self,
        image: &RgbImage,
        settings: &DetectionSettings,
    ) -> anyhow::Result<Vec<crate::detection::DetectionRecord>> {
        let size = settings.effective_input_size(self.native_input_size);
        let mut preprocessor = CpuPreProcessor::new((size, size))?;
        let PreprocessResult { tensor, transform } =
            preprocessor.preprocess(image.as_raw(), image.width(), image.height())?;

        let output = {
            // A panic inside a previous inference leaves no state worth guarding.
            let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
            backend.infer(&tensor)?
        };

        PostProcessor::new(
            settings.confidence_threshold,
            settings.iou_threshold,
            settings.max_detections,
        )
        .parse_detections(&output.view(), self.class_names.num_classes(), &transform)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("checkpoint_path", &self.checkpoint_path)
            .field("classes", &self.class_names.len())
            .field("native_input_size", &self.native_input_size)
            .finish_non_exhaustive()
    }
}

fn decode_image(path: &Path) -> anyhow::Result<RgbImage> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.to_rgb8())
}

/// Startup outcome of model loading. Never fails; a missing model leaves
/// the service running in degraded mode.
#[derive(Debug, Default)]
pub struct ModelStatus {
    handle: Option<Arc<ModelHandle>>,
    load_error: Option<String>,
}

impl ModelStatus {
    /// Resolve and load the checkpoint in `weights_dir`.
    #[cfg(feature = "ort-backend")]
    pub fn load_from_dir(weights_dir: &Path, labels_path: Option<&Path>) -> Self {
        let loaded = crate::checkpoint::resolve(weights_dir)
            .and_then(|checkpoint| ModelHandle::load(&checkpoint, labels_path));

        match loaded {
            Ok(handle) => Self::ready(handle),
            Err(e) => {
                tracing::error!(error = %e, "Model unavailable, continuing in degraded mode");
                Self::failed(e)
            }
        }
    }

    pub fn ready(handle: ModelHandle) -> Self {
        Self {
            handle: Some(Arc::new(handle)),
            load_error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            handle: None,
            load_error: Some(error.to_string()),
        }
    }

    pub fn handle(&self) -> Option<&Arc<ModelHandle>> {
        self.handle.as_ref()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// The loaded handle, or `ModelUnavailable` carrying the load error.
    pub fn require(&self) -> Result<Arc<ModelHandle>, InferenceError> {
        self.handle.clone().ok_or_else(|| {
            InferenceError::ModelUnavailable(
                self.load_error
                    .clone()
                    .unwrap_or_else(|| "model was not initialized".to_string()),
            )
        })
    }
}

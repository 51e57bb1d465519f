use std::path::PathBuf;
use thiserror::Error;

/// Hard failures of the detection pipeline.
///
/// Annotation problems are deliberately absent: the writer absorbs them and
/// reports a missing artifact instead.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Failed to load model from {path}: {source:#}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Model not loaded: {0}")]
    ModelUnavailable(String),

    #[error("Detection failed for {path}: {source:#}")]
    DetectionRuntime {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl InferenceError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        InferenceError::ModelLoad {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn detection(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        InferenceError::DetectionRuntime {
            path: path.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = InferenceError::CheckpointNotFound("weights folder not found: w".to_string());
        assert_eq!(err.to_string(), "Checkpoint not found: weights folder not found: w");

        let err = InferenceError::ModelUnavailable("no checkpoint".to_string());
        assert_eq!(err.to_string(), "Model not loaded: no checkpoint");

        let err = InferenceError::detection("img.png", anyhow::anyhow!("corrupt image"));
        assert_eq!(err.to_string(), "Detection failed for img.png: corrupt image");
    }

    #[test]
    fn test_source_chain_is_preserved() {
        let io_err = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header");
        let err = InferenceError::model_load("best.onnx", io_err);

        let source = std::error::Error::source(&err).expect("ModelLoad should expose its source");
        assert_eq!(source.to_string(), "bad header");
    }
}

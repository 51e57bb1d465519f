use ndarray::{Array, ArrayD, IxDyn};

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Runtime that executes a detection graph.
///
/// Implementations are driven from one thread at a time; `ModelHandle`
/// serializes access behind a mutex.
pub trait DetectionBackend: Send {
    /// Run the model on a `[1, 3, H, W]` tensor and return its first output.
    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>>;

    /// Look up a custom metadata entry embedded in the model (e.g. `names`).
    fn metadata(&self, key: &str) -> anyhow::Result<Option<String>>;
}

//! Object detection with per-class counting and annotated image output.
//!
//! [`checkpoint::resolve`] picks a weights file, [`ModelHandle`] runs the
//! detector, and [`InferencePipeline::run_inference`] turns one image into
//! label counts plus an annotated JPEG.

pub mod annotate;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod detection;
pub mod error;
pub mod extract;
pub mod labels;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod processing;

pub use annotate::{AnnotateError, AnnotatedImageWriter};
pub use backend::DetectionBackend;
pub use config::InferenceConfig;
pub use detection::{DetectionRecord, DetectionTable, RawDetectionResult};
pub use error::InferenceError;
pub use extract::{CountsMap, extract};
pub use labels::ClassNames;
pub use model::{DetectionSettings, ModelHandle, ModelStatus};
pub use pipeline::{InferenceOutcome, InferencePipeline};

use crate::chat::ChatReply;
use inference::{InferencePipeline, ModelStatus};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<ModelStatus>,
    pub pipeline: Arc<InferencePipeline>,
    pub chat: Arc<dyn ChatReply>,
    /// Annotated images, served under `/predicted`
    pub output_dir: PathBuf,
    /// Uploads live here only for the duration of one request
    pub temp_dir: PathBuf,
}

impl AppState {
    pub fn new(
        model: ModelStatus,
        pipeline: InferencePipeline,
        chat: impl ChatReply + 'static,
        output_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model: Arc::new(model),
            pipeline: Arc::new(pipeline),
            chat: Arc::new(chat),
            output_dir: output_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }
}

//! Picks the weights file to load from a weights directory.

use crate::error::InferenceError;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_EXTENSION: &str = "onnx";

/// Canonical checkpoint stems, most preferred first.
const PREFERRED_STEMS: [&str; 2] = ["best", "last"];

/// Resolve the checkpoint to load from `weights_dir`.
///
/// Preference order: `best.onnx`, then `last.onnx`, then the first `*.onnx`
/// file returned by the directory listing. The last rule is a loose fallback:
/// with several unnamed checkpoints the pick depends on listing order.
pub fn resolve(weights_dir: impl AsRef<Path>) -> Result<PathBuf, InferenceError> {
    let weights_dir = weights_dir.as_ref();

    if !weights_dir.is_dir() {
        return Err(InferenceError::CheckpointNotFound(format!(
            "weights folder not found: {}",
            weights_dir.display()
        )));
    }

    for stem in PREFERRED_STEMS {
        let candidate = weights_dir.join(format!("{stem}.{CHECKPOINT_EXTENSION}"));
        if candidate.is_file() {
            tracing::debug!(checkpoint = %candidate.display(), "Resolved canonical checkpoint");
            return Ok(candidate);
        }
    }

    let entries = fs::read_dir(weights_dir).map_err(|e| {
        InferenceError::CheckpointNotFound(format!(
            "cannot list {}: {}",
            weights_dir.display(),
            e
        ))
    })?;

    let fallback = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| path.is_file() && is_checkpoint(path));

    match fallback {
        Some(path) => {
            tracing::warn!(
                checkpoint = %path.display(),
                "No best/last checkpoint, using first .{} file found",
                CHECKPOINT_EXTENSION
            );
            Ok(path)
        }
        None => Err(InferenceError::CheckpointNotFound(format!(
            "no .{} checkpoint in {}",
            CHECKPOINT_EXTENSION,
            weights_dir.display()
        ))),
    }
}

fn is_checkpoint(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CHECKPOINT_EXTENSION))
}

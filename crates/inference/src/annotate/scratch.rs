//! Run-directory saving and lookup used as the last annotation fallback.

use super::AnnotateError;
use super::render::{draw_boxes, line_width};
use crate::detection::RawDetectionResult;
use crate::labels::ClassNames;
use std::fs;
use std::path::{Path, PathBuf};

/// Saves a prediction into a fresh run directory under a scratch root.
pub trait BatchSave: Send + Sync {
    fn scratch_root(&self) -> &Path;

    /// Returns the path of the saved image.
    fn save_batch(
        &self,
        raw: &RawDetectionResult,
        names: &ClassNames,
    ) -> Result<PathBuf, AnnotateError>;
}

/// Finds the most recent output inside one run directory.
pub trait ScratchScanner: Send + Sync {
    fn newest_file(&self, run_dir: &Path) -> Result<Option<PathBuf>, AnnotateError>;
}

/// Writes `{root}/{name}`, `{root}/{name}2`, ... one directory per call.
#[derive(Debug, Clone)]
pub struct RunDirectorySaver {
    root: PathBuf,
    run_name: String,
}

impl RunDirectorySaver {
    pub const DEFAULT_RUN_NAME: &'static str = "predict";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            run_name: Self::DEFAULT_RUN_NAME.to_string(),
        }
    }

    /// Create and return an unused run directory.
    ///
    /// The search starts at the number of existing entries, so a root with
    /// `predict..predictN` costs one failed create instead of N.
    fn next_run_dir(&self) -> Result<PathBuf, AnnotateError> {
        fs::create_dir_all(&self.root)?;

        let existing = fs::read_dir(&self.root)?.count();
        let mut suffix = u32::try_from(existing).unwrap_or(u32::MAX).max(1);
        loop {
            let name = match suffix {
                1 => self.run_name.clone(),
                n => format!("{}{}", self.run_name, n),
            };
            let candidate = self.root.join(name);
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix = suffix.checked_add(1).ok_or_else(|| {
                        AnnotateError::BatchSave(anyhow::anyhow!("no free run directory"))
                    })?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl BatchSave for RunDirectorySaver {
    fn scratch_root(&self) -> &Path {
        &self.root
    }

    fn save_batch(
        &self,
        raw: &RawDetectionResult,
        _names: &ClassNames,
    ) -> Result<PathBuf, AnnotateError> {
        let stem = raw
            .source_path
            .file_stem()
            .ok_or_else(|| AnnotateError::InvalidSource(raw.source_path.clone()))?;

        let mut canvas = raw.image.clone();
        let (width, height) = canvas.dimensions();
        draw_boxes(&mut canvas, raw, line_width(width, height))
            .map_err(|e| AnnotateError::BatchSave(e.into()))?;

        let run_dir = self.next_run_dir()?;
        let path = run_dir.join(Path::new(stem).with_extension("jpg"));
        canvas
            .save(&path)
            .map_err(|e| AnnotateError::BatchSave(e.into()))?;

        tracing::debug!(path = %path.display(), "Saved prediction to run directory");
        Ok(path)
    }
}

/// Picks the file with the latest modification time among `{run_dir}/*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifiedTimeScanner;

impl ScratchScanner for ModifiedTimeScanner {
    fn newest_file(&self, run_dir: &Path) -> Result<Option<PathBuf>, AnnotateError> {
        let pattern = format!("{}/*", glob::Pattern::escape(&run_dir.to_string_lossy()));

        let entries = glob::glob(&pattern).map_err(|e| AnnotateError::Scan(e.to_string()))?;

        let newest = entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .filter_map(|path| {
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((modified, path))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, path)| path);

        Ok(newest)
    }
}

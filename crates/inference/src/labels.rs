//! Class-index to label mapping.

use preprocess::MAX_INPUT_SIZE;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Matches one `index: 'label'` entry of an exported `names` dictionary.
static NAMES_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?(\d+)["']?\s*:\s*(?:'([^']*)'|"([^"]*)")"#)
        .unwrap_or_else(|e| panic!("invalid names pattern: {e}"))
});

static FIRST_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").unwrap_or_else(|e| panic!("invalid integer pattern: {e}")));

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Failed to read labels from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No class labels found")]
    Empty,

    #[error("Malformed class names: {0}")]
    Malformed(String),
}

/// Ordered, non-empty mapping from class index to human-readable label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames(BTreeMap<u32, String>);

impl ClassNames {
    /// Index labels by position.
    pub fn from_labels<I, S>(labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeMap<u32, String> = (0u32..)
            .zip(labels)
            .map(|(index, label)| (index, label.into()))
            .collect();

        if names.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(Self(names))
    }

    /// Parse the `names` metadata entry of an exported model, e.g.
    /// `{0: 'dog', 1: 'cat'}`.
    pub fn parse_metadata(raw: &str) -> Result<Self, LabelError> {
        let mut names = BTreeMap::new();

        for caps in NAMES_ENTRY.captures_iter(raw) {
            let index = caps[1].parse::<u32>().map_err(|_| {
                LabelError::Malformed(format!("class index {} out of range", &caps[1]))
            })?;
            let label = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            names.insert(index, label);
        }

        if names.is_empty() {
            return Err(if raw.trim().is_empty() {
                LabelError::Empty
            } else {
                LabelError::Malformed(raw.chars().take(64).collect())
            });
        }
        Ok(Self(names))
    }

    /// Read a labels file: one label per non-blank line, indexed from zero.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_labels(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.0.get(&index).map(String::as_str)
    }

    /// Label for `index`, falling back to the stringified index.
    pub fn label(&self, index: u32) -> Cow<'_, str> {
        match self.get(index) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(index.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of class scores the model emits, i.e. highest index + 1.
    pub fn num_classes(&self) -> usize {
        self.0
            .keys()
            .next_back()
            .map(|max| *max as usize + 1)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.0.iter().map(|(index, name)| (*index, name.as_str()))
    }
}

/// Parse the `imgsz` metadata entry (`[640, 640]` or `640`).
pub fn parse_imgsz(raw: &str) -> Option<u32> {
    FIRST_INTEGER
        .find(raw)
        .and_then(|m| m.as_str().parse().ok())
        .filter(|size| (1..=MAX_INPUT_SIZE).contains(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_ultralytics_metadata() {
        let names = ClassNames::parse_metadata("{0: 'dog', 1: 'cat', 2: \"sea urchin\"}").unwrap();

        assert_eq!(names.len(), 3);
        assert_eq!(names.get(0), Some("dog"));
        assert_eq!(names.get(1), Some("cat"));
        assert_eq!(names.get(2), Some("sea urchin"));
        assert_eq!(names.num_classes(), 3);
    }

    #[test]
    fn test_parse_json_style_metadata() {
        let names = ClassNames::parse_metadata(r#"{"0": "diatom", "1": "copepod"}"#).unwrap();
        assert_eq!(names.get(1), Some("copepod"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ClassNames::parse_metadata("not a dict"),
            Err(LabelError::Malformed(_))
        ));
        assert!(matches!(ClassNames::parse_metadata("  "), Err(LabelError::Empty)));
    }

    #[test]
    fn test_label_falls_back_to_index() {
        let names = ClassNames::from_labels(["dog"]).unwrap();
        assert_eq!(names.label(0), "dog");
        assert_eq!(names.label(7), "7");
    }

    #[test]
    fn test_from_file_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        fs::write(&path, "dog\n\n  cat  \n").unwrap();

        let names = ClassNames::from_file(&path).unwrap();
        assert_eq!(names.iter().collect::<Vec<_>>(), vec![(0, "dog"), (1, "cat")]);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ClassNames::from_file(dir.path().join("missing.txt")),
            Err(LabelError::Io { .. })
        ));

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "\n\n").unwrap();
        assert!(matches!(ClassNames::from_file(&empty), Err(LabelError::Empty)));
    }

    #[test]
    fn test_parse_imgsz() {
        assert_eq!(parse_imgsz("[960, 960]"), Some(960));
        assert_eq!(parse_imgsz("640"), Some(640));
        assert_eq!(parse_imgsz("none"), None);
        assert_eq!(parse_imgsz("[0, 0]"), None);
        assert_eq!(parse_imgsz("[100000, 100000]"), None);
        assert_eq!(parse_imgsz("99999999999"), None);
    }
}

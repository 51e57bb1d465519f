//! Per-class object counts from a detection result.

use crate::detection::{RawDetectionResult, TableError};
use crate::labels::ClassNames;
use std::collections::BTreeMap;

/// Label to number of detections; only labels seen at least once are present.
pub type CountsMap = BTreeMap<String, usize>;

/// Count detections per label.
///
/// Reads the `name` column of the tabular view first and falls back to
/// walking the records when the table cannot be built. Never fails.
pub fn extract(raw: &RawDetectionResult, names: &ClassNames) -> CountsMap {
    match count_table(raw, names) {
        Ok(counts) => counts,
        Err(e) => {
            tracing::debug!(error = %e, "Tabular counting failed, iterating records");
            count_records(raw, names)
        }
    }
}

fn count_table(raw: &RawDetectionResult, names: &ClassNames) -> Result<CountsMap, TableError> {
    let table = raw.table(names)?;
    let mut counts = CountsMap::new();
    for label in table.text_column("name")? {
        *counts.entry(label.clone()).or_default() += 1;
    }
    Ok(counts)
}

fn count_records(raw: &RawDetectionResult, names: &ClassNames) -> CountsMap {
    let mut counts = CountsMap::new();
    for record in &raw.records {
        *counts
            .entry(names.label(record.class_index).into_owned())
            .or_default() += 1;
    }
    counts
}

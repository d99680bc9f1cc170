//! The persisted record of completed work items.

use crate::SeriesId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// One completed work item, keyed by its expected-output path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneRecord {
    pub output: PathBuf,
    pub series: SeriesId,
    pub sub_index: Option<u32>,
}

/// Deduplicated table of completed work items.
///
/// No two rows ever share an output path; duplicates are dropped on
/// construction and on every append. During a run the table is append-only
/// apart from the one-time reinstatement pass at the start of
/// reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoneTable {
    records: Vec<DoneRecord>,
}

impl DoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from raw rows, keeping the first row for each output
    /// path and returning the number of duplicates dropped.
    pub fn from_records(records: Vec<DoneRecord>) -> (Self, usize) {
        let mut seen: HashSet<PathBuf> = HashSet::with_capacity(records.len());
        let before = records.len();
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if seen.insert(record.output.clone()) {
                kept.push(record);
            }
        }
        let dropped = before - kept.len();
        (Self { records: kept }, dropped)
    }

    /// Append a record unless its output path is already recorded.
    /// Returns whether the record was added.
    pub fn append(&mut self, record: DoneRecord) -> bool {
        if self.contains_output(&record.output) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains_output(&self, output: &Path) -> bool {
        self.records.iter().any(|r| r.output == output)
    }

    /// Keep only rows matching the predicate; returns the number removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&DoneRecord) -> bool,
    {
        let before = self.records.len();
        self.records.retain(|r| keep(r));
        before - self.records.len()
    }

    pub fn records(&self) -> &[DoneRecord] {
        &self.records
    }

    /// Distinct series ids present in the table.
    pub fn series_set(&self) -> BTreeSet<SeriesId> {
        self.records.iter().map(|r| r.series).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

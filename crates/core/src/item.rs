//! Work items — the schedulable units of external-tool invocation.

use crate::{DoneRecord, DoneTable, SeriesId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity of one work item.
///
/// Per-image stages carry the image index within the series as `sub_index`;
/// per-series stages leave it `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub series: SeriesId,
    pub sub_index: Option<u32>,
}

impl ItemKey {
    pub fn series(series: SeriesId) -> Self {
        Self {
            series,
            sub_index: None,
        }
    }

    pub fn image(series: SeriesId, index: u32) -> Self {
        Self {
            series,
            sub_index: Some(index),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sub_index {
            Some(idx) => write!(f, "series {} image {}", self.series, idx),
            None => write!(f, "series {}", self.series),
        }
    }
}

/// One unit of processing: identity, source path(s) and the deterministic
/// expected output path. The output path is the join key used throughout
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: ItemKey,
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
}

impl WorkItem {
    pub fn new(key: ItemKey, sources: Vec<PathBuf>, output: PathBuf) -> Self {
        Self {
            key,
            sources,
            output,
        }
    }

    /// Done-table row recording this item's completion.
    pub fn done_record(&self) -> DoneRecord {
        DoneRecord {
            output: self.output.clone(),
            series: self.key.series,
            sub_index: self.key.sub_index,
        }
    }
}

/// Sort items ascending by series id, then sub-index.
pub fn sort_items(items: &mut [WorkItem]) {
    items.sort_by_key(|item| item.key);
}

/// Explicit immutable reconciliation result: what still needs work and what
/// is already recorded as done. Pending and done are disjoint by output path.
#[derive(Debug, Clone)]
pub struct WorkState {
    pub pending: Vec<WorkItem>,
    pub done: DoneTable,
}

impl WorkState {
    pub fn new(mut pending: Vec<WorkItem>, done: DoneTable) -> Self {
        sort_items(&mut pending);
        Self { pending, done }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(series: u32, sub: Option<u32>) -> WorkItem {
        let key = ItemKey {
            series: SeriesId::new(series),
            sub_index: sub,
        };
        WorkItem::new(
            key,
            vec![PathBuf::from(format!("in_{series}_{sub:?}"))],
            PathBuf::from(format!("out_{series}_{sub:?}")),
        )
    }

    #[test]
    fn items_sort_by_series_then_sub_index() {
        let mut items = vec![
            item(2, Some(1)),
            item(1, Some(4)),
            item(1, Some(2)),
            item(2, None),
        ];
        sort_items(&mut items);
        let keys: Vec<_> = items.iter().map(|i| i.key).collect();
        assert_eq!(
            keys,
            vec![
                ItemKey::image(SeriesId::new(1), 2),
                ItemKey::image(SeriesId::new(1), 4),
                ItemKey::series(SeriesId::new(2)),
                ItemKey::image(SeriesId::new(2), 1),
            ]
        );
    }

    #[test]
    fn item_key_display_names_identity() {
        assert_eq!(
            ItemKey::image(SeriesId::new(3), 12).to_string(),
            "series 3 image 12"
        );
        assert_eq!(ItemKey::series(SeriesId::new(3)).to_string(), "series 3");
    }
}

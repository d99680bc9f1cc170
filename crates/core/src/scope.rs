//! Declared scope of a run.

use crate::{DoneTable, SeriesId};
use serde::{Deserialize, Serialize};

/// Ordered set of series identifiers declared for the current run.
///
/// Always deduplicated and ascending, regardless of how it was constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope(Vec<SeriesId>);

impl Scope {
    /// Build a scope from arbitrary series ids; duplicates are dropped and
    /// the result is sorted ascending.
    pub fn from_series<I>(series: I) -> Self
    where
        I: IntoIterator<Item = SeriesId>,
    {
        let mut ids: Vec<SeriesId> = series.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    /// Scope of a stage derived from its predecessor: series present in the
    /// previous stage's done table but absent from this stage's own.
    pub fn derive(previous_done: &DoneTable, own_done: &DoneTable) -> Self {
        let own = own_done.series_set();
        Self::from_series(
            previous_done
                .records()
                .iter()
                .map(|r| r.series)
                .filter(|s| !own.contains(s)),
        )
    }

    pub fn contains(&self, series: SeriesId) -> bool {
        self.0.binary_search(&series).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = SeriesId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

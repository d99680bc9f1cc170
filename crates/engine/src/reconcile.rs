//! Reconciliation: derive the authoritative pending list from scope, done
//! table and filesystem state.

use std::path::Path;
use tomopipe_core::{DoneTable, Scope, WorkItem, WorkState};
use tracing::debug;

/// Result of one reconciliation pass.
#[derive(Debug)]
pub struct Reconciliation {
    /// Pending/done split after reconciliation; disjoint by output path.
    pub state: WorkState,
    /// Done rows removed because their output vanished from disk.
    pub reinstated: usize,
    /// In-scope candidates omitted because they are already complete.
    pub skipped: usize,
    /// Candidates recorded as done because their output already existed on
    /// disk without a done-table row.
    pub adopted: usize,
    /// Everything in scope is already processed (and there was something to
    /// process) — dispatch can be skipped entirely.
    pub all_done: bool,
}

/// Reconcile a stage. Pure with respect to the filesystem: all existence
/// checks go through `output_exists`.
///
/// Reinstatement only applies to done rows whose series is in the current
/// scope; out-of-scope rows with missing outputs are deliberately left
/// untouched.
pub fn reconcile<F>(
    scope: &Scope,
    mut done: DoneTable,
    candidates: Vec<WorkItem>,
    output_exists: F,
) -> Reconciliation
where
    F: Fn(&Path) -> bool,
{
    // Done rows are deduplicated by construction; start with reinstatement.
    let reinstated = done.retain(|r| !(scope.contains(r.series) && !output_exists(&r.output)));

    let in_scope: Vec<WorkItem> = candidates
        .into_iter()
        .filter(|c| scope.contains(c.key.series))
        .collect();
    let declared = in_scope.len();

    let mut pending = Vec::new();
    let mut adopted = 0usize;
    for item in in_scope {
        if done.contains_output(&item.output) {
            continue;
        }
        if output_exists(&item.output) {
            // Completed by an earlier run that never got to checkpoint it.
            done.append(item.done_record());
            adopted += 1;
            continue;
        }
        pending.push(item);
    }

    let skipped = declared - pending.len();
    let all_done = pending.is_empty() && !done.is_empty();

    debug!(
        declared,
        pending = pending.len(),
        reinstated,
        skipped,
        adopted,
        all_done,
        "reconciled"
    );

    Reconciliation {
        state: WorkState::new(pending, done),
        reinstated,
        skipped,
        adopted,
        all_done,
    }
}

//! Stage abstraction.

use tomopipe_core::{Result, Scope, WorkItem};
use tomopipe_resources::DeviceId;
use tomopipe_tools::ToolCommand;

/// One reconcile-then-dispatch round of the pipeline.
///
/// A stage owns its done table, knows how to enumerate its candidate items
/// for a scope, and maps each pending item (plus its assigned device) to one
/// external invocation.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Name of this stage's done table in the metadata store.
    fn table(&self) -> &str;

    /// External jobs per free compute device.
    fn jobs_per_device(&self) -> usize;

    /// Scope declared for this run. `None` means the scope is derived from
    /// the previous stage's completions.
    fn declared_scope(&self) -> Option<Scope>;

    /// Candidate items for the scope, before reconciliation. Fails with a
    /// data-integrity error when an item's identity cannot be derived.
    fn candidates(&self, scope: &Scope) -> Result<Vec<WorkItem>>;

    /// One-time preparation before dispatch: output folders and auxiliary
    /// files the tool expects (tilt-angle lists, file lists, directives).
    fn prepare_run(&self, pending: &[WorkItem]) -> Result<()>;

    /// The external invocation for one pending item.
    fn command(&self, item: &WorkItem, device: &DeviceId) -> ToolCommand;
}

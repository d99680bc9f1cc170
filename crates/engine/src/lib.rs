//! The reconcile-then-dispatch engine.
//!
//! On every invocation each stage decides what still needs work
//! (reconciliation against its done table and the filesystem), then runs one
//! external invocation per pending item in bounded-concurrency chunks,
//! checkpointing the done table after every harvested item. A crash loses at
//! most the still-unharvested part of one chunk.

mod dispatch;
mod pipeline;
mod reconcile;
mod stage;
pub mod stages;

pub use dispatch::{DispatchReport, JobDispatcher, JobSpec};
pub use pipeline::{Pipeline, StageReport};
pub use reconcile::{reconcile, Reconciliation};
pub use stage::Stage;

//! Core data model for the tomopipe batch driver.
//!
//! Defines the entities shared by every stage of the pipeline: series
//! identifiers, work items, the declared scope of a run, the persisted done
//! table, and the typed stage configurations. All reconciliation and dispatch
//! logic lives in `tomopipe-engine`; this crate only holds the values those
//! components pass around.

mod config;
mod done;
mod error;
mod id;
mod item;
mod scope;

pub use config::{
    load_config, AlignConfig, FileType, FineAlignParams, GroupOption, MotionCorrConfig,
    PatchTrackParams, ProjectConfig, StackConfig, SystemConfig, Validate,
};
pub use done::{DoneRecord, DoneTable};
pub use error::{PipelineError, Result};
pub use id::SeriesId;
pub use item::{ItemKey, WorkItem, WorkState};
pub use scope::Scope;

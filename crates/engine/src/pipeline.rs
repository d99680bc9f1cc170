//! Stage-by-stage orchestration of one pipeline invocation.

use std::path::Path;
use std::sync::Arc;

use tomopipe_core::{DoneTable, PipelineError, Result, Scope};
use tomopipe_resources::{DeviceQuery, ResourcePool};
use tomopipe_storage::MetadataStore;
use tomopipe_tools::ToolRunner;
use tracing::info;

use crate::dispatch::{JobDispatcher, JobSpec};
use crate::reconcile::reconcile;
use crate::stage::Stage;

/// What one stage did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: String,
    /// Everything in scope was already complete; dispatch (and resource
    /// discovery) was skipped.
    pub all_done: bool,
    pub reinstated: usize,
    pub skipped: usize,
    pub completed: usize,
    pub chunks: usize,
}

/// Runs stages in order, feeding each stage's done table into the next
/// stage's derived scope.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    store: Box<dyn MetadataStore>,
    runner: Arc<dyn ToolRunner>,
    query: Box<dyn DeviceQuery>,
}

impl Pipeline {
    pub fn new(
        store: Box<dyn MetadataStore>,
        runner: Arc<dyn ToolRunner>,
        query: Box<dyn DeviceQuery>,
    ) -> Self {
        Self {
            stages: Vec::new(),
            store,
            runner,
            query,
        }
    }

    pub fn with_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Run every stage once: reconcile, then dispatch what remains.
    ///
    /// A stage whose scope is fully processed is skipped without touching the
    /// resource pool. Any stage failure aborts the run; completed items keep
    /// their checkpoints.
    pub async fn run(&mut self) -> Result<Vec<StageReport>> {
        let mut previous_done: Option<DoneTable> = None;
        let mut reports = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let done = self.store.load_done(stage.table()).await?;

            let scope = match stage.declared_scope() {
                Some(scope) => scope,
                None => match &previous_done {
                    Some(prev) => Scope::derive(prev, &done),
                    None => {
                        return Err(PipelineError::Configuration(format!(
                            "stage {} derives its scope from a predecessor but runs first",
                            stage.name()
                        )))
                    }
                },
            };

            let candidates = stage.candidates(&scope)?;
            let recon = reconcile(&scope, done, candidates, |p: &Path| p.is_file());

            // Reinstatements and adoptions changed the table; persist them
            // even if nothing gets dispatched afterwards.
            if recon.reinstated > 0 || recon.adopted > 0 {
                self.store.checkpoint(stage.table(), &recon.state.done).await?;
            }

            if recon.all_done {
                info!(stage = stage.name(), "all items already processed");
                reports.push(StageReport {
                    stage: stage.name().to_string(),
                    all_done: true,
                    reinstated: recon.reinstated,
                    skipped: recon.skipped,
                    completed: 0,
                    chunks: 0,
                });
                previous_done = Some(recon.state.done);
                continue;
            }

            if recon.state.pending.is_empty() {
                // Nothing declared for this stage at all.
                info!(stage = stage.name(), "nothing to do");
                reports.push(StageReport {
                    stage: stage.name().to_string(),
                    all_done: false,
                    reinstated: recon.reinstated,
                    skipped: recon.skipped,
                    completed: 0,
                    chunks: 0,
                });
                previous_done = Some(recon.state.done);
                continue;
            }

            let pool = ResourcePool::discover(self.query.as_ref()).await?;
            let concurrency = pool.concurrency(stage.jobs_per_device());

            stage.prepare_run(&recon.state.pending)?;

            let devices = pool.assignments(recon.state.pending.len());
            let jobs: Vec<JobSpec> = recon
                .state
                .pending
                .iter()
                .zip(devices)
                .map(|(item, device)| JobSpec {
                    command: stage.command(item, &device),
                    item: item.clone(),
                    device,
                })
                .collect();

            info!(
                stage = stage.name(),
                pending = jobs.len(),
                concurrency,
                "dispatching"
            );

            let dispatcher = JobDispatcher::new(Arc::clone(&self.runner), concurrency)?;
            let mut done = recon.state.done;
            let dispatched = dispatcher
                .dispatch(
                    stage.table(),
                    &jobs,
                    &mut done,
                    self.store.as_mut(),
                    |p: &Path| p.is_file(),
                )
                .await?;

            reports.push(StageReport {
                stage: stage.name().to_string(),
                all_done: false,
                reinstated: recon.reinstated,
                skipped: recon.skipped,
                completed: dispatched.completed,
                chunks: dispatched.chunks,
            });
            previous_done = Some(done);
        }

        Ok(reports)
    }
}

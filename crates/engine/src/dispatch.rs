//! Bounded-concurrency dispatch of external invocations.

use std::path::Path;
use std::sync::Arc;

use tomopipe_core::{DoneTable, PipelineError, Result, WorkItem};
use tomopipe_resources::DeviceId;
use tomopipe_storage::MetadataStore;
use tomopipe_tools::{ToolCommand, ToolOutput, ToolRunner};
use tracing::{info, warn};

/// One dispatch-ready work item: the item, its assigned device and the fully
/// constructed invocation.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub item: WorkItem,
    pub device: DeviceId,
    pub command: ToolCommand,
}

/// Outcome of a completed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Items confirmed on disk and checkpointed.
    pub completed: usize,
    /// Chunks executed: `ceil(jobs / concurrency)`.
    pub chunks: usize,
}

/// Executes jobs in consecutive chunks of at most `concurrency` items.
///
/// Every invocation in a chunk is launched concurrently in ascending item
/// order; results are harvested strictly in launch order, not completion
/// order, and the done table is checkpointed after each harvested item. A
/// chunk must be fully harvested before the next one starts.
pub struct JobDispatcher {
    runner: Arc<dyn ToolRunner>,
    concurrency: usize,
}

impl JobDispatcher {
    pub fn new(runner: Arc<dyn ToolRunner>, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(PipelineError::Configuration(
                "dispatch concurrency must be at least 1".into(),
            ));
        }
        Ok(Self { runner, concurrency })
    }

    /// Run all jobs, checkpointing `done` into `store` under `table` after
    /// every item whose output is confirmed on disk.
    ///
    /// Any non-zero exit, or any error-stream text even on a success exit,
    /// aborts the whole dispatch: earlier items of the same chunk are still
    /// harvested and checkpointed first, later chunks never start.
    pub async fn dispatch<F>(
        &self,
        table: &str,
        jobs: &[JobSpec],
        done: &mut DoneTable,
        store: &mut dyn MetadataStore,
        output_exists: F,
    ) -> Result<DispatchReport>
    where
        F: Fn(&Path) -> bool + Send + Sync,
    {
        let mut completed = 0usize;
        let mut chunks = 0usize;

        for chunk in jobs.chunks(self.concurrency) {
            chunks += 1;

            // Launch the whole chunk; every process is spawned before the
            // first harvest blocks.
            let mut handles = Vec::with_capacity(chunk.len());
            for job in chunk {
                let runner = Arc::clone(&self.runner);
                let command = job.command.clone();
                handles.push(tokio::spawn(async move { runner.run(&command).await }));
            }

            for (job, handle) in chunk.iter().zip(handles) {
                let output = handle
                    .await
                    .map_err(|e| failure(job, -1, format!("worker task failed: {e}")))?
                    .map_err(|e| failure(job, -1, format!("failed to launch tool: {e}")))?;

                if !output.clean() {
                    return Err(failure(job, output.exit_code, captured_text(&output)));
                }

                if output_exists(&job.item.output) {
                    if done.append(job.item.done_record()) {
                        store.checkpoint(table, done).await?;
                    }
                    completed += 1;
                    info!(item = %job.item.key, device = %job.device, "item complete");
                } else {
                    // No retry within a run; the item stays pending for the
                    // next invocation.
                    warn!(
                        item = %job.item.key,
                        output = %job.item.output.display(),
                        "tool exited cleanly but the expected output is missing"
                    );
                }
            }
        }

        Ok(DispatchReport { completed, chunks })
    }
}

fn failure(job: &JobSpec, exit_code: i32, output: String) -> PipelineError {
    PipelineError::ExternalTool {
        item: job.item.key,
        device: job.device.to_string(),
        exit_code,
        output,
    }
}

fn captured_text(output: &ToolOutput) -> String {
    if output.stderr.is_empty() {
        output.stdout.clone()
    } else if output.stdout.is_empty() {
        output.stderr.clone()
    } else {
        format!("{}\n{}", output.stdout, output.stderr)
    }
}

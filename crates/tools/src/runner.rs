//! Running tool commands as OS processes.

use crate::{ToolCommand, ToolOutput};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Executes tool commands. The dispatcher only depends on this trait, so
/// tests can substitute a scripted runner.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the command to completion and capture its output.
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, anyhow::Error>;
}

/// Production runner spawning a real child process.
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, anyhow::Error> {
        let start = std::time::Instant::now();

        debug!(program = %command.program.display(), args = ?command.args, "spawning tool");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        for (k, v) in &command.env {
            cmd.env(k, v);
        }

        let output = cmd.output().await?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        })
    }
}

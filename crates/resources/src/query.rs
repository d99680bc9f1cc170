//! Device enumeration queries.

use async_trait::async_trait;
use tomopipe_core::{PipelineError, Result};

/// The two textual enumerations the pool is built from: all devices, and
/// devices currently hosting any compute job regardless of owning process.
#[async_trait]
pub trait DeviceQuery: Send + Sync {
    /// Raw output of the device listing (`nvidia-smi --list-gpus` format).
    async fn enumerate(&self) -> Result<String>;

    /// Raw output of the active-job listing
    /// (`nvidia-smi --query-compute-apps=gpu_uuid --format=csv` format).
    async fn active(&self) -> Result<String>;
}

/// Production query shelling out to `nvidia-smi`.
pub struct NvidiaSmiQuery;

impl NvidiaSmiQuery {
    async fn run(args: &[&str]) -> Result<String> {
        let output = tokio::process::Command::new("nvidia-smi")
            .args(args)
            .output()
            .await
            .map_err(|e| PipelineError::Configuration(format!("failed to run nvidia-smi: {e}")))?;
        if !output.status.success() {
            return Err(PipelineError::Configuration(format!(
                "nvidia-smi {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl DeviceQuery for NvidiaSmiQuery {
    async fn enumerate(&self) -> Result<String> {
        Self::run(&["--list-gpus"]).await
    }

    async fn active(&self) -> Result<String> {
        Self::run(&["--query-compute-apps=gpu_uuid", "--format=csv"]).await
    }
}

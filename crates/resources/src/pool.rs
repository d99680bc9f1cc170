//! The resource pool: parse device enumerations, classify free/busy,
//! assign devices round-robin.

use crate::DeviceQuery;
use regex::Regex;
use std::collections::HashSet;
use tomopipe_core::{PipelineError, Result};
use tracing::info;

/// Stable identifier of one compute device (the index nvidia-smi reports).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One discovered device and whether any process on the machine currently
/// runs a job on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub id: DeviceId,
    pub busy: bool,
}

/// Free/busy classification of every device, computed once per run.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    descriptors: Vec<ResourceDescriptor>,
}

impl ResourcePool {
    /// Discover devices via the given query and classify them. Fatal when no
    /// device is free — there is no degraded single-device fallback.
    pub async fn discover(query: &dyn DeviceQuery) -> Result<Self> {
        let listing = query.enumerate().await?;
        let active = query.active().await?;
        let descriptors = classify(&parse_device_listing(&listing)?, &parse_active_uuids(&active));
        let pool = Self::from_descriptors(descriptors)?;
        info!(
            free = pool.free().len(),
            total = pool.descriptors.len(),
            "discovered compute devices"
        );
        Ok(pool)
    }

    /// Build a pool from already-classified descriptors, failing when none
    /// is free.
    pub fn from_descriptors(descriptors: Vec<ResourceDescriptor>) -> Result<Self> {
        if !descriptors.iter().any(|d| !d.busy) {
            return Err(PipelineError::ResourceUnavailable {
                detected: descriptors.len(),
            });
        }
        Ok(Self { descriptors })
    }

    /// Ordered list of free device identifiers.
    pub fn free(&self) -> Vec<DeviceId> {
        self.descriptors
            .iter()
            .filter(|d| !d.busy)
            .map(|d| d.id.clone())
            .collect()
    }

    /// Concurrency bound for a stage: free devices times the configured
    /// jobs-per-device multiplier.
    pub fn concurrency(&self, jobs_per_device: usize) -> usize {
        self.free().len() * jobs_per_device
    }

    /// Round-robin device assignment for `count` work items, computed once
    /// before dispatch begins; devices are not reassigned mid-run.
    pub fn assignments(&self, count: usize) -> Vec<DeviceId> {
        let free = self.free();
        free.iter().cycle().take(count).cloned().collect()
    }
}

/// Parse `nvidia-smi --list-gpus` output into (index, uuid) pairs.
fn parse_device_listing(listing: &str) -> Result<Vec<(DeviceId, String)>> {
    // e.g. `GPU 0: NVIDIA A4000 (UUID: GPU-8f4e0f2a-...)`
    let pattern = Regex::new(r"^GPU (\d+):.*\(UUID:\s*([^)]+)\)")
        .map_err(|e| PipelineError::Configuration(e.to_string()))?;

    let mut devices = Vec::new();
    for line in listing.lines().filter(|l| !l.trim().is_empty()) {
        let captures = pattern.captures(line.trim()).ok_or_else(|| {
            PipelineError::Configuration(format!("unrecognized device listing line: {line:?}"))
        })?;
        devices.push((
            DeviceId::new(&captures[1]),
            captures[2].trim().to_string(),
        ));
    }
    Ok(devices)
}

/// Parse the active-compute-apps query into the set of busy device UUIDs.
/// The first line is the csv header.
fn parse_active_uuids(active: &str) -> HashSet<String> {
    active
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn classify(
    devices: &[(DeviceId, String)],
    busy_uuids: &HashSet<String>,
) -> Vec<ResourceDescriptor> {
    devices
        .iter()
        .map(|(id, uuid)| ResourceDescriptor {
            id: id.clone(),
            busy: busy_uuids.contains(uuid),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
GPU 0: NVIDIA RTX A4000 (UUID: GPU-aaaa)
GPU 1: NVIDIA RTX A4000 (UUID: GPU-bbbb)
GPU 2: NVIDIA RTX A4000 (UUID: GPU-cccc)
";

    #[test]
    fn listing_parses_index_and_uuid() {
        let devices = parse_device_listing(LISTING).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[1].0, DeviceId::new("1"));
        assert_eq!(devices[2].1, "GPU-cccc");
    }

    #[test]
    fn malformed_listing_is_rejected() {
        assert!(parse_device_listing("not a gpu line\n").is_err());
    }

    #[test]
    fn busy_devices_are_filtered_out() {
        let devices = parse_device_listing(LISTING).unwrap();
        let busy = parse_active_uuids("gpu_uuid\nGPU-bbbb\n");
        let pool = ResourcePool::from_descriptors(classify(&devices, &busy)).unwrap();
        assert_eq!(pool.free(), vec![DeviceId::new("0"), DeviceId::new("2")]);
    }

    #[test]
    fn all_busy_is_fatal() {
        let devices = parse_device_listing(LISTING).unwrap();
        let busy = parse_active_uuids("gpu_uuid\nGPU-aaaa\nGPU-bbbb\nGPU-cccc\n");
        let err = ResourcePool::from_descriptors(classify(&devices, &busy)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ResourceUnavailable { detected: 3 }
        ));
    }

    #[test]
    fn assignments_cycle_over_free_devices() {
        let devices = parse_device_listing(LISTING).unwrap();
        let busy = parse_active_uuids("gpu_uuid\nGPU-bbbb\n");
        let pool = ResourcePool::from_descriptors(classify(&devices, &busy)).unwrap();
        let assigned = pool.assignments(5);
        assert_eq!(
            assigned,
            vec![
                DeviceId::new("0"),
                DeviceId::new("2"),
                DeviceId::new("0"),
                DeviceId::new("2"),
                DeviceId::new("0"),
            ]
        );
    }

    #[test]
    fn concurrency_multiplies_free_devices() {
        let devices = parse_device_listing(LISTING).unwrap();
        let pool =
            ResourcePool::from_descriptors(classify(&devices, &HashSet::new())).unwrap();
        assert_eq!(pool.concurrency(2), 6);
    }
}

//! Compute-device discovery and assignment.
//!
//! Devices are discovered once at run start and classified as free or busy;
//! the pool is static for the run's lifetime. Assignment is advisory
//! bookkeeping only — nothing stops two jobs assigned to the same device
//! from genuinely running at once when the jobs-per-device multiplier is
//! above one.

mod pool;
mod query;

pub use pool::{DeviceId, ResourceDescriptor, ResourcePool};
pub use query::{DeviceQuery, NvidiaSmiQuery};

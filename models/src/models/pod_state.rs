use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time resource usage snapshot for a pod, pulled periodically from
/// that pod's hypervisor summary. At most one row exists per `pod_id`; stale
/// reads are tolerated between refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodState {
	pub pod_id: String,
	pub count: u32,
	pub vcpus: f64,
	pub vcpus_used: f64,
	pub memory_mb: u64,
	pub memory_mb_used: u64,
	pub local_gb: u64,
	pub local_gb_used: u64,
	pub free_ram_mb: u64,
	pub free_disk_gb: u64,
	pub current_workload: u32,
	pub running_vms: u32,
	pub disk_available_least: u64,
	pub updated_at: DateTime<Utc>,
}

impl PodState {
	/// Free vCPU headroom, recomputed rather than trusted as a stored field.
	pub fn free_vcpus(&self) -> f64 {
		self.vcpus - self.vcpus_used
	}

	/// Free RAM headroom, recomputed from the raw counters.
	pub fn free_ram_mb(&self) -> u64 {
		self.memory_mb.saturating_sub(self.memory_mb_used)
	}
}

use models::PodState;

use crate::config::FilterSchedulerConfig;
use crate::scheduling::filters::PodView;

/// Scores a pod from its `PodState`. Each weigher also carries a
/// configured sign-and-scale (`weight_multiplier`); the combination law
/// lives in `WeigherPipeline::weigh`, not here.
pub trait PodWeigher: Send + Sync {
	fn name(&self) -> &'static str;
	fn weigh_object(&self, state: Option<&PodState>) -> f64;
	fn weight_multiplier(&self) -> f64;
}

pub struct RamWeigher(pub f64);
impl PodWeigher for RamWeigher {
	fn name(&self) -> &'static str {
		"Ram"
	}
	fn weigh_object(&self, state: Option<&PodState>) -> f64 {
		state.map(|s| s.free_ram_mb() as f64).unwrap_or(0.0)
	}
	fn weight_multiplier(&self) -> f64 {
		self.0
	}
}

pub struct DiskWeigher(pub f64);
impl PodWeigher for DiskWeigher {
	fn name(&self) -> &'static str {
		"Disk"
	}
	fn weigh_object(&self, state: Option<&PodState>) -> f64 {
		state.map(|s| s.free_disk_gb as f64).unwrap_or(0.0)
	}
	fn weight_multiplier(&self) -> f64 {
		self.0
	}
}

pub struct VcpuWeigher(pub f64);
impl PodWeigher for VcpuWeigher {
	fn name(&self) -> &'static str {
		"VCPU"
	}
	fn weigh_object(&self, state: Option<&PodState>) -> f64 {
		state.map(|s| s.free_vcpus()).unwrap_or(0.0)
	}
	fn weight_multiplier(&self) -> f64 {
		self.0
	}
}

/// Positive multiplier over `running_vms` *raises* the weight of already
/// loaded pods — the spec adopts this literal behavior over the source
/// comment's "spreading" framing (§9); operators who want to bin-pack
/// away from loaded pods configure a negative multiplier instead.
pub struct WorkloadWeigher(pub f64);
impl PodWeigher for WorkloadWeigher {
	fn name(&self) -> &'static str {
		"Workload"
	}
	fn weigh_object(&self, state: Option<&PodState>) -> f64 {
		state.map(|s| s.running_vms as f64).unwrap_or(0.0)
	}
	fn weight_multiplier(&self) -> f64 {
		self.0
	}
}

/// Scores surviving pods and normalizes/combines weighted components.
pub struct WeigherPipeline {
	weighers: Vec<Box<dyn PodWeigher>>,
}

impl WeigherPipeline {
	pub fn new(weighers: Vec<Box<dyn PodWeigher>>) -> Self {
		Self { weighers }
	}

	pub fn from_config(config: &FilterSchedulerConfig) -> Self {
		Self::new(vec![
			Box::new(RamWeigher(config.ram_weight_multiplier)),
			Box::new(DiskWeigher(config.disk_weight_multiplier)),
			Box::new(VcpuWeigher(config.vcpu_weight_multiplier)),
			Box::new(WorkloadWeigher(config.workload_weight_multiplier)),
		])
	}

	/// Each weigher's raw scores across `views` are min-max normalized to
	/// `[0,1]`, multiplied by that weigher's multiplier, then summed
	/// across weighers. Returns `(view, weight)` sorted descending.
	pub fn weigh(&self, views: &[PodView]) -> Vec<(PodView, f64)> {
		if views.is_empty() {
			return Vec::new();
		}

		let mut totals = vec![0.0_f64; views.len()];

		for weigher in &self.weighers {
			let raw: Vec<f64> = views.iter().map(|v| weigher.weigh_object(v.state.as_ref())).collect();
			let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
			let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
			let multiplier = weigher.weight_multiplier();

			for (i, score) in raw.iter().enumerate() {
				let normalized = if (max - min).abs() < f64::EPSILON { 0.0 } else { (score - min) / (max - min) };
				totals[i] += normalized * multiplier;
			}
		}

		let mut scored: Vec<(PodView, f64)> = views.iter().cloned().zip(totals).collect();
		scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
		scored
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use models::Pod;
	use std::collections::HashMap;

	fn view_with_disk(name: &str, free_disk_gb: u64) -> PodView {
		PodView {
			pod: Pod {
				pod_id: name.to_string(),
				pod_name: name.to_string(),
				az_name: "az1".to_string(),
				dc_name: "dc".to_string(),
				pod_az_name: "az1".to_string(),
				is_under_maintenance: false,
				create_time: Utc::now(),
			},
			state: Some(PodState {
				pod_id: name.to_string(),
				count: 1,
				vcpus: 8.0,
				vcpus_used: 2.0,
				memory_mb: 4096,
				memory_mb_used: 1024,
				local_gb: 100,
				local_gb_used: 10,
				free_ram_mb: 3072,
				free_disk_gb,
				current_workload: 0,
				running_vms: 0,
				disk_available_least: 90,
				updated_at: Utc::now(),
			}),
			affinity_tags: HashMap::new(),
			tenant_bound: false,
		}
	}

	#[test]
	fn picks_highest_free_disk() {
		let pipeline = WeigherPipeline::new(vec![Box::new(DiskWeigher(1.0))]);
		let views = vec![view_with_disk("a", 4), view_with_disk("b", 8), view_with_disk("c", 12)];
		let scored = pipeline.weigh(&views);
		assert_eq!(scored[0].0.pod.pod_name, "c");
	}

	#[test]
	fn constant_scores_contribute_exactly_zero() {
		let pipeline = WeigherPipeline::new(vec![Box::new(DiskWeigher(1.0))]);
		let views = vec![view_with_disk("a", 10), view_with_disk("b", 10)];
		let scored = pipeline.weigh(&views);
		assert_eq!(scored[0].1, 0.0);
		assert_eq!(scored[1].1, 0.0);
	}

	#[test]
	fn empty_candidates_returns_empty() {
		let pipeline = WeigherPipeline::new(vec![Box::new(DiskWeigher(1.0))]);
		assert!(pipeline.weigh(&[]).is_empty());
	}

	#[test]
	fn contribution_bounded_by_multiplier() {
		let pipeline = WeigherPipeline::new(vec![Box::new(DiskWeigher(2.5))]);
		let views = vec![view_with_disk("a", 1), view_with_disk("b", 100)];
		let scored = pipeline.weigh(&views);
		for (_, weight) in &scored {
			assert!(*weight >= 0.0 && *weight <= 2.5);
		}
	}
}

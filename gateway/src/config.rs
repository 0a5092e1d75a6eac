use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Top-level runtime configuration, one nested group per §6 of the spec.
/// Loaded the way the teacher loads its service configs: environment
/// variables read through `dotenv` at process start, typed defaults
/// supplied via `Default`, and an explicit validation step
/// (`GatewayConfig::build_scheduler`) that fails fast on bad input rather
/// than discovering it lazily at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
	pub filter_scheduler: FilterSchedulerConfig,
	pub scheduler: SchedulerConfig,
	pub worker: WorkerConfig,
	pub client: ClientConfig,
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			filter_scheduler: FilterSchedulerConfig::default(),
			scheduler: SchedulerConfig::default(),
			worker: WorkerConfig::default(),
			client: ClientConfig::default(),
		}
	}
}

impl GatewayConfig {
	/// Loads configuration from environment variables, falling back to
	/// defaults for anything unset. Mirrors `health-check/src/main.rs` and
	/// `shared_config.rs`, both of which call `dotenv().ok()` before reading
	/// process env at startup.
	pub fn from_env() -> Self {
		let _ = dotenv::dotenv();

		let mut config = GatewayConfig::default();

		if let Ok(v) = std::env::var("RAM_WEIGHT_MULTIPLIER") {
			if let Ok(v) = v.parse() {
				config.filter_scheduler.ram_weight_multiplier = v;
			}
		}
		if let Ok(v) = std::env::var("DISK_WEIGHT_MULTIPLIER") {
			if let Ok(v) = v.parse() {
				config.filter_scheduler.disk_weight_multiplier = v;
			}
		}
		if let Ok(v) = std::env::var("VCPU_WEIGHT_MULTIPLIER") {
			if let Ok(v) = v.parse() {
				config.filter_scheduler.vcpu_weight_multiplier = v;
			}
		}
		if let Ok(v) = std::env::var("WORKLOAD_WEIGHT_MULTIPLIER") {
			if let Ok(v) = v.parse() {
				config.filter_scheduler.workload_weight_multiplier = v;
			}
		}
		if let Ok(v) = std::env::var("POD_SUBSET_SIZE") {
			if let Ok(v) = v.parse::<i64>() {
				config.filter_scheduler.pod_subset_size = v.max(1) as usize;
			}
		}
		if let Ok(v) = std::env::var("SHUFFLE_BEST_SAME_WEIGHED_PODS") {
			if let Ok(v) = v.parse() {
				config.filter_scheduler.shuffle_best_same_weighed_pods = v;
			}
		}
		if let Ok(v) = std::env::var("SCHEDULER_DRIVER") {
			if let Ok(driver) = v.parse() {
				config.scheduler.driver = driver;
			}
		}
		if let Ok(v) = std::env::var("TOP_POD_NAME") {
			config.client.top_pod_name = v;
		}
		if let Ok(v) = std::env::var("AUTO_REFRESH_ENDPOINT") {
			if let Ok(v) = v.parse() {
				config.client.auto_refresh_endpoint = v;
			}
		}

		config
	}

	/// Validates `enabled_filters` against `available_filters` eagerly.
	/// Any enabled name absent from the registry roots is a hard
	/// configuration error, never a lazily-discovered one (§7).
	pub fn validate_enabled_filters(&self) -> GatewayResult<()> {
		for name in &self.filter_scheduler.enabled_filters {
			if !self.filter_scheduler.available_filters.contains(name) {
				return Err(GatewayError::SchedulerPodFilterNotFound(name.clone()));
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSchedulerConfig {
	pub ram_weight_multiplier: f64,
	pub disk_weight_multiplier: f64,
	pub vcpu_weight_multiplier: f64,
	pub workload_weight_multiplier: f64,
	pub pod_subset_size: usize,
	pub available_filters: Vec<String>,
	pub enabled_filters: Vec<String>,
	pub shuffle_best_same_weighed_pods: bool,
}

impl Default for FilterSchedulerConfig {
	fn default() -> Self {
		let available_filters: Vec<String> = [
			"AllPod",
			"AvailabilityZone",
			"BottomPod",
			"DestinationPod",
			"IgnorePod",
			"CreateTime",
			"Disk",
			"Ram",
			"PodAffinityTag",
			"Tenant",
		]
		.iter()
		.map(|s| s.to_string())
		.collect();

		let enabled_filters = available_filters.clone();

		Self {
			ram_weight_multiplier: 1.0,
			disk_weight_multiplier: 1.0,
			vcpu_weight_multiplier: 1.0,
			workload_weight_multiplier: 1.0,
			pod_subset_size: 1,
			available_filters,
			enabled_filters,
			shuffle_best_same_weighed_pods: false,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerDriver {
	FilterScheduler,
	ChanceScheduler,
}

impl Default for SchedulerDriver {
	fn default() -> Self {
		SchedulerDriver::FilterScheduler
	}
}

impl std::str::FromStr for SchedulerDriver {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"filter_scheduler" => Ok(SchedulerDriver::FilterScheduler),
			"chance_scheduler" => Ok(SchedulerDriver::ChanceScheduler),
			other => Err(format!("unknown scheduler driver: {other}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
	pub driver: SchedulerDriver,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			driver: SchedulerDriver::default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
	#[serde(with = "duration_secs")]
	pub worker_handle_timeout: Duration,
	#[serde(with = "duration_secs")]
	pub job_run_expire: Duration,
	#[serde(with = "duration_secs")]
	pub worker_sleep_time: Duration,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			worker_handle_timeout: Duration::from_secs(600),
			job_run_expire: Duration::from_secs(150),
			worker_sleep_time: Duration::from_secs(1),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
	pub top_pod_name: String,
	pub auto_refresh_endpoint: bool,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			top_pod_name: "top".to_string(),
			auto_refresh_endpoint: true,
		}
	}
}

mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		let secs = u64::deserialize(d)?;
		Ok(Duration::from_secs(secs))
	}
}

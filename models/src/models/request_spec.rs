use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable per-call selection input: identity, constraints, resource
/// demand, and a time cutoff. Built once by a handler and threaded
/// unchanged through the filter/weigher/scheduler pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
	pub project_id: String,
	pub requested_destination: Option<String>,
	pub ignore_pods: HashSet<String>,
	pub az_name: String,
	pub affinity_tags: HashMap<String, String>,
	pub load_sensitive: bool,
	pub time_sensitive: bool,
	pub create_time: Option<DateTime<Utc>>,
	pub vcpus: Option<f64>,
	pub memory_mb: Option<u64>,
	pub disk_gb: Option<u64>,
}

impl RequestSpec {
	/// A spec with no constraints beyond tenant identity; callers refine
	/// with the builder-style `with_*` methods.
	pub fn new(project_id: impl Into<String>) -> Self {
		Self {
			project_id: project_id.into(),
			requested_destination: None,
			ignore_pods: HashSet::new(),
			az_name: String::new(),
			affinity_tags: HashMap::new(),
			load_sensitive: false,
			time_sensitive: false,
			create_time: None,
			vcpus: None,
			memory_mb: None,
			disk_gb: None,
		}
	}

	pub fn with_az(mut self, az_name: impl Into<String>) -> Self {
		self.az_name = az_name.into();
		self
	}

	pub fn with_destination(mut self, pod_name: impl Into<String>) -> Self {
		self.requested_destination = Some(pod_name.into());
		self
	}

	pub fn with_resources(mut self, vcpus: f64, memory_mb: u64, disk_gb: u64) -> Self {
		self.vcpus = Some(vcpus);
		self.memory_mb = Some(memory_mb);
		self.disk_gb = Some(disk_gb);
		self
	}

	pub fn with_affinity_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.affinity_tags.insert(key.into(), value.into());
		self
	}

	/// Returns a copy with the given pod names added to the ignore set,
	/// used by the scheduler's unbound phase to avoid rechoosing pods the
	/// tenant is already bound to.
	pub fn ignoring(&self, extra: impl IntoIterator<Item = String>) -> Self {
		let mut spec = self.clone();
		spec.ignore_pods.extend(extra);
		spec
	}
}

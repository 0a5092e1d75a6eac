use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row describing an attempted execution of a named reconciliation
/// against a resource. Lifecycle is strictly `New -> Running -> {Success, Fail}`;
/// a `Running` row older than `job_run_expire` is swept to `Fail` by the
/// coordinator rather than left to block future attempts forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	pub id: String,
	pub job_type: String,
	pub resource_id: String,
	/// Sentinel distinguishing the single live attempt for a (type, resource_id)
	/// pair from historical rows; regenerated per registration attempt.
	pub extra_id: String,
	pub timestamp: DateTime<Utc>,
	pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
	New,
	Running,
	Success,
	Fail,
}

impl Job {
	pub fn key(job_type: &str, resource_id: &str) -> (String, String) {
		(job_type.to_string(), resource_id.to_string())
	}
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use models::{Job, JobStatus};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Append-only per-`(type, resource_id)` history of job attempts. Each
/// registration attempt is its own row (fresh `id`/`extra_id`), so the
/// "latest row by timestamp" and "latest Success" queries the coordinator
/// needs are plain scans over this history rather than mutations of a
/// single shared row.
#[derive(Clone)]
pub struct JobStore {
	rows: Arc<Mutex<HashMap<(String, String), Vec<Job>>>>,
}

/// Outcome of the conditional `register` write. The expiry reclaim
/// described in the spec ("if its timestamp is older than job_run_expire,
/// forcibly mark Fail and continue") is folded directly into this call per
/// the design note in §9 — `register` itself is the guarded write
/// `(status != Running) OR (now - timestamp > job_run_expire)`, so a
/// caller observing `AlreadyRunning` already knows the existing row is
/// live and unexpired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
	Registered(String),
	AlreadyRunning,
}

impl Default for JobStore {
	fn default() -> Self {
		Self::new()
	}
}

impl JobStore {
	pub fn new() -> Self {
		Self {
			rows: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Inserts a `New` row and returns its timestamp (`t_new`).
	pub async fn insert_new(&self, job_type: &str, resource_id: &str) -> DateTime<Utc> {
		let now = Utc::now();
		let job = Job {
			id: Uuid::new_v4().to_string(),
			job_type: job_type.to_string(),
			resource_id: resource_id.to_string(),
			extra_id: Uuid::new_v4().to_string(),
			timestamp: now,
			status: JobStatus::New,
		};
		self.rows
			.lock()
			.await
			.entry(Job::key(job_type, resource_id))
			.or_default()
			.push(job);
		now
	}

	/// The conditional compare-and-set described above: registers a
	/// `Running` row for `(job_type, resource_id)` unless one already
	/// exists and is younger than `job_run_expire`.
	pub async fn register(&self, job_type: &str, resource_id: &str, job_run_expire: Duration) -> RegisterOutcome {
		let mut rows = self.rows.lock().await;
		let history = rows.entry(Job::key(job_type, resource_id)).or_default();

		if let Some(running) = history.iter_mut().rev().find(|j| j.status == JobStatus::Running) {
			let age = Utc::now().signed_duration_since(running.timestamp);
			let expired = age.to_std().map(|age| age > job_run_expire).unwrap_or(true);
			if expired {
				running.status = JobStatus::Fail;
			} else {
				return RegisterOutcome::AlreadyRunning;
			}
		}

		let extra_id = Uuid::new_v4().to_string();
		history.push(Job {
			id: Uuid::new_v4().to_string(),
			job_type: job_type.to_string(),
			resource_id: resource_id.to_string(),
			extra_id: extra_id.clone(),
			timestamp: Utc::now(),
			status: JobStatus::Running,
		});
		RegisterOutcome::Registered(extra_id)
	}

	pub async fn mark_success(&self, job_type: &str, resource_id: &str, extra_id: &str) {
		self.transition(job_type, resource_id, extra_id, JobStatus::Success).await;
	}

	pub async fn mark_fail(&self, job_type: &str, resource_id: &str, extra_id: &str) {
		self.transition(job_type, resource_id, extra_id, JobStatus::Fail).await;
	}

	async fn transition(&self, job_type: &str, resource_id: &str, extra_id: &str, status: JobStatus) {
		let mut rows = self.rows.lock().await;
		if let Some(history) = rows.get_mut(&Job::key(job_type, resource_id)) {
			if let Some(job) = history.iter_mut().find(|j| j.extra_id == extra_id) {
				job.status = status;
				job.timestamp = Utc::now();
			}
		}
	}

	/// Latest timestamp across `Success` rows for this key, if any.
	pub async fn latest_success_at(&self, job_type: &str, resource_id: &str) -> Option<DateTime<Utc>> {
		self.rows
			.lock()
			.await
			.get(&Job::key(job_type, resource_id))
			.and_then(|history| {
				history
					.iter()
					.filter(|j| j.status == JobStatus::Success)
					.map(|j| j.timestamp)
					.max()
			})
	}

	/// Latest row (by timestamp) for this key, used by `redo_failed_jobs`.
	pub async fn latest_row(&self, job_type: &str, resource_id: &str) -> Option<Job> {
		self.rows
			.lock()
			.await
			.get(&Job::key(job_type, resource_id))
			.and_then(|history| history.iter().max_by_key(|j| j.timestamp).cloned())
	}

	/// All `(type, resource_id)` keys whose latest row is `Fail`.
	pub async fn keys_with_latest_fail(&self) -> Vec<(String, String)> {
		self.rows
			.lock()
			.await
			.iter()
			.filter_map(|(key, history)| {
				history
					.iter()
					.max_by_key(|j| j.timestamp)
					.filter(|j| j.status == JobStatus::Fail)
					.map(|_| key.clone())
			})
			.collect()
	}

	/// Forcibly marks the current `Running` row for `(job_type,
	/// resource_id)` as `Fail`, regardless of age. Exposed for tests that
	/// need to simulate a crashed worker without waiting out the real TTL.
	#[cfg(test)]
	pub async fn force_fail_running(&self, job_type: &str, resource_id: &str) {
		let mut rows = self.rows.lock().await;
		if let Some(history) = rows.get_mut(&Job::key(job_type, resource_id)) {
			if let Some(job) = history.iter_mut().rev().find(|j| j.status == JobStatus::Running) {
				job.status = JobStatus::Fail;
			}
		}
	}
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::{interval, Instant};

use crate::config::WorkerConfig;
use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};
use crate::jobs::handlers::POD_STATE_STATISTICS;
use crate::stores::job_store::RegisterOutcome;
use crate::stores::{JobStore, PodCatalog};

/// A registered reconciliation handler: `(ctx, payload) -> ()`. MUST be
/// idempotent because redo can fire after partial effects (§4.5).
pub type JobHandler = Arc<dyn Fn(RequestContext, HashMap<String, String>) -> BoxFuture<'static, GatewayResult<()>> + Send + Sync>;

/// Records, claims, executes, expires, and redoes background jobs with
/// per-`(type, resource)` mutual exclusion. The hardest part of the core:
/// `run` gives at-most-one-concurrent-execution and eventual progress
/// under worker crash; `redo_failed_jobs` picks up anything that failed.
#[derive(Clone)]
pub struct JobCoordinator {
	store: JobStore,
	handlers: Arc<Mutex<HashMap<String, JobHandler>>>,
	// last payload used per (type, resource_id), so a later redo can replay
	// the same call without the Job table itself carrying a payload column.
	payloads: Arc<Mutex<HashMap<(String, String), HashMap<String, String>>>>,
	config: WorkerConfig,
}

impl JobCoordinator {
	pub fn new(config: WorkerConfig) -> Self {
		Self {
			store: JobStore::new(),
			handlers: Arc::new(Mutex::new(HashMap::new())),
			payloads: Arc::new(Mutex::new(HashMap::new())),
			config,
		}
	}

	pub async fn register_handler(&self, job_type: impl Into<String>, handler: JobHandler) {
		self.handlers.lock().await.insert(job_type.into(), handler);
	}

	/// Synchronous variant used during construction, before the coordinator
	/// is shared across tasks and the handlers map is guaranteed uncontended.
	pub fn register_handler_sync(&self, job_type: impl Into<String>, handler: JobHandler) {
		if let Ok(mut handlers) = self.handlers.try_lock() {
			handlers.insert(job_type.into(), handler);
		}
	}

	/// The at-most-one-concurrent-execution loop described in §4.5. `f` is
	/// the work to perform if this call wins registration; it is invoked at
	/// most once per `New` marker.
	pub async fn run<F, Fut>(&self, ctx: &RequestContext, job_type: &str, resource_id: &str, f: F) -> GatewayResult<()>
	where
		F: Fn(RequestContext) -> Fut + Send + Sync,
		Fut: Future<Output = GatewayResult<()>> + Send,
	{
		let t_new = self.store.insert_new(job_type, resource_id).await;
		let deadline = Instant::now() + self.config.worker_handle_timeout;

		loop {
			if let Some(t_success) = self.store.latest_success_at(job_type, resource_id).await {
				if t_success >= t_new {
					return Ok(());
				}
			}

			if Instant::now() >= deadline {
				return Err(GatewayError::ServiceUnavailable(format!(
					"job {job_type}/{resource_id} did not complete within worker_handle_timeout"
				)));
			}

			match self.store.register(job_type, resource_id, self.config.job_run_expire).await {
				RegisterOutcome::Registered(extra_id) => {
					let result = f(ctx.clone()).await;
					match &result {
						Ok(()) => self.store.mark_success(job_type, resource_id, &extra_id).await,
						Err(_) => self.store.mark_fail(job_type, resource_id, &extra_id).await,
					}
					return result;
				}
				RegisterOutcome::AlreadyRunning => {
					tokio::time::sleep(self.config.worker_sleep_time).await;
					// Another worker holds this job and its row is not expired;
					// let it finish rather than spin.
					return Ok(());
				}
			}
		}
	}

	/// Runs the handler registered for `job_type` against `resource_id`,
	/// remembering `payload` so a future redo can replay the same call.
	pub async fn run_registered(
		&self,
		ctx: &RequestContext,
		job_type: &str,
		resource_id: &str,
		payload: HashMap<String, String>,
	) -> GatewayResult<()> {
		let handler = self
			.handlers
			.lock()
			.await
			.get(job_type)
			.cloned()
			.ok_or_else(|| GatewayError::InvalidInput(format!("no handler registered for job type {job_type}")))?;

		self.payloads
			.lock()
			.await
			.insert((job_type.to_string(), resource_id.to_string()), payload.clone());

		self.run(ctx, job_type, resource_id, move |ctx| {
			let handler = handler.clone();
			let payload = payload.clone();
			async move { handler(ctx, payload).await }
		})
		.await
	}

	/// Periodic redo: of the `(type, resource_id)` pairs whose latest row
	/// is `Fail` and that have a registered handler, enqueues exactly one —
	/// chosen uniformly at random — for re-execution via `run` (§4.5, §9).
	pub async fn redo_failed_jobs(&self, ctx: &RequestContext) {
		let handlers = self.handlers.lock().await;
		let eligible: Vec<(String, String)> = self
			.store
			.keys_with_latest_fail()
			.await
			.into_iter()
			.filter(|(job_type, _)| handlers.contains_key(job_type))
			.collect();
		drop(handlers);

		if eligible.is_empty() {
			return;
		}

		use rand::Rng;
		let idx = rand::thread_rng().gen_range(0..eligible.len());
		let (job_type, resource_id) = eligible[idx].clone();

		let payload = self
			.payloads
			.lock()
			.await
			.get(&(job_type.clone(), resource_id.clone()))
			.cloned()
			.unwrap_or_default();

		if let Err(err) = self.run_registered(ctx, &job_type, &resource_id, payload).await {
			tracing::warn!(job_type = %job_type, resource_id = %resource_id, error = %err, "redo attempt failed");
		}
	}

	/// Spawns the coordinator's own background loop: a periodic
	/// `redo_failed_jobs` tick, the async analogue of the teacher's
	/// `VolumeScheduler::run_scheduler_loop`. The returned handle can be
	/// aborted to stop the loop; this is process lifecycle management, not
	/// per-job cancellation (§5).
	pub fn start_redo_loop(&self, ctx: RequestContext, tick: std::time::Duration) -> tokio::task::JoinHandle<()> {
		let coordinator = self.clone();
		tokio::spawn(async move {
			let mut ticker = interval(tick);
			loop {
				ticker.tick().await;
				coordinator.redo_failed_jobs(&ctx).await;
			}
		})
	}

	/// Spawns the sibling loop that actually produces `pod_state_statistics`
	/// activity: each tick it scans every non-top pod in `catalog` and
	/// dispatches a `run_registered` for it, the way the original's
	/// `pod_state_statistics` periodic task scans `db_api.list_pods` every
	/// cycle and skips pods with an empty `az_name` (`xjob/xmanager.py`).
	/// Without this loop `redo_failed_jobs` would have nothing to redo: it
	/// only re-enqueues keys whose latest row is already `Fail`, and only
	/// this loop ever creates the first row for a given pod.
	pub fn start_pod_state_statistics_loop(
		&self,
		ctx: RequestContext,
		catalog: PodCatalog,
		tick: std::time::Duration,
	) -> tokio::task::JoinHandle<()> {
		let coordinator = self.clone();
		tokio::spawn(async move {
			let mut ticker = interval(tick);
			loop {
				ticker.tick().await;
				for pod in catalog.list_pods(&ctx).await {
					if pod.is_top() {
						continue;
					}
					let mut payload = HashMap::new();
					payload.insert("pod_id".to_string(), pod.pod_id.clone());
					if let Err(err) = coordinator.run_registered(&ctx, POD_STATE_STATISTICS, &pod.pod_id, payload).await {
						tracing::warn!(pod_id = %pod.pod_id, error = %err, "pod_state_statistics dispatch failed");
					}
				}
			}
		})
	}

	pub fn store(&self) -> &JobStore {
		&self.store
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	fn fast_config() -> WorkerConfig {
		WorkerConfig {
			worker_handle_timeout: Duration::from_secs(5),
			job_run_expire: Duration::from_millis(50),
			worker_sleep_time: Duration::from_millis(5),
		}
	}

	#[tokio::test]
	async fn concurrent_run_invokes_handler_at_most_once() {
		let coordinator = JobCoordinator::new(fast_config());
		let ctx = RequestContext::new("tenant-a");
		let calls = Arc::new(AtomicUsize::new(0));

		let mut handles = Vec::new();
		for _ in 0..6 {
			let coordinator = coordinator.clone();
			let ctx = ctx.clone();
			let calls = calls.clone();
			handles.push(tokio::spawn(async move {
				coordinator
					.run(&ctx, "reconcile", "res-1", move |_ctx| {
						let calls = calls.clone();
						async move {
							calls.fetch_add(1, Ordering::SeqCst);
							tokio::time::sleep(Duration::from_millis(20)).await;
							Ok(())
						}
					})
					.await
			}));
		}
		for handle in handles {
			handle.await.unwrap().unwrap();
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn expiry_sweep_allows_a_later_run_to_succeed() {
		let coordinator = JobCoordinator::new(fast_config());
		let ctx = RequestContext::new("tenant-a");

		// Register a running row directly via the store and never complete it,
		// simulating a crashed worker.
		coordinator.store().register("reconcile", "res-2", Duration::from_secs(9999)).await;
		tokio::time::sleep(Duration::from_millis(80)).await;

		let result = coordinator
			.run(&ctx, "reconcile", "res-2", |_ctx| async { Ok(()) })
			.await;
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn redo_reenqueues_failed_job_and_stops_once_it_succeeds() {
		let coordinator = JobCoordinator::new(fast_config());
		let ctx = RequestContext::new("tenant-a");
		let attempt = Arc::new(AtomicUsize::new(0));

		let attempt_for_handler = attempt.clone();
		coordinator
			.register_handler(
				"reconcile",
				Arc::new(move |_ctx, _payload| {
					let attempt = attempt_for_handler.clone();
					Box::pin(async move {
						let n = attempt.fetch_add(1, Ordering::SeqCst);
						if n == 0 {
							Err(GatewayError::ServiceUnavailable("transient".to_string()))
						} else {
							Ok(())
						}
					}) as BoxFuture<'static, GatewayResult<()>>
				}),
			)
			.await;

		let first = coordinator.run_registered(&ctx, "reconcile", "res-3", HashMap::new()).await;
		assert!(first.is_err());

		coordinator.redo_failed_jobs(&ctx).await;
		assert_eq!(attempt.load(Ordering::SeqCst), 2);

		// Latest row is now Success; another redo tick must not re-enqueue.
		coordinator.redo_failed_jobs(&ctx).await;
		assert_eq!(attempt.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn pod_state_statistics_loop_dispatches_every_non_top_pod() {
		use models::Pod;

		let catalog = PodCatalog::new();
		let ctx = RequestContext::new("tenant-a");
		let admin_ctx = RequestContext::admin("admin");

		catalog
			.create_pod(
				&ctx,
				Pod {
					pod_id: "bottom-1".to_string(),
					pod_name: "bottom-1".to_string(),
					az_name: "az1".to_string(),
					dc_name: "dc".to_string(),
					pod_az_name: "az1".to_string(),
					is_under_maintenance: false,
					create_time: chrono::Utc::now(),
				},
			)
			.await
			.unwrap();
		catalog
			.create_pod(
				&ctx,
				Pod {
					pod_id: "top".to_string(),
					pod_name: "top".to_string(),
					az_name: String::new(),
					dc_name: "dc".to_string(),
					pod_az_name: String::new(),
					is_under_maintenance: false,
					create_time: chrono::Utc::now(),
				},
			)
			.await
			.unwrap();

		let coordinator = JobCoordinator::new(fast_config());
		let dispatched = Arc::new(Mutex::new(Vec::new()));
		let dispatched_for_handler = dispatched.clone();
		coordinator
			.register_handler(
				POD_STATE_STATISTICS,
				Arc::new(move |_ctx, payload: HashMap<String, String>| {
					let dispatched = dispatched_for_handler.clone();
					Box::pin(async move {
						dispatched.lock().await.push(payload.get("pod_id").cloned().unwrap_or_default());
						Ok(())
					}) as BoxFuture<'static, GatewayResult<()>>
				}),
			)
			.await;

		let handle = coordinator.start_pod_state_statistics_loop(admin_ctx, catalog, Duration::from_millis(10));
		tokio::time::sleep(Duration::from_millis(60)).await;
		handle.abort();

		let seen = dispatched.lock().await.clone();
		assert!(seen.contains(&"bottom-1".to_string()));
		assert!(!seen.contains(&"top".to_string()));
	}
}

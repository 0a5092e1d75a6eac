pub mod config;
pub mod context;
pub mod error;
pub mod forwarder;
pub mod jobs;
pub mod scheduling;
pub mod stores;

use std::sync::Arc;
use std::time::Duration;

use models::Pod;

use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};
use crate::forwarder::{Forwarder, HttpTransport};
use crate::jobs::{pod_state_statistics_handler, JobCoordinator, POD_STATE_STATISTICS};
use crate::scheduling::Scheduler;
use crate::stores::{PodCatalog, RoutingStore};

/// Bundles the stores, scheduler, job coordinator, and forwarder behind a
/// single handle, wired together the way a handler actually reaches for
/// them (§2/§5). This is the crate's one stateful entry point; everything
/// else is either a pure pipeline stage or a store method.
#[derive(Clone)]
pub struct Gateway {
	pub pods: PodCatalog,
	pub routing: RoutingStore,
	pub jobs: JobCoordinator,
	pub scheduler: Arc<Scheduler>,
	pub forwarder: Forwarder,
	pub config: GatewayConfig,
}

impl Gateway {
	/// Builds a gateway wired for production: `HttpTransport` for
	/// forwarding, `ThreadRandom` for scheduling, reservation TTL set to
	/// `job_run_expire` per the design note that reservation and job
	/// expiry share the same wall-clock window.
	pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
		let transport = Arc::new(HttpTransport::new()?);
		Self::new_with_transport(config, transport)
	}

	/// Builds a gateway over a caller-supplied `DownstreamTransport`, the
	/// seam tests and demos use to substitute an in-memory fake for the
	/// real `reqwest`-backed client (§4.6).
	pub fn new_with_transport(
		config: GatewayConfig,
		transport: Arc<dyn crate::forwarder::DownstreamTransport>,
	) -> GatewayResult<Self> {
		let pods = PodCatalog::new();
		let routing = RoutingStore::new(config.worker.job_run_expire);
		let scheduler = Arc::new(Scheduler::from_config(pods.clone(), &config)?);
		let forwarder = Forwarder::new(transport, config.client.auto_refresh_endpoint);
		let jobs = JobCoordinator::new(config.worker.clone());

		let gateway = Self {
			pods,
			routing,
			jobs,
			scheduler,
			forwarder,
			config,
		};
		gateway.register_default_handlers();
		Ok(gateway)
	}

	fn register_default_handlers(&self) {
		let handler = pod_state_statistics_handler(self.pods.clone(), self.forwarder.clone());
		self.jobs.register_handler_sync(POD_STATE_STATISTICS, handler);
	}

	/// Spawns the gateway's background work: the job coordinator's periodic
	/// `redo_failed_jobs` tick, and the sibling loop that dispatches
	/// `pod_state_statistics` for every pod each tick. The returned handle
	/// aborts both loops together to stop the gateway's background work.
	pub fn start_background_jobs(&self, ctx: RequestContext, tick: Duration) -> BackgroundTasks {
		let redo = self.jobs.start_redo_loop(ctx.clone(), tick);
		let pod_state_statistics = self.jobs.start_pod_state_statistics_loop(ctx, self.pods.clone(), tick);
		BackgroundTasks { redo, pod_state_statistics }
	}

	/// Picks a destination pod for `spec`, or `None` if no eligible pod exists.
	pub async fn select_destination(&self, ctx: &RequestContext, spec: &models::RequestSpec) -> GatewayResult<Option<(Pod, String)>> {
		self.scheduler.select_destination(ctx, spec).await
	}

	/// Removes a pod, refusing if any routing row still references it — the
	/// cross-store invariant `PodCatalog` alone cannot enforce (§5).
	pub async fn delete_pod(&self, ctx: &RequestContext, pod_id: &str) -> GatewayResult<()> {
		if self.routing.references_pod(pod_id).await {
			return Err(GatewayError::Conflict(format!(
				"pod {pod_id} still has routing rows referencing it"
			)));
		}
		self.pods.remove_pod(ctx, pod_id).await
	}
}

/// Handles for the gateway's two spawned background loops, returned
/// together so a caller can shut down both with one call.
pub struct BackgroundTasks {
	redo: tokio::task::JoinHandle<()>,
	pod_state_statistics: tokio::task::JoinHandle<()>,
}

impl BackgroundTasks {
	pub fn abort(&self) {
		self.redo.abort();
		self.pod_state_statistics.abort();
	}
}

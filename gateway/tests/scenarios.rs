//! Cross-module integration tests for the end-to-end scenarios in §8 of the
//! spec, driven through the public `Gateway` surface rather than any single
//! component's internals — placed under `tests/` the way the teacher's
//! workspace would for a library crate with no pre-existing integration
//! test directory of its own.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gateway::config::GatewayConfig;
use gateway::context::RequestContext;
use gateway::forwarder::{DownstreamResponse, DownstreamTransport, HttpMethod};
use gateway::Gateway;
use models::{Pod, PodState, ReserveStatus};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

struct EchoCreateTransport {
	calls: AtomicUsize,
}

#[async_trait]
impl DownstreamTransport for EchoCreateTransport {
	async fn call(
		&self,
		_base_url: &str,
		_method: HttpMethod,
		_path: &str,
		_headers: &[(String, String)],
		body: Option<Value>,
	) -> gateway::error::GatewayResult<DownstreamResponse> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let mut record = body.unwrap_or(json!({}));
		record["id"] = json!("bottom-1");
		Ok(DownstreamResponse { status: 201, body: record })
	}
}

struct NotFoundAfterDeleteTransport {
	deleted: AsyncMutex<bool>,
}

#[async_trait]
impl DownstreamTransport for NotFoundAfterDeleteTransport {
	async fn call(
		&self,
		_base_url: &str,
		method: HttpMethod,
		_path: &str,
		_headers: &[(String, String)],
		_body: Option<Value>,
	) -> gateway::error::GatewayResult<DownstreamResponse> {
		if method == HttpMethod::Delete {
			*self.deleted.lock().await = true;
			return Ok(DownstreamResponse { status: 202, body: Value::Null });
		}
		if *self.deleted.lock().await {
			return Ok(DownstreamResponse { status: 404, body: Value::Null });
		}
		Ok(DownstreamResponse { status: 200, body: json!({"id": "bottom-1"}) })
	}
}

fn sample_pod(id: &str, az: &str) -> Pod {
	Pod {
		pod_id: id.to_string(),
		pod_name: id.to_string(),
		az_name: az.to_string(),
		dc_name: "dc1".to_string(),
		pod_az_name: az.to_string(),
		is_under_maintenance: false,
		create_time: Utc::now(),
	}
}

fn ample_state(pod_id: &str) -> PodState {
	PodState {
		pod_id: pod_id.to_string(),
		count: 1,
		vcpus: 16.0,
		vcpus_used: 1.0,
		memory_mb: 65536,
		memory_mb_used: 1024,
		local_gb: 2000,
		local_gb_used: 100,
		free_ram_mb: 64512,
		free_disk_gb: 1900,
		current_workload: 0,
		running_vms: 0,
		disk_available_least: 1900,
		updated_at: Utc::now(),
	}
}

/// S5: two concurrent create attempts for the same top_id race on
/// `reserve`; exactly one proceeds to forward, and a third observer sees
/// `RES_DONE` with the bottom_id the owner recorded.
#[tokio::test]
async fn s5_create_race_has_exactly_one_owner() {
	let transport = Arc::new(EchoCreateTransport { calls: AtomicUsize::new(0) });
	let gateway = Gateway::new_with_transport(GatewayConfig::default(), transport.clone()).unwrap();
	let ctx = RequestContext::new("tenant-a");

	gateway.pods.create_pod(&ctx, sample_pod("pod-1", "az1")).await.unwrap();
	gateway.pods.update_pod_state(&ctx, ample_state("pod-1")).await;
	gateway.forwarder.register_endpoint("pod-1", "volume", "http://pod-1.invalid").await;

	let mut handles = Vec::new();
	for _ in 0..6 {
		let gateway = gateway.clone();
		let ctx = ctx.clone();
		handles.push(tokio::spawn(async move {
			gateway.routing.reserve(&ctx, "top-race", "volume", "tenant-a", "pod-1").await.1
		}));
	}

	let mut owners = 0;
	for handle in handles {
		if handle.await.unwrap() == ReserveStatus::Owned {
			owners += 1;
		}
	}
	assert_eq!(owners, 1);

	let pod = gateway.pods.get_by_id(&ctx, "pod-1").await.unwrap();
	gateway
		.forwarder
		.forward_create(&ctx, &gateway.routing, &pod, "volume", "top-race", "/volumes", json!({}))
		.await
		.unwrap();

	let (row, status) = gateway.routing.reserve(&ctx, "top-race", "volume", "tenant-a", "pod-1").await;
	assert_eq!(status, ReserveStatus::ResDone);
	assert_eq!(row.bottom_id.as_deref(), Some("bottom-1"));
}

/// Create -> get -> delete through the full stack (scheduler picks a pod,
/// forwarder records/clears routing), proving the request-forwarding
/// contract handlers rely on (§6) rather than just its pieces.
#[tokio::test]
async fn create_get_delete_round_trip_through_the_gateway() {
	let transport = Arc::new(NotFoundAfterDeleteTransport { deleted: AsyncMutex::new(false) });
	let gateway = Gateway::new_with_transport(GatewayConfig::default(), transport).unwrap();
	let ctx = RequestContext::new("tenant-a");

	gateway.pods.create_pod(&ctx, sample_pod("pod-1", "az1")).await.unwrap();
	gateway.pods.update_pod_state(&ctx, ample_state("pod-1")).await;
	gateway.forwarder.register_endpoint("pod-1", "volume", "http://pod-1.invalid").await;

	let spec = models::RequestSpec::new("tenant-a").with_resources(1.0, 1024, 10);
	let (pod, _name) = gateway.select_destination(&ctx, &spec).await.unwrap().unwrap();
	assert_eq!(pod.pod_id, "pod-1");

	gateway.routing.reserve(&ctx, "top-1", "volume", "tenant-a", &pod.pod_id).await;
	gateway
		.forwarder
		.forward_create(&ctx, &gateway.routing, &pod, "volume", "top-1", "/volumes", json!({}))
		.await
		.unwrap();

	let routing = gateway.routing.lookup_bottoms(&ctx, "top-1", "volume").await.unwrap();
	assert_eq!(routing.bottom_id.as_deref(), Some("bottom-1"));

	gateway
		.forwarder
		.forward_read(&ctx, &gateway.routing, &pod, "volume", "top-1", "/volumes/bottom-1")
		.await
		.unwrap();

	gateway
		.forwarder
		.forward(&pod, "volume", HttpMethod::Delete, Vec::new(), "/volumes/bottom-1", None)
		.await
		.unwrap();

	// The pod now reports 404 for this resource; a subsequent read must
	// clear the stale routing row (§4.4/§8 invariant 6).
	gateway
		.forwarder
		.forward_read(&ctx, &gateway.routing, &pod, "volume", "top-1", "/volumes/bottom-1")
		.await
		.unwrap();

	let err = gateway.routing.lookup_bottoms(&ctx, "top-1", "volume").await.unwrap_err();
	assert!(matches!(err, gateway::error::GatewayError::NotFound(_)));
}

/// S6: a handler that fails its first attempt gets picked up by the next
/// `redo_failed_jobs` tick and succeeds; a later tick does not re-invoke it
/// because the latest row is now Success.
#[tokio::test]
async fn s6_job_redo_recovers_from_a_failed_attempt() {
	let gateway = Gateway::new(GatewayConfig::default()).unwrap();
	let ctx = RequestContext::admin("admin");

	let attempts = Arc::new(AtomicUsize::new(0));
	let attempts_for_handler = attempts.clone();
	gateway
		.jobs
		.register_handler(
			"reconcile_demo",
			Arc::new(move |_ctx, _payload: HashMap<String, String>| {
				let attempts = attempts_for_handler.clone();
				Box::pin(async move {
					let n = attempts.fetch_add(1, Ordering::SeqCst);
					if n == 0 {
						Err(gateway::error::GatewayError::ServiceUnavailable("transient".to_string()))
					} else {
						Ok(())
					}
				}) as futures_util::future::BoxFuture<'static, gateway::error::GatewayResult<()>>
			}),
		)
		.await;

	let first = gateway.jobs.run_registered(&ctx, "reconcile_demo", "res-1", HashMap::new()).await;
	assert!(first.is_err());

	gateway.jobs.redo_failed_jobs(&ctx).await;
	assert_eq!(attempts.load(Ordering::SeqCst), 2);

	gateway.jobs.redo_failed_jobs(&ctx).await;
	assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

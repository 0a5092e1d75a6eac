use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use models::PodState;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};
use crate::forwarder::{Forwarder, HttpMethod};
use crate::jobs::coordinator::JobHandler;
use crate::stores::PodCatalog;

pub const POD_STATE_STATISTICS: &str = "pod_state_statistics";
const HYPERVISOR_SERVICE: &str = "hypervisor";

/// Builds the one reconciliation job the gateway ships with: pulls a
/// hypervisor usage summary from a pod's registered `hypervisor` endpoint
/// and upserts the result into `PodCatalog` as that pod's current
/// `PodState` (§4.5). The payload carries `pod_id`; everything else is
/// read back from the response body.
pub fn pod_state_statistics_handler(pod_catalog: PodCatalog, forwarder: Forwarder) -> JobHandler {
	Arc::new(move |ctx: RequestContext, payload: HashMap<String, String>| {
		let pod_catalog = pod_catalog.clone();
		let forwarder = forwarder.clone();
		Box::pin(async move { run(&ctx, &pod_catalog, &forwarder, &payload).await }) as BoxFuture<'static, GatewayResult<()>>
	})
}

async fn run(ctx: &RequestContext, pod_catalog: &PodCatalog, forwarder: &Forwarder, payload: &HashMap<String, String>) -> GatewayResult<()> {
	let pod_id = payload
		.get("pod_id")
		.ok_or_else(|| GatewayError::InvalidInput("pod_state_statistics payload missing pod_id".to_string()))?;

	let pod = pod_catalog.get_by_id(ctx, pod_id).await?;
	let response = forwarder
		.forward(&pod, HYPERVISOR_SERVICE, HttpMethod::Get, Vec::new(), "/stats", None)
		.await?;

	if !response.is_success() {
		return Err(GatewayError::ServiceUnavailable(format!(
			"hypervisor stats for pod {pod_id} returned status {}",
			response.status
		)));
	}

	let state = parse_pod_state(pod_id, &response.body);
	pod_catalog.update_pod_state(ctx, state).await;
	Ok(())
}

fn parse_pod_state(pod_id: &str, body: &Value) -> PodState {
	let get_u64 = |field: &str| body.get(field).and_then(|v| v.as_u64()).unwrap_or(0);
	let get_f64 = |field: &str| body.get(field).and_then(|v| v.as_f64()).unwrap_or(0.0);
	let get_u32 = |field: &str| body.get(field).and_then(|v| v.as_u64()).unwrap_or(0) as u32;

	let memory_mb = get_u64("memory_mb");
	let memory_mb_used = get_u64("memory_mb_used");
	let local_gb = get_u64("local_gb");
	let local_gb_used = get_u64("local_gb_used");

	PodState {
		pod_id: pod_id.to_string(),
		count: get_u32("count"),
		vcpus: get_f64("vcpus"),
		vcpus_used: get_f64("vcpus_used"),
		memory_mb,
		memory_mb_used,
		local_gb,
		local_gb_used,
		free_ram_mb: memory_mb.saturating_sub(memory_mb_used),
		free_disk_gb: local_gb.saturating_sub(local_gb_used),
		current_workload: get_u32("current_workload"),
		running_vms: get_u32("running_vms"),
		disk_available_least: get_u64("disk_available_least"),
		updated_at: chrono::Utc::now(),
	}
}

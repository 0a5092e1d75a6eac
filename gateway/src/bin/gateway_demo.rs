//! One representative handler-shaped demo wiring an axum router over the
//! gateway library, in the style of the teacher's `api::server::ApiServer` +
//! `api::handlers::pods` pairing (§6). Exercises create/get/delete for a
//! single resource family ("volume") end to end against an in-memory fake
//! pod, plus the admin-only pod affinity tag API.
//!
//! Full per-resource REST handlers for every OpenStack service are out of
//! scope (§1); this binary exists to prove the core's contract is usable
//! from real HTTP handlers.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use gateway::config::GatewayConfig;
use gateway::context::RequestContext;
use gateway::error::{GatewayError, GatewayResult};
use gateway::forwarder::{DownstreamResponse, DownstreamTransport, HttpMethod};
use gateway::Gateway;
use models::{Pod, RequestSpec};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

const RESOURCE_TYPE: &str = "volume";
const BOTTOM_POD_ID: &str = "pod-1";
const BOTTOM_POD_NAME: &str = "pod-1";

/// Stands in for a pod's REST API: create assigns a bottom id, get/delete
/// observe whatever create produced, matching the forwarder tests'
/// `FakeTransport` but keeping its own small resource table so the demo's
/// create/get/delete round trip is actually observable end to end.
struct FakePodBackend {
	resources: Mutex<HashMap<String, Value>>,
}

impl FakePodBackend {
	fn new() -> Self {
		Self {
			resources: Mutex::new(HashMap::new()),
		}
	}
}

#[async_trait]
impl DownstreamTransport for FakePodBackend {
	async fn call(
		&self,
		_base_url: &str,
		method: HttpMethod,
		path: &str,
		_headers: &[(String, String)],
		body: Option<Value>,
	) -> GatewayResult<DownstreamResponse> {
		let mut resources = self.resources.lock().await;
		match method {
			HttpMethod::Post => {
				let id = Uuid::new_v4().to_string();
				let mut record = body.unwrap_or(json!({}));
				record["id"] = json!(id.clone());
				resources.insert(id, record.clone());
				Ok(DownstreamResponse { status: 201, body: record })
			}
			HttpMethod::Get | HttpMethod::Delete => {
				let id = path.trim_start_matches("/volumes/").to_string();
				match resources.get(&id).cloned() {
					Some(record) => {
						if method == HttpMethod::Delete {
							resources.remove(&id);
						}
						Ok(DownstreamResponse { status: 200, body: record })
					}
					None => Ok(DownstreamResponse { status: 404, body: Value::Null }),
				}
			}
			HttpMethod::Put | HttpMethod::Patch => Ok(DownstreamResponse { status: 200, body: Value::Null }),
		}
	}
}

struct AppState {
	gateway: Gateway,
}

#[derive(Debug, Deserialize)]
struct CreateVolumeRequest {
	size_gb: u64,
	project_id: String,
}

fn wire_error(err: &GatewayError) -> (StatusCode, Json<Value>) {
	let wire = err.to_wire();
	let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	(status, Json(serde_json::to_value(&wire).unwrap_or(Value::Null)))
}

async fn create_volume(Extension(state): Extension<Arc<AppState>>, Json(req): Json<CreateVolumeRequest>) -> impl IntoResponse {
	let ctx = RequestContext::new(req.project_id.clone());
	let top_id = Uuid::new_v4().to_string();

	let spec = RequestSpec::new(req.project_id.clone()).with_resources(0.0, 0, req.size_gb);
	let destination = match state.gateway.select_destination(&ctx, &spec).await {
		Ok(Some((pod, _name))) => pod,
		Ok(None) => {
			let err = GatewayError::ServiceUnavailable("no eligible pod for this request".to_string());
			return wire_error(&err).into_response();
		}
		Err(err) => return wire_error(&err).into_response(),
	};

	let (_row, status) = state
		.gateway
		.routing
		.reserve(&ctx, &top_id, RESOURCE_TYPE, &req.project_id, &destination.pod_id)
		.await;
	if status != models::ReserveStatus::Owned {
		let err = GatewayError::Conflict(format!("create for {top_id} already in flight"));
		return wire_error(&err).into_response();
	}

	let body = json!({ "size_gb": req.size_gb, "project_id": req.project_id });
	match state
		.gateway
		.forwarder
		.forward_create(&ctx, &state.gateway.routing, &destination, RESOURCE_TYPE, &top_id, "/volumes", body)
		.await
	{
		Ok(response) if response.is_success() => {
			(StatusCode::CREATED, Json(json!({ "id": top_id, "pod": destination.pod_name, "volume": response.body }))).into_response()
		}
		Ok(response) => (StatusCode::BAD_GATEWAY, Json(json!({ "status": response.status }))).into_response(),
		Err(err) => wire_error(&err).into_response(),
	}
}

async fn get_volume(Extension(state): Extension<Arc<AppState>>, Path(top_id): Path<String>) -> impl IntoResponse {
	let ctx = RequestContext::new("unused".to_string());
	let routing = match state.gateway.routing.lookup_bottoms(&ctx, &top_id, RESOURCE_TYPE).await {
		Ok(routing) => routing,
		Err(err) => return wire_error(&err).into_response(),
	};
	let ctx = RequestContext::new(routing.project_id.clone());
	let pod = match state.gateway.pods.get_by_id(&ctx, &routing.pod_id).await {
		Ok(pod) => pod,
		Err(err) => return wire_error(&err).into_response(),
	};
	let bottom_id = routing.bottom_id.clone().unwrap_or_default();
	match state
		.gateway
		.forwarder
		.forward_read(&ctx, &state.gateway.routing, &pod, RESOURCE_TYPE, &top_id, &format!("/volumes/{bottom_id}"))
		.await
	{
		Ok(response) if response.is_not_found() => {
			wire_error(&GatewayError::NotFound(format!("{RESOURCE_TYPE}:{top_id}"))).into_response()
		}
		Ok(response) => Json(response.body).into_response(),
		Err(err) => wire_error(&err).into_response(),
	}
}

async fn delete_volume(Extension(state): Extension<Arc<AppState>>, Path(top_id): Path<String>) -> impl IntoResponse {
	let ctx = RequestContext::new("unused".to_string());
	let routing = match state.gateway.routing.lookup_bottoms(&ctx, &top_id, RESOURCE_TYPE).await {
		Ok(routing) => routing,
		Err(err) => return wire_error(&err).into_response(),
	};
	let ctx = RequestContext::new(routing.project_id.clone());
	let pod = match state.gateway.pods.get_by_id(&ctx, &routing.pod_id).await {
		Ok(pod) => pod,
		Err(err) => return wire_error(&err).into_response(),
	};
	let bottom_id = routing.bottom_id.clone().unwrap_or_default();
	// DELETE is treated as async: the routing row is preserved (§6).
	match state
		.gateway
		.forwarder
		.forward(&pod, RESOURCE_TYPE, HttpMethod::Delete, Vec::new(), &format!("/volumes/{bottom_id}"), None)
		.await
	{
		Ok(_) => StatusCode::ACCEPTED.into_response(),
		Err(err) => wire_error(&err).into_response(),
	}
}

#[derive(Debug, Deserialize)]
struct AffinityTagRequest {
	pod_affinity_tag: Option<AffinityTagFields>,
}

#[derive(Debug, Deserialize)]
struct AffinityTagFields {
	pod_id: Option<String>,
	key: Option<String>,
	value: Option<String>,
}

async fn create_affinity_tag(Extension(state): Extension<Arc<AppState>>, Json(req): Json<AffinityTagRequest>) -> impl IntoResponse {
	let ctx = RequestContext::admin("admin".to_string());
	let Some(fields) = req.pod_affinity_tag else {
		return wire_error(&GatewayError::InvalidInput("missing pod_affinity_tag".to_string())).into_response();
	};
	let (Some(pod_id), Some(key), Some(value)) = (fields.pod_id, fields.key, fields.value) else {
		return wire_error(&GatewayError::InvalidInput("pod_id, key, and value are required".to_string())).into_response();
	};

	match state.gateway.pods.create_affinity_tag(&ctx, pod_id, key, value).await {
		Ok(tag) => (StatusCode::CREATED, Json(json!({ "pod_affinity_tag": tag }))).into_response(),
		Err(err) => wire_error(&err).into_response(),
	}
}

async fn get_affinity_tag(Extension(state): Extension<Arc<AppState>>, Path(tag_id): Path<String>) -> impl IntoResponse {
	let ctx = RequestContext::admin("admin".to_string());
	match state.gateway.pods.get_affinity_tag(&ctx, &tag_id).await {
		Ok(tag) => Json(json!({ "pod_affinity_tag": tag })).into_response(),
		Err(err) => wire_error(&err).into_response(),
	}
}

#[derive(Debug, Deserialize)]
struct AffinityTagListQuery {
	pod_id: Option<String>,
}

async fn list_affinity_tags(Extension(state): Extension<Arc<AppState>>, Query(q): Query<AffinityTagListQuery>) -> impl IntoResponse {
	let ctx = RequestContext::admin("admin".to_string());
	let tags = state.gateway.pods.list_affinity_tags(&ctx, q.pod_id.as_deref()).await;
	Json(json!({ "pod_affinity_tags": tags })).into_response()
}

async fn delete_affinity_tag(Extension(state): Extension<Arc<AppState>>, Path(tag_id): Path<String>) -> impl IntoResponse {
	let ctx = RequestContext::admin("admin".to_string());
	match state.gateway.pods.delete_affinity_tag(&ctx, &tag_id).await {
		Ok(()) => StatusCode::NO_CONTENT.into_response(),
		Err(err) => wire_error(&err).into_response(),
	}
}

async fn seed_demo_pod(gateway: &Gateway) {
	let ctx = RequestContext::admin("admin".to_string());
	let pod = Pod {
		pod_id: BOTTOM_POD_ID.to_string(),
		pod_name: BOTTOM_POD_NAME.to_string(),
		az_name: "az1".to_string(),
		dc_name: "dc1".to_string(),
		pod_az_name: "az1".to_string(),
		is_under_maintenance: false,
		create_time: Utc::now(),
	};
	gateway.pods.create_pod(&ctx, pod).await.expect("seed pod");
	gateway
		.pods
		.update_pod_state(
			&ctx,
			models::PodState {
				pod_id: BOTTOM_POD_ID.to_string(),
				count: 1,
				vcpus: 16.0,
				vcpus_used: 2.0,
				memory_mb: 65536,
				memory_mb_used: 8192,
				local_gb: 2000,
				local_gb_used: 200,
				free_ram_mb: 57344,
				free_disk_gb: 1800,
				current_workload: 0,
				running_vms: 0,
				disk_available_least: 1800,
				updated_at: Utc::now(),
			},
		)
		.await;
	gateway.forwarder.register_endpoint(BOTTOM_POD_ID, RESOURCE_TYPE, "http://pod-1.invalid").await;
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt::init();

	let config = GatewayConfig::from_env();
	let transport = Arc::new(FakePodBackend::new());
	let gateway = Gateway::new_with_transport(config, transport).expect("failed to build gateway");
	seed_demo_pod(&gateway).await;

	let background = gateway.start_background_jobs(RequestContext::admin("admin".to_string()), std::time::Duration::from_secs(30));

	let state = Arc::new(AppState { gateway });
	let app = Router::new()
		.route("/volumes", post(create_volume))
		.route("/volumes/:top_id", get(get_volume).delete(delete_volume))
		.route("/admin/pod-affinity-tags", post(create_affinity_tag).get(list_affinity_tags))
		.route("/admin/pod-affinity-tags/:tag_id", get(get_affinity_tag).delete(delete_affinity_tag))
		.layer(Extension(state))
		.layer(tower_http::trace::TraceLayer::new_for_http())
		.layer(tower_http::cors::CorsLayer::permissive());

	let listener = tokio::net::TcpListener::bind("0.0.0.0:8089").await.expect("bind demo listener");
	tracing::info!("gateway demo listening on {}", listener.local_addr().unwrap());
	axum::serve(listener, app).await.expect("demo server crashed");

	background.abort();
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use models::Pod;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{GatewayError, GatewayResult};
use crate::forwarder::transport::{DownstreamResponse, DownstreamTransport, HttpMethod};
use crate::stores::RoutingStore;

/// Re-reads the endpoint catalog from the trust service (Keystone, in the
/// original) after a connection failure. Out of scope as a real client
/// per the spec; this seam lets a real implementation be supplied without
/// the `Forwarder` depending on it directly.
#[async_trait]
pub trait EndpointRefresher: Send + Sync {
	async fn refresh_endpoint(&self, pod_id: &str, service_type: &str) -> GatewayResult<String>;
}

/// Given `(ctx, pod, service_type, method, headers, url, body)`, reaches
/// the pod's endpoint for that service and returns the downstream
/// response, updating `RoutingStore` on a successful create per §4.6.
#[derive(Clone)]
pub struct Forwarder {
	transport: Arc<dyn DownstreamTransport>,
	endpoints: Arc<Mutex<HashMap<(String, String), String>>>,
	unavailable: Arc<Mutex<HashSet<(String, String)>>>,
	version_map: Arc<Mutex<HashMap<String, String>>>,
	auto_refresh_endpoint: bool,
	refresher: Option<Arc<dyn EndpointRefresher>>,
}

impl Forwarder {
	pub fn new(transport: Arc<dyn DownstreamTransport>, auto_refresh_endpoint: bool) -> Self {
		Self {
			transport,
			endpoints: Arc::new(Mutex::new(HashMap::new())),
			unavailable: Arc::new(Mutex::new(HashSet::new())),
			version_map: Arc::new(Mutex::new(HashMap::new())),
			auto_refresh_endpoint,
			refresher: None,
		}
	}

	pub fn with_refresher(mut self, refresher: Arc<dyn EndpointRefresher>) -> Self {
		self.refresher = Some(refresher);
		self
	}

	pub async fn register_endpoint(&self, pod_id: impl Into<String>, service_type: impl Into<String>, base_url: impl Into<String>) {
		let key = (pod_id.into(), service_type.into());
		self.unavailable.lock().await.remove(&key);
		self.endpoints.lock().await.insert(key, base_url.into());
	}

	/// Configures a compatibility rewrite applied to the `x-service-version`
	/// header for a given service type, when an operator needs to paper
	/// over a version skew between top and pod.
	pub async fn set_version_override(&self, service_type: impl Into<String>, version: impl Into<String>) {
		self.version_map.lock().await.insert(service_type.into(), version.into());
	}

	pub async fn forward(
		&self,
		pod: &Pod,
		service_type: &str,
		method: HttpMethod,
		mut headers: Vec<(String, String)>,
		path: &str,
		body: Option<Value>,
	) -> GatewayResult<DownstreamResponse> {
		if let Some(version) = self.version_map.lock().await.get(service_type) {
			headers.push(("x-service-version".to_string(), version.clone()));
		}

		let key = (pod.pod_id.clone(), service_type.to_string());
		let base_url = self
			.endpoints
			.lock()
			.await
			.get(&key)
			.cloned()
			.ok_or_else(|| GatewayError::EndpointNotFound(format!("{}/{}", pod.pod_name, service_type)))?;

		match self.transport.call(&base_url, method, path, &headers, body.clone()).await {
			Ok(response) => Ok(response),
			Err(GatewayError::EndpointNotAvailable(reason)) => {
				tracing::warn!(pod_id = %pod.pod_id, service_type = %service_type, reason = %reason, "downstream endpoint unavailable");
				self.unavailable.lock().await.insert(key.clone());

				if !self.auto_refresh_endpoint {
					return Err(GatewayError::EndpointNotAvailable(reason));
				}

				let Some(refresher) = &self.refresher else {
					return Err(GatewayError::EndpointNotAvailable(reason));
				};

				let refreshed_url = refresher.refresh_endpoint(&pod.pod_id, service_type).await?;
				tracing::info!(pod_id = %pod.pod_id, service_type = %service_type, "refreshed endpoint, retrying once");
				self.endpoints.lock().await.insert(key.clone(), refreshed_url.clone());
				self.unavailable.lock().await.remove(&key);

				self.transport.call(&refreshed_url, method, path, &headers, body).await
			}
			Err(other) => Err(other),
		}
	}

	/// Forwards a create, and on a successful (2xx) response, records the
	/// routing row mapping `top_id` to the downstream resource's id, per
	/// §6's create contract.
	pub async fn forward_create(
		&self,
		ctx: &crate::context::RequestContext,
		routing: &RoutingStore,
		pod: &Pod,
		resource_type: &str,
		top_id: &str,
		path: &str,
		body: Value,
	) -> GatewayResult<DownstreamResponse> {
		let response = self
			.forward(pod, resource_type, HttpMethod::Post, Vec::new(), path, Some(body))
			.await?;

		if response.is_success() {
			let bottom_id = response
				.body
				.get("id")
				.and_then(|v| v.as_str())
				.unwrap_or(top_id)
				.to_string();
			routing
				.complete(ctx, top_id, resource_type, &bottom_id, &pod.pod_id, &ctx.project_id)
				.await;
		}

		Ok(response)
	}

	/// Proxies a read, clearing the routing row on a 404 from the pod —
	/// the "stale routing cleanup" invariant from §4.4/§8.
	pub async fn forward_read(
		&self,
		ctx: &crate::context::RequestContext,
		routing: &RoutingStore,
		pod: &Pod,
		resource_type: &str,
		top_id: &str,
		path: &str,
	) -> GatewayResult<DownstreamResponse> {
		let response = self.forward(pod, resource_type, HttpMethod::Get, Vec::new(), path, None).await?;

		if response.is_not_found() {
			routing.delete(ctx, top_id, resource_type).await;
		}

		Ok(response)
	}

	pub async fn is_marked_unavailable(&self, pod_id: &str, service_type: &str) -> bool {
		self.unavailable
			.lock()
			.await
			.contains(&(pod_id.to_string(), service_type.to_string()))
	}
}

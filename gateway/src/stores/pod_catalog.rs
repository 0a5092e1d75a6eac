use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use models::{Pod, PodAffinityTag, PodBinding, PodState};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};

/// Pods, their pod-state snapshots, affinity tags, and tenant bindings.
///
/// Backed by lock-guarded in-memory maps behind this struct rather than a
/// SQL layer, per the `Store` trait seam noted in the crate's design notes:
/// swapping in a real database means providing another type with the same
/// methods, no call site here depends on the concrete storage.
#[derive(Clone)]
pub struct PodCatalog {
	pods: Arc<Mutex<HashMap<String, Pod>>>,
	pod_states: Arc<Mutex<HashMap<String, PodState>>>,
	affinity_tags: Arc<Mutex<HashMap<String, PodAffinityTag>>>,
	// keyed by (tenant_id, pod_id); at most one entry per (tenant_id, az_name)
	// may have is_binding = true, enforced in change_binding.
	bindings: Arc<Mutex<HashMap<(String, String), PodBinding>>>,
}

impl Default for PodCatalog {
	fn default() -> Self {
		Self::new()
	}
}

impl PodCatalog {
	pub fn new() -> Self {
		Self {
			pods: Arc::new(Mutex::new(HashMap::new())),
			pod_states: Arc::new(Mutex::new(HashMap::new())),
			affinity_tags: Arc::new(Mutex::new(HashMap::new())),
			bindings: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	pub async fn create_pod(&self, _ctx: &RequestContext, pod: Pod) -> GatewayResult<Pod> {
		let mut pods = self.pods.lock().await;
		if pods.values().any(|p| p.pod_name == pod.pod_name) {
			return Err(GatewayError::Conflict(format!(
				"pod name already registered: {}",
				pod.pod_name
			)));
		}
		pods.insert(pod.pod_id.clone(), pod.clone());
		Ok(pod)
	}

	pub async fn list_pods(&self, _ctx: &RequestContext) -> Vec<Pod> {
		self.pods.lock().await.values().cloned().collect()
	}

	pub async fn get_by_id(&self, _ctx: &RequestContext, pod_id: &str) -> GatewayResult<Pod> {
		self.pods
			.lock()
			.await
			.get(pod_id)
			.cloned()
			.ok_or_else(|| GatewayError::PodNotFound(pod_id.to_string()))
	}

	pub async fn get_by_name(&self, _ctx: &RequestContext, pod_name: &str) -> GatewayResult<Pod> {
		self.pods
			.lock()
			.await
			.values()
			.find(|p| p.pod_name == pod_name)
			.cloned()
			.ok_or_else(|| GatewayError::PodNotFound(pod_name.to_string()))
	}

	/// Pods in availability zones the tenant holds an active binding in.
	pub async fn list_pods_by_tenant(&self, _ctx: &RequestContext, tenant_id: &str) -> Vec<Pod> {
		let bound_azs: std::collections::HashSet<String> = self
			.bindings
			.lock()
			.await
			.values()
			.filter(|b| b.tenant_id == tenant_id && b.is_binding)
			.map(|b| b.az_name.clone())
			.collect();

		self.pods
			.lock()
			.await
			.values()
			.filter(|p| bound_azs.contains(&p.az_name))
			.cloned()
			.collect()
	}

	pub async fn create_affinity_tag(
		&self,
		_ctx: &RequestContext,
		pod_id: String,
		key: String,
		value: String,
	) -> GatewayResult<PodAffinityTag> {
		if pod_id.is_empty() || key.is_empty() || value.is_empty() {
			return Err(GatewayError::InvalidInput(
				"pod_id, key, and value must all be non-empty".to_string(),
			));
		}
		if !self.pods.lock().await.contains_key(&pod_id) {
			return Err(GatewayError::PodNotFound(pod_id));
		}

		let tag = PodAffinityTag {
			affinity_tag_id: Uuid::new_v4().to_string(),
			pod_id,
			key,
			value,
		};
		self.affinity_tags
			.lock()
			.await
			.insert(tag.affinity_tag_id.clone(), tag.clone());
		Ok(tag)
	}

	pub async fn get_affinity_tag(
		&self,
		_ctx: &RequestContext,
		affinity_tag_id: &str,
	) -> GatewayResult<PodAffinityTag> {
		self.affinity_tags
			.lock()
			.await
			.get(affinity_tag_id)
			.cloned()
			.ok_or_else(|| GatewayError::NotFound(affinity_tag_id.to_string()))
	}

	pub async fn delete_affinity_tag(&self, _ctx: &RequestContext, affinity_tag_id: &str) -> GatewayResult<()> {
		self.affinity_tags
			.lock()
			.await
			.remove(affinity_tag_id)
			.map(|_| ())
			.ok_or_else(|| GatewayError::NotFound(affinity_tag_id.to_string()))
	}

	/// Lists affinity tags, optionally narrowed to a single pod.
	pub async fn list_affinity_tags(&self, _ctx: &RequestContext, pod_id: Option<&str>) -> Vec<PodAffinityTag> {
		self.affinity_tags
			.lock()
			.await
			.values()
			.filter(|t| pod_id.map(|id| t.pod_id == id).unwrap_or(true))
			.cloned()
			.collect()
	}

	/// Collapses a pod's tags into a lookup map; last write (by iteration
	/// order) wins on a duplicate key, matching the spec's "uniqueness of
	/// (pod_id, key) is not required" note.
	pub async fn affinity_tag_map(&self, pod_id: &str) -> HashMap<String, String> {
		let mut map = HashMap::new();
		for tag in self.affinity_tags.lock().await.values() {
			if tag.pod_id == pod_id {
				map.insert(tag.key.clone(), tag.value.clone());
			}
		}
		map
	}

	/// Inserts a new binding for a tenant with no prior binding anywhere
	/// for this pod. Callers that need the "switch within az" semantics
	/// should use `change_binding` instead.
	pub async fn create_binding(&self, _ctx: &RequestContext, tenant_id: String, pod_id: String, az_name: String) {
		let mut bindings = self.bindings.lock().await;
		bindings.insert(
			(tenant_id.clone(), pod_id.clone()),
			PodBinding {
				tenant_id,
				pod_id,
				az_name,
				is_binding: true,
			},
		);
	}

	/// Atomically activates `(tenant_id, pod_id)` in `az_name`, deactivating
	/// any other binding this tenant holds in the same az. This is the
	/// transactional "switch active within az" operation §5 requires.
	pub async fn change_binding(&self, _ctx: &RequestContext, tenant_id: &str, pod_id: &str, az_name: &str) {
		let mut bindings = self.bindings.lock().await;
		for binding in bindings.values_mut() {
			if binding.tenant_id == tenant_id && binding.az_name == az_name && binding.pod_id != pod_id {
				binding.is_binding = false;
			}
		}
		bindings
			.entry((tenant_id.to_string(), pod_id.to_string()))
			.and_modify(|b| b.is_binding = true)
			.or_insert(PodBinding {
				tenant_id: tenant_id.to_string(),
				pod_id: pod_id.to_string(),
				az_name: az_name.to_string(),
				is_binding: true,
			});
	}

	pub async fn active_binding(&self, tenant_id: &str, az_name: &str) -> Option<PodBinding> {
		self.bindings
			.lock()
			.await
			.values()
			.find(|b| b.tenant_id == tenant_id && b.az_name == az_name && b.is_binding)
			.cloned()
	}

	pub async fn active_bindings_for_tenant(&self, tenant_id: &str) -> Vec<PodBinding> {
		self.bindings
			.lock()
			.await
			.values()
			.filter(|b| b.tenant_id == tenant_id && b.is_binding)
			.cloned()
			.collect()
	}

	pub async fn is_tenant_bound_to_pod(&self, tenant_id: &str, pod_id: &str) -> bool {
		self.bindings
			.lock()
			.await
			.get(&(tenant_id.to_string(), pod_id.to_string()))
			.map(|b| b.is_binding)
			.unwrap_or(false)
	}

	pub async fn pod_state(&self, pod_id: &str) -> Option<PodState> {
		self.pod_states.lock().await.get(pod_id).cloned()
	}

	/// Upsert: insert-if-absent, else update-one. Single critical section
	/// under the store's lock so no two concurrent refreshes can produce
	/// duplicate rows for the same `pod_id` (§5).
	pub async fn update_pod_state(&self, _ctx: &RequestContext, mut state: PodState) {
		state.updated_at = Utc::now();
		self.pod_states.lock().await.insert(state.pod_id.clone(), state);
	}

	/// Removes a pod outright. Callers MUST first verify no routing row
	/// still references it — that cross-store check lives in
	/// `crate::Gateway::delete_pod` since `PodCatalog` has no visibility
	/// into `RoutingStore`.
	pub async fn remove_pod(&self, _ctx: &RequestContext, pod_id: &str) -> GatewayResult<()> {
		self.pods
			.lock()
			.await
			.remove(pod_id)
			.map(|_| ())
			.ok_or_else(|| GatewayError::PodNotFound(pod_id.to_string()))
	}
}

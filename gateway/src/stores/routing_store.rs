use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use models::{ReserveStatus, ResourceRouting};
use tokio::sync::Mutex;

use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};

/// Persisted mapping of top-level resource identifiers to their pod and
/// bottom-level counterparts. A row with `bottom_id = None` is a
/// reservation: a distributed lock held while the create call to the pod
/// is in flight. `(top_id, resource_type)` is unique, enforced here by the
/// store's own lock rather than a database constraint (§5).
#[derive(Clone)]
pub struct RoutingStore {
	rows: Arc<Mutex<HashMap<(String, String), ResourceRouting>>>,
	reservation_ttl: Duration,
}

impl RoutingStore {
	pub fn new(reservation_ttl: Duration) -> Self {
		Self {
			rows: Arc::new(Mutex::new(HashMap::new())),
			reservation_ttl,
		}
	}

	fn key(top_id: &str, resource_type: &str) -> (String, String) {
		(top_id.to_string(), resource_type.to_string())
	}

	/// Creates a routing row with `bottom_id = None` iff no row exists for
	/// `(top_id, resource_type)`. If one already exists: a filled-in row
	/// reports `RES_DONE`; a reservation younger than the TTL reports
	/// `NONE_DONE` (someone else is creating it, back off); an abandoned
	/// reservation is reclaimed and returned to the caller as `Owned`.
	pub async fn reserve(
		&self,
		_ctx: &RequestContext,
		top_id: &str,
		resource_type: &str,
		project_id: &str,
		pod_id: &str,
	) -> (ResourceRouting, ReserveStatus) {
		let mut rows = self.rows.lock().await;
		let key = Self::key(top_id, resource_type);

		match rows.get(&key) {
			None => {
				let now = Utc::now();
				let row = ResourceRouting {
					top_id: top_id.to_string(),
					bottom_id: None,
					pod_id: pod_id.to_string(),
					project_id: project_id.to_string(),
					resource_type: resource_type.to_string(),
					created_at: now,
					updated_at: now,
				};
				rows.insert(key, row.clone());
				(row, ReserveStatus::Owned)
			}
			Some(existing) if existing.bottom_id.is_some() => (existing.clone(), ReserveStatus::ResDone),
			Some(existing) => {
				let age = Utc::now().signed_duration_since(existing.updated_at);
				let stale = age
					.to_std()
					.map(|age| age > self.reservation_ttl)
					.unwrap_or(true);
				if stale {
					let now = Utc::now();
					let row = ResourceRouting {
						top_id: top_id.to_string(),
						bottom_id: None,
						pod_id: pod_id.to_string(),
						project_id: project_id.to_string(),
						resource_type: resource_type.to_string(),
						created_at: existing.created_at,
						updated_at: now,
					};
					rows.insert(key, row.clone());
					(row, ReserveStatus::Owned)
				} else {
					(existing.clone(), ReserveStatus::NoneDone)
				}
			}
		}
	}

	/// Fills in `bottom_id` on the reservation. If expiry handling ripped
	/// the row out from under us, a fresh row is inserted rather than
	/// erroring, matching the original's "complete is best-effort" shape.
	pub async fn complete(
		&self,
		_ctx: &RequestContext,
		top_id: &str,
		resource_type: &str,
		bottom_id: &str,
		pod_id: &str,
		project_id: &str,
	) -> ResourceRouting {
		let mut rows = self.rows.lock().await;
		let key = Self::key(top_id, resource_type);
		let now = Utc::now();

		let row = ResourceRouting {
			top_id: top_id.to_string(),
			bottom_id: Some(bottom_id.to_string()),
			pod_id: pod_id.to_string(),
			project_id: project_id.to_string(),
			resource_type: resource_type.to_string(),
			created_at: rows.get(&key).map(|r| r.created_at).unwrap_or(now),
			updated_at: now,
		};
		rows.insert(key, row.clone());
		row
	}

	pub async fn lookup_bottoms(
		&self,
		_ctx: &RequestContext,
		top_id: &str,
		resource_type: &str,
	) -> GatewayResult<ResourceRouting> {
		self.rows
			.lock()
			.await
			.get(&Self::key(top_id, resource_type))
			.cloned()
			.ok_or_else(|| GatewayError::NotFound(format!("{resource_type}:{top_id}")))
	}

	pub async fn lookup_by_tenant_pod(
		&self,
		_ctx: &RequestContext,
		tenant_id: &str,
		pod_id: &str,
		resource_type: &str,
	) -> HashMap<String, ResourceRouting> {
		self.rows
			.lock()
			.await
			.values()
			.filter(|r| r.project_id == tenant_id && r.pod_id == pod_id && r.resource_type == resource_type)
			.filter_map(|r| r.bottom_id.clone().map(|bottom_id| (bottom_id, r.clone())))
			.collect()
	}

	pub async fn delete(&self, _ctx: &RequestContext, top_id: &str, resource_type: &str) {
		self.rows.lock().await.remove(&Self::key(top_id, resource_type));
	}

	pub async fn references_pod(&self, pod_id: &str) -> bool {
		self.rows.lock().await.values().any(|r| r.pod_id == pod_id)
	}
}

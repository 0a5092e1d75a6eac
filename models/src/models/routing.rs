use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maps a top-level resource identifier to its pod and bottom-level
/// counterpart. A row with `bottom_id = None` is a reservation: a
/// distributed lock held while the create call to the pod is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRouting {
	pub top_id: String,
	pub bottom_id: Option<String>,
	pub pod_id: String,
	pub project_id: String,
	pub resource_type: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl ResourceRouting {
	pub fn is_reservation(&self) -> bool {
		self.bottom_id.is_none()
	}
}

/// Outcome of a `RoutingStore::reserve` call, reported back to the caller so
/// it knows whether it owns the create or should back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveStatus {
	/// No usable row existed (or the previous one was abandoned); the caller
	/// now owns the reservation and should proceed with the downstream create.
	Owned,
	/// The downstream resource already exists; the caller should not recreate it.
	ResDone,
	/// Another worker is creating this resource right now; back off.
	NoneDone,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single downstream cloud region the gateway can forward requests to.
///
/// A pod with an empty `az_name` is the "top" pod: it is never a
/// provisioning destination, only the entry point clients talk to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
	pub pod_id: String,
	pub pod_name: String,
	pub az_name: String,
	pub dc_name: String,
	pub pod_az_name: String,
	pub is_under_maintenance: bool,
	pub create_time: DateTime<Utc>,
}

impl Pod {
	/// The top pod is the one with an empty `az_name`; it is never scheduled to.
	pub fn is_top(&self) -> bool {
		self.az_name.is_empty()
	}
}

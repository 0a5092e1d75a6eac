use serde::{Deserialize, Serialize};

/// A tenant's "home" pod within an availability zone. At most one row per
/// `(tenant_id, az_name)` may have `is_binding = true`; switching the active
/// binding within an az flips the old row and activates the new one
/// atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodBinding {
	pub tenant_id: String,
	pub pod_id: String,
	pub az_name: String,
	pub is_binding: bool,
}

use serde::{Deserialize, Serialize};

/// Operator-authored (key, value) capability tag on a pod, e.g. `volume=SSD`.
///
/// Uniqueness of `(pod_id, key)` is not enforced at write time; when tags are
/// collapsed into a lookup map for filtering, the last write for a given key
/// wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodAffinityTag {
	pub affinity_tag_id: String,
	pub pod_id: String,
	pub key: String,
	pub value: String,
}

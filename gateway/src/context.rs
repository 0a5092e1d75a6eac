/// Explicit request context threaded through every store and pipeline
/// operation, replacing the thread-local request context the original
/// framework relies on. Carries tenant identity and the admin flag; a
/// transaction handle would join here if a real database backed the
/// stores (see `Store` trait seam in `crate::stores`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
	pub project_id: String,
	pub is_admin: bool,
}

impl RequestContext {
	pub fn new(project_id: impl Into<String>) -> Self {
		Self {
			project_id: project_id.into(),
			is_admin: false,
		}
	}

	pub fn admin(project_id: impl Into<String>) -> Self {
		Self {
			project_id: project_id.into(),
			is_admin: true,
		}
	}
}

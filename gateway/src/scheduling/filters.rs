use std::collections::HashMap;
use std::sync::Arc;

use models::{Pod, PodState, RequestSpec};

use crate::context::RequestContext;
use crate::error::{GatewayError, GatewayResult};

/// Everything a filter needs about one candidate pod, gathered up front so
/// filters stay pure predicates over owned data rather than each issuing
/// its own store reads.
#[derive(Debug, Clone)]
pub struct PodView {
	pub pod: Pod,
	pub state: Option<PodState>,
	pub affinity_tags: HashMap<String, String>,
	pub tenant_bound: bool,
}

/// A pure predicate over one pod and one spec. Built-ins below; an
/// operator can add more by implementing this trait and registering a
/// constructor in `available_filter`.
pub trait PodFilter: Send + Sync {
	fn name(&self) -> &'static str;
	fn passes(&self, ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool;
}

pub struct AllPodFilter;
impl PodFilter for AllPodFilter {
	fn name(&self) -> &'static str {
		"AllPod"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, _spec: &RequestSpec) -> bool {
		!view.pod.is_under_maintenance
	}
}

pub struct AvailabilityZoneFilter;
impl PodFilter for AvailabilityZoneFilter {
	fn name(&self) -> &'static str {
		"AvailabilityZone"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool {
		spec.az_name.is_empty() || spec.az_name == view.pod.az_name
	}
}

pub struct BottomPodFilter;
impl PodFilter for BottomPodFilter {
	fn name(&self) -> &'static str {
		"BottomPod"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, _spec: &RequestSpec) -> bool {
		!view.pod.is_top()
	}
}

pub struct DestinationPodFilter;
impl PodFilter for DestinationPodFilter {
	fn name(&self) -> &'static str {
		"DestinationPod"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool {
		match &spec.requested_destination {
			Some(destination) => destination == &view.pod.pod_name,
			None => true,
		}
	}
}

pub struct IgnorePodFilter;
impl PodFilter for IgnorePodFilter {
	fn name(&self) -> &'static str {
		"IgnorePod"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool {
		!spec.ignore_pods.contains(&view.pod.pod_name)
	}
}

pub struct CreateTimeFilter;
impl PodFilter for CreateTimeFilter {
	fn name(&self) -> &'static str {
		"CreateTime"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool {
		match spec.create_time {
			Some(cutoff) => view.pod.create_time >= cutoff,
			None => true,
		}
	}
}

pub struct DiskFilter;
impl PodFilter for DiskFilter {
	fn name(&self) -> &'static str {
		"Disk"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool {
		let Some(requested) = spec.disk_gb else {
			return true;
		};
		match &view.state {
			Some(state) => state.free_disk_gb >= requested,
			None => false,
		}
	}
}

pub struct RamFilter;
impl PodFilter for RamFilter {
	fn name(&self) -> &'static str {
		"Ram"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool {
		let Some(requested) = spec.memory_mb else {
			return true;
		};
		match &view.state {
			Some(state) => state.free_ram_mb() >= requested,
			None => false,
		}
	}
}

pub struct PodAffinityTagFilter;
impl PodFilter for PodAffinityTagFilter {
	fn name(&self) -> &'static str {
		"PodAffinityTag"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, spec: &RequestSpec) -> bool {
		spec.affinity_tags
			.iter()
			.all(|(k, v)| view.affinity_tags.get(k) == Some(v))
	}
}

/// Toggled on/off by the scheduler's two-phase policy: enabled during the
/// "bound phase" to prefer the tenant's home pod, disabled during the
/// "unbound phase" that establishes a new binding.
pub struct TenantFilter;
impl PodFilter for TenantFilter {
	fn name(&self) -> &'static str {
		"Tenant"
	}
	fn passes(&self, _ctx: &RequestContext, view: &PodView, _spec: &RequestSpec) -> bool {
		view.tenant_bound
	}
}

/// Compile-time registry resolving a filter name to an instance. Replaces
/// the original's runtime class discovery: `enabled_filters` is checked
/// against this registry eagerly at scheduler construction time, never
/// lazily at call time (§4.1, §9).
pub fn available_filter(name: &str) -> Option<Arc<dyn PodFilter>> {
	let filter: Arc<dyn PodFilter> = match name {
		"AllPod" => Arc::new(AllPodFilter),
		"AvailabilityZone" => Arc::new(AvailabilityZoneFilter),
		"BottomPod" => Arc::new(BottomPodFilter),
		"DestinationPod" => Arc::new(DestinationPodFilter),
		"IgnorePod" => Arc::new(IgnorePodFilter),
		"CreateTime" => Arc::new(CreateTimeFilter),
		"Disk" => Arc::new(DiskFilter),
		"Ram" => Arc::new(RamFilter),
		"PodAffinityTag" => Arc::new(PodAffinityTagFilter),
		"Tenant" => Arc::new(TenantFilter),
		_ => return None,
	};
	Some(filter)
}

/// An ordered filter chain, most selective first, short-circuiting per pod.
#[derive(Clone)]
pub struct FilterPipeline {
	filters: Vec<Arc<dyn PodFilter>>,
}

impl FilterPipeline {
	/// Resolves each name against the compile-time registry, failing hard
	/// on the first unknown name (`SchedulerPodFilterNotFound`).
	pub fn from_names(names: &[String]) -> GatewayResult<Self> {
		let filters = names
			.iter()
			.map(|name| available_filter(name).ok_or_else(|| GatewayError::SchedulerPodFilterNotFound(name.clone())))
			.collect::<GatewayResult<Vec<_>>>()?;
		Ok(Self { filters })
	}

	/// Returns a copy of this pipeline with `Tenant` removed or added,
	/// used by the scheduler to toggle the bound/unbound phases without
	/// rebuilding the whole chain from config each time.
	pub fn without(&self, name: &str) -> Self {
		Self {
			filters: self.filters.iter().filter(|f| f.name() != name).cloned().collect(),
		}
	}

	pub fn with(&self, filter: Arc<dyn PodFilter>) -> Self {
		let mut filters = self.filters.clone();
		if !filters.iter().any(|f| f.name() == filter.name()) {
			filters.push(filter);
		}
		Self { filters }
	}

	/// An empty candidate list is a valid result; the caller decides what
	/// "no pod" means.
	pub fn filter(&self, ctx: &RequestContext, candidates: Vec<PodView>, spec: &RequestSpec) -> Vec<PodView> {
		candidates
			.into_iter()
			.filter(|view| self.filters.iter().all(|f| f.passes(ctx, view, spec)))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	fn view(pod_name: &str, az: &str, maint: bool) -> PodView {
		PodView {
			pod: Pod {
				pod_id: pod_name.to_string(),
				pod_name: pod_name.to_string(),
				az_name: az.to_string(),
				dc_name: "dc".to_string(),
				pod_az_name: az.to_string(),
				is_under_maintenance: maint,
				create_time: Utc::now(),
			},
			state: None,
			affinity_tags: HashMap::new(),
			tenant_bound: false,
		}
	}

	#[test]
	fn filter_idempotence() {
		let pipeline = FilterPipeline::from_names(&[
			"AllPod".to_string(),
			"BottomPod".to_string(),
			"AvailabilityZone".to_string(),
		])
		.unwrap();
		let ctx = RequestContext::new("tenant-a");
		let spec = RequestSpec::new("tenant-a").with_az("az1");
		let candidates = vec![view("p1", "az1", false), view("p2", "az2", false), view("top", "", false)];

		let once = pipeline.filter(&ctx, candidates.clone(), &spec);
		let twice = pipeline.filter(&ctx, once.clone(), &spec);
		let names_once: Vec<_> = once.iter().map(|v| v.pod.pod_name.clone()).collect();
		let names_twice: Vec<_> = twice.iter().map(|v| v.pod.pod_name.clone()).collect();
		assert_eq!(names_once, names_twice);
		assert_eq!(names_once, vec!["p1".to_string()]);
	}

	#[test]
	fn unknown_filter_name_is_a_hard_error() {
		let err = FilterPipeline::from_names(&["NotReal".to_string()]).unwrap_err();
		assert!(matches!(err, GatewayError::SchedulerPodFilterNotFound(_)));
	}

	#[test]
	fn all_pod_filter_rejects_maintenance_pods() {
		let pipeline = FilterPipeline::from_names(&["AllPod".to_string()]).unwrap();
		let ctx = RequestContext::new("tenant-a");
		let spec = RequestSpec::new("tenant-a");
		let result = pipeline.filter(&ctx, vec![view("p1", "az1", true)], &spec);
		assert!(result.is_empty());
	}
}

use std::sync::Arc;

use models::{Pod, RequestSpec};

use crate::config::{GatewayConfig, SchedulerDriver};
use crate::context::RequestContext;
use crate::error::GatewayResult;
use crate::scheduling::filters::{
	AllPodFilter, BottomPodFilter, FilterPipeline, IgnorePodFilter, PodAffinityTagFilter, PodView, TenantFilter,
};
use crate::scheduling::weighers::WeigherPipeline;
use crate::stores::PodCatalog;

/// Randomness is a design input: production uses `ThreadRandom`, tests
/// inject a deterministic source so S1-style scenarios are reproducible
/// (§4.3).
pub trait RandomSource: Send + Sync {
	fn pick_index(&self, len: usize) -> usize;
	fn shuffle_indices(&self, len: usize) -> Vec<usize>;
}

pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
	fn pick_index(&self, len: usize) -> usize {
		use rand::Rng;
		if len <= 1 {
			0
		} else {
			rand::thread_rng().gen_range(0..len)
		}
	}

	fn shuffle_indices(&self, len: usize) -> Vec<usize> {
		use rand::seq::SliceRandom;
		let mut indices: Vec<usize> = (0..len).collect();
		indices.shuffle(&mut rand::thread_rng());
		indices
	}
}

/// The public selection operation: combines filters, weighers, the
/// tenant-binding policy, and randomization. Two drivers, chosen by
/// `scheduler.driver` in config.
pub struct Scheduler {
	catalog: PodCatalog,
	filter_pipeline: FilterPipeline,
	weigher_pipeline: WeigherPipeline,
	subset_size: usize,
	shuffle_best: bool,
	driver: SchedulerDriver,
	rng: Arc<dyn RandomSource>,
}

impl Scheduler {
	pub fn from_config(catalog: PodCatalog, config: &GatewayConfig) -> GatewayResult<Self> {
		config.validate_enabled_filters()?;
		let filter_pipeline = FilterPipeline::from_names(&config.filter_scheduler.enabled_filters)?;
		let weigher_pipeline = WeigherPipeline::from_config(&config.filter_scheduler);

		Ok(Self {
			catalog,
			filter_pipeline,
			weigher_pipeline,
			subset_size: config.filter_scheduler.pod_subset_size.max(1),
			shuffle_best: config.filter_scheduler.shuffle_best_same_weighed_pods,
			driver: config.scheduler.driver,
			rng: Arc::new(ThreadRandom),
		})
	}

	pub fn with_random_source(mut self, rng: Arc<dyn RandomSource>) -> Self {
		self.rng = rng;
		self
	}

	pub async fn select_destination(&self, ctx: &RequestContext, spec: &RequestSpec) -> GatewayResult<Option<(Pod, String)>> {
		match self.driver {
			SchedulerDriver::ChanceScheduler => Ok(self.chance(ctx, spec).await.map(|pod| {
				let name = pod.pod_name.clone();
				(pod, name)
			})),
			SchedulerDriver::FilterScheduler => self.filter_and_weigh(ctx, spec).await,
		}
	}

	/// Excludes top pods, maintenance pods, and the ignore list, then
	/// applies the affinity-tag predicate; samples uniformly from the
	/// survivors (§4.3).
	async fn chance(&self, ctx: &RequestContext, spec: &RequestSpec) -> Option<Pod> {
		let views = self.build_views(ctx, spec).await;
		let bottom = BottomPodFilter;
		let all_pod = AllPodFilter;
		let ignore = IgnorePodFilter;
		let affinity = PodAffinityTagFilter;

		let eligible: Vec<PodView> = views
			.into_iter()
			.filter(|view| {
				bottom.passes(ctx, view, spec)
					&& all_pod.passes(ctx, view, spec)
					&& ignore.passes(ctx, view, spec)
					&& affinity.passes(ctx, view, spec)
			})
			.collect();

		if eligible.is_empty() {
			return None;
		}
		let idx = self.rng.pick_index(eligible.len());
		Some(eligible[idx].pod.clone())
	}

	/// Bound phase (Tenant filter enabled) then, only if empty, unbound
	/// phase (Tenant filter disabled, already-bound pods ignored, and a
	/// new binding established on success) (§4.3).
	async fn filter_and_weigh(&self, ctx: &RequestContext, spec: &RequestSpec) -> GatewayResult<Option<(Pod, String)>> {
		let bound_pipeline = self.filter_pipeline.with(Arc::new(TenantFilter));
		if let Some(pod) = self.run_phase(ctx, spec, &bound_pipeline).await {
			let name = pod.pod_name.clone();
			return Ok(Some((pod, name)));
		}

		let already_bound = self.bound_pod_names(ctx, &spec.project_id).await;
		let unbound_spec = spec.ignoring(already_bound);
		let unbound_pipeline = self.filter_pipeline.without("Tenant");

		match self.run_phase(ctx, &unbound_spec, &unbound_pipeline).await {
			Some(pod) => {
				self.catalog.change_binding(ctx, &spec.project_id, &pod.pod_id, &pod.az_name).await;
				let name = pod.pod_name.clone();
				Ok(Some((pod, name)))
			}
			None => Ok(None),
		}
	}

	/// Filters, weighs, takes the top `subset_size` candidates (optionally
	/// shuffling the prefix tied for the best weight), and picks uniformly
	/// from that subset.
	async fn run_phase(&self, ctx: &RequestContext, spec: &RequestSpec, pipeline: &FilterPipeline) -> Option<Pod> {
		let views = self.build_views(ctx, spec).await;
		let filtered = pipeline.filter(ctx, views, spec);
		let weighed = self.weigher_pipeline.weigh(&filtered);
		if weighed.is_empty() {
			return None;
		}

		let take = self.subset_size.min(weighed.len());
		let mut subset = weighed[..take].to_vec();

		if self.shuffle_best {
			let best_weight = subset[0].1;
			let tie_len = subset
				.iter()
				.take_while(|(_, weight)| (*weight - best_weight).abs() < f64::EPSILON)
				.count();
			let permutation = self.rng.shuffle_indices(tie_len);
			let reordered: Vec<_> = permutation.iter().map(|&i| subset[i].clone()).collect();
			subset.splice(0..tie_len, reordered);
		}

		let idx = self.rng.pick_index(subset.len());
		Some(subset[idx].0.pod.clone())
	}

	async fn build_views(&self, ctx: &RequestContext, spec: &RequestSpec) -> Vec<PodView> {
		let mut views = Vec::new();
		for pod in self.catalog.list_pods(ctx).await {
			let state = self.catalog.pod_state(&pod.pod_id).await;
			let affinity_tags = self.catalog.affinity_tag_map(&pod.pod_id).await;
			let tenant_bound = self.catalog.is_tenant_bound_to_pod(&spec.project_id, &pod.pod_id).await;
			views.push(PodView {
				pod,
				state,
				affinity_tags,
				tenant_bound,
			});
		}
		views
	}

	async fn bound_pod_names(&self, ctx: &RequestContext, tenant_id: &str) -> Vec<String> {
		let mut names = Vec::new();
		for binding in self.catalog.active_bindings_for_tenant(tenant_id).await {
			if let Ok(pod) = self.catalog.get_by_id(ctx, &binding.pod_id).await {
				names.push(pod.pod_name);
			}
		}
		names
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration as ChronoDuration, Utc};
	use models::PodState;

	/// Always picks the first index and never reorders — makes subset and
	/// tie-break selection deterministic in tests.
	struct FixedRandom;
	impl RandomSource for FixedRandom {
		fn pick_index(&self, _len: usize) -> usize {
			0
		}
		fn shuffle_indices(&self, len: usize) -> Vec<usize> {
			(0..len).collect()
		}
	}

	fn pod(id: &str, az: &str, maint: bool) -> Pod {
		Pod {
			pod_id: id.to_string(),
			pod_name: id.to_string(),
			az_name: az.to_string(),
			dc_name: "dc".to_string(),
			pod_az_name: az.to_string(),
			is_under_maintenance: maint,
			create_time: Utc::now() - ChronoDuration::hours(1),
		}
	}

	fn state(pod_id: &str, free_disk_gb: u64, free_ram_mb: u64) -> PodState {
		PodState {
			pod_id: pod_id.to_string(),
			count: 1,
			vcpus: 8.0,
			vcpus_used: 1.0,
			memory_mb: free_ram_mb + 1024,
			memory_mb_used: 1024,
			local_gb: 200,
			local_gb_used: 10,
			free_ram_mb,
			free_disk_gb,
			current_workload: 0,
			running_vms: 0,
			disk_available_least: free_disk_gb,
			updated_at: Utc::now(),
		}
	}

	async fn fresh_catalog() -> PodCatalog {
		PodCatalog::new()
	}

	#[tokio::test]
	async fn s1_chance_picks_eligible_pod() {
		let catalog = fresh_catalog().await;
		let ctx = RequestContext::new("tenant-x");
		catalog.create_pod(&ctx, pod("p1", "A", true)).await.unwrap();
		catalog.create_pod(&ctx, pod("pTop", "", false)).await.unwrap();
		catalog.create_pod(&ctx, pod("p2", "B", false)).await.unwrap();
		catalog.update_pod_state(&ctx, state("p2", 20, 4096)).await;

		let mut config = GatewayConfig::default();
		config.scheduler.driver = SchedulerDriver::ChanceScheduler;
		let scheduler = Scheduler::from_config(catalog, &config).unwrap().with_random_source(Arc::new(FixedRandom));

		let spec = RequestSpec::new("tenant-x").with_resources(1.0, 1024, 8);
		let (chosen, name) = scheduler.select_destination(&ctx, &spec).await.unwrap().unwrap();
		assert_eq!(chosen.pod_id, "p2");
		assert_eq!(name, "p2");
	}

	#[tokio::test]
	async fn s2_filter_weigh_prefers_highest_free_disk() {
		let catalog = fresh_catalog().await;
		let ctx = RequestContext::new("tenant-x");
		for (id, disk, ram) in [("low", 4u64, 1024u64), ("mid", 8, 2048), ("high", 12, 3072)] {
			catalog.create_pod(&ctx, pod(id, "A", false)).await.unwrap();
			catalog.update_pod_state(&ctx, state(id, disk, ram)).await;
		}

		let config = GatewayConfig::default();
		let scheduler = Scheduler::from_config(catalog, &config).unwrap().with_random_source(Arc::new(FixedRandom));

		let spec = RequestSpec::new("tenant-x").with_resources(1.0, 1024, 4);
		let (chosen, _) = scheduler.select_destination(&ctx, &spec).await.unwrap().unwrap();
		assert_eq!(chosen.pod_id, "high");
	}

	#[tokio::test]
	async fn s3_affinity_tag_overrides_weight() {
		let catalog = fresh_catalog().await;
		let ctx = RequestContext::new("tenant-x");
		for (id, disk, ram) in [("low", 4u64, 1024u64), ("mid", 8, 2048), ("high", 12, 3072)] {
			catalog.create_pod(&ctx, pod(id, "A", false)).await.unwrap();
			catalog.update_pod_state(&ctx, state(id, disk, ram)).await;
		}
		catalog
			.create_affinity_tag(&ctx, "mid".to_string(), "volume".to_string(), "SSD".to_string())
			.await
			.unwrap();

		let config = GatewayConfig::default();
		let scheduler = Scheduler::from_config(catalog, &config).unwrap().with_random_source(Arc::new(FixedRandom));

		let spec = RequestSpec::new("tenant-x")
			.with_resources(1.0, 1024, 4)
			.with_affinity_tag("volume", "SSD");
		let (chosen, _) = scheduler.select_destination(&ctx, &spec).await.unwrap().unwrap();
		assert_eq!(chosen.pod_id, "mid");
	}

	#[tokio::test]
	async fn s4_binding_switches_within_az() {
		let catalog = fresh_catalog().await;
		let ctx = RequestContext::new("tenant-x");
		catalog.create_pod(&ctx, pod("a1", "A", false)).await.unwrap();
		catalog.create_pod(&ctx, pod("a2", "A", false)).await.unwrap();
		catalog.update_pod_state(&ctx, state("a1", 4, 1024)).await;
		catalog.update_pod_state(&ctx, state("a2", 40, 8192)).await;
		catalog.create_binding(&ctx, "tenant-x".to_string(), "a1".to_string(), "A".to_string()).await;

		let config = GatewayConfig::default();
		let scheduler = Scheduler::from_config(catalog.clone(), &config)
			.unwrap()
			.with_random_source(Arc::new(FixedRandom));

		// a1 is the only bound pod and does not satisfy the requested resources,
		// so the bound phase returns nothing and the unbound phase must switch.
		let spec = RequestSpec::new("tenant-x").with_resources(1.0, 8192, 40);
		let (chosen, _) = scheduler.select_destination(&ctx, &spec).await.unwrap().unwrap();
		assert_eq!(chosen.pod_id, "a2");

		assert!(!catalog.is_tenant_bound_to_pod("tenant-x", "a1").await);
		assert!(catalog.is_tenant_bound_to_pod("tenant-x", "a2").await);
	}

	#[tokio::test]
	async fn subset_selection_stays_within_top_n() {
		let catalog = fresh_catalog().await;
		let ctx = RequestContext::new("tenant-x");
		for (id, disk) in [("a", 30u64), ("b", 20), ("c", 10)] {
			catalog.create_pod(&ctx, pod(id, "A", false)).await.unwrap();
			catalog.update_pod_state(&ctx, state(id, disk, 4096)).await;
		}

		let mut config = GatewayConfig::default();
		config.filter_scheduler.pod_subset_size = 2;
		let scheduler = Scheduler::from_config(catalog, &config).unwrap().with_random_source(Arc::new(FixedRandom));

		let spec = RequestSpec::new("tenant-x");
		let (chosen, _) = scheduler.select_destination(&ctx, &spec).await.unwrap().unwrap();
		assert!(chosen.pod_id == "a" || chosen.pod_id == "b");
	}
}

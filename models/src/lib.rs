pub mod models;

pub use models::affinity_tag::PodAffinityTag;
pub use models::binding::PodBinding;
pub use models::job::{Job, JobStatus};
pub use models::pod::Pod;
pub use models::pod_state::PodState;
pub use models::request_spec::RequestSpec;
pub use models::routing::{ReserveStatus, ResourceRouting};

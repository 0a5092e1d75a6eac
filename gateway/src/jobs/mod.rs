pub mod coordinator;
pub mod handlers;

pub use coordinator::{JobCoordinator, JobHandler};
pub use handlers::{pod_state_statistics_handler, POD_STATE_STATISTICS};

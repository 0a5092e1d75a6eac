pub mod filters;
pub mod scheduler;
pub mod weighers;

pub use filters::{FilterPipeline, PodFilter, PodView};
pub use scheduler::{RandomSource, Scheduler, ThreadRandom};
pub use weighers::{PodWeigher, WeigherPipeline};

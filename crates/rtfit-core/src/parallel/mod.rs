//! Parallelization planning and runtime estimation.

pub mod memory;
pub mod planner;
pub mod runtime;
pub mod scheme;

pub use memory::MemoryEstimate;
pub use planner::{HostResources, Planner, SceneResources};
pub use runtime::{RuntimeEstimator, TimingRecord};
pub use scheme::Parallelization;

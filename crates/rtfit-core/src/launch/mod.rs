//! Turning populations into queued, submitted simulations.

pub mod input;
pub mod jobscript;
pub mod launcher;
pub mod options;
pub mod record;

pub use input::SimulationInput;
pub use launcher::{BatchLauncher, LaunchSummary};
pub use options::SchedulingOptions;
pub use record::{SimulationRecord, SimulationStatus};

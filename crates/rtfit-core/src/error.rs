//! Error taxonomy for the fitting engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::units::Quantity;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core components.
///
/// Per-simulation failures are not errors: they are recorded as terminal
/// simulation states and never abort a generation. Everything here either
/// aborts the current run before submission (configuration, planner) or is
/// converted into a terminal state by the caller (remote transients).
#[derive(Debug, Error)]
pub enum Error {
    /// Missing free-parameter labels, inconsistent units, unknown host.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The parallelization planner cannot satisfy the per-node memory
    /// constraint.
    #[error("insufficient memory: {required} required per process, {available} available per node")]
    InsufficientMemory {
        required: Quantity,
        available: Quantity,
    },

    /// Every preferred host failed its liveness probe.
    #[error("no available host among: {}", .0.join(", "))]
    NoAvailableHost(Vec<String>),

    /// Network/SSH failure; retried with backoff by the synchronizer, then
    /// converted to `aborted` for the affected simulations.
    #[error("transient remote failure on '{host}': {message}")]
    RemoteTransient { host: String, message: String },

    /// The remote reported a non-zero exit or the artifact manifest is
    /// missing.
    #[error("simulation '{0}' crashed")]
    SimulationCrashed(String),

    /// `restart_from` was invoked without a satisfied confirmation predicate.
    #[error("restarting from generation '{0}' requires explicit confirmation")]
    RestartConfirmationRequired(String),

    /// Schema drift or an unreadable table; fatal.
    #[error("store corruption in '{}': {message}", path.display())]
    StoreCorruption { path: PathBuf, message: String },

    /// Malformed scene description or a label the scene does not carry.
    #[error("scene error: {0}")]
    Scene(String),

    /// Malformed quantity or an operation across incompatible dimensions.
    #[error("unit error: {0}")]
    Unit(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the synchronizer may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteTransient { .. })
    }
}

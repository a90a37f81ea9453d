//! Error types shared across the lifering workspace.

use thiserror::Error;

/// Result type alias using [`LifeRingError`].
pub type Result<T> = std::result::Result<T, LifeRingError>;

/// Errors surfaced by the simulation core.
///
/// Configuration problems that can be recovered by defaulting never reach
/// this type; they are repaired (and logged) at the configuration layer.
#[derive(Debug, Error)]
pub enum LifeRingError {
    /// A launch parameter that cannot be repaired by defaulting
    /// (e.g. a zero-sized worker group).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Buffer or channel allocation failed. Fatal to the owning process
    /// and, transitively, to the worker group.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A lost, malformed, or partially delivered group message. Fatal to
    /// the whole run: ghost-state correctness cannot be verified locally,
    /// so there is no step-level retry.
    #[error("communication failure: {0}")]
    Communication(String),

    /// A setup-time invariant did not hold, e.g. planned tiles fail to
    /// cover the interior exactly. Never silently clamped.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

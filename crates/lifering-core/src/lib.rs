//! # lifering-core
//!
//! Foundation types for the lifering cellular-automaton testbed: error
//! handling, launch configuration, and the rank-addressed process-group
//! messaging capability the distributed executor runs on.
//!
//! ## Core abstractions
//!
//! - [`error::LifeRingError`] - error kinds with the failure semantics of
//!   each simulation layer
//! - [`config::LaunchConfig`] - validated launch parameters
//! - [`group::GroupBroker`] / [`group::GroupEndpoint`] - point-to-point
//!   send/receive plus the gather/broadcast collectives

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod group;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::LaunchConfig;
    pub use crate::error::{LifeRingError, Result};
    pub use crate::group::{GroupBroker, GroupConfig, GroupEndpoint, Packet, Tag};
}

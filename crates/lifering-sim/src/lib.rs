// Enable portable_simd for the lane-batched kernel.
#![cfg_attr(feature = "simd", feature(portable_simd))]

//! # lifering-sim
//!
//! Toroidal cellular-automaton testbed (Conway's Game of Life) for four
//! execution strategies: scalar, vectorized, shared-memory tiled, and
//! distributed with per-step halo exchange and coordinated termination.
//!
//! The grid is a torus stored with a one-cell ghost border, so the update
//! kernels read plain offsets with no modulo arithmetic; wraparound is
//! resolved before each step by mirroring the border (single process) or
//! exchanging ghost columns between ring neighbors (distributed).
//!
//! ## Picking an executor
//!
//! All single-process variants implement [`StepExecutor`] and are driven by
//! [`simulate_steps`]; they produce byte-identical results and differ only
//! in how a step's work is covered. The distributed variant lives in
//! [`simulation::distributed`] and is driven per worker because its step
//! can end the run early when the whole group stabilizes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod simulation;

pub use simulation::{simulate_steps, StepExecutor};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::simulation::field::{initialize_fields, Field};
    pub use crate::simulation::parallel::TiledExecutor;
    pub use crate::simulation::plan::{plan_segments, Tile, TilePlan};
    pub use crate::simulation::serial::{ScalarExecutor, VectorExecutor};
    pub use crate::simulation::{simulate_steps, StepExecutor};
}

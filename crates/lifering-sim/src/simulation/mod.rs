//! Simulation core: toroidal Game of Life over four execution strategies.
//!
//! - [`serial::ScalarExecutor`] - one tile, scalar kernel (the reference)
//! - [`serial::VectorExecutor`] - one tile, lane-batched kernel
//! - [`parallel::TiledExecutor`] - shared-memory fork-join over planned tiles
//! - [`distributed`] - ring of workers with per-step halo exchange and
//!   coordinated termination

pub mod distributed;
pub mod field;
pub mod kernel;
pub mod parallel;
pub mod plan;
pub mod serial;
pub mod stop;

pub use field::{initialize_fields, Field};
pub use parallel::TiledExecutor;
pub use plan::{plan_segments, Tile, TilePlan};
pub use serial::{ScalarExecutor, VectorExecutor};

use lifering_core::error::Result;

/// One-step contract shared by the single-process executors.
///
/// The core is deterministic: identical `current` contents and timestep
/// always produce identical `next` contents.
pub trait StepExecutor {
    /// Compute the next state of every interior cell of `current` into
    /// `next`. `current` is mutable only so the executor can refresh its
    /// ghost border; interior cells of `current` are never written.
    fn step(&mut self, current: &mut Field, next: &mut Field, timestep: usize) -> Result<()>;
}

/// Drive an executor for `timesteps` steps.
///
/// Ownership of the buffer pair alternates by swap after each completed
/// step, never by copying; on return `current` holds the final state.
pub fn simulate_steps(
    executor: &mut impl StepExecutor,
    current: &mut Field,
    next: &mut Field,
    timesteps: usize,
) -> Result<()> {
    for timestep in 0..timesteps {
        executor.step(current, next, timestep)?;
        std::mem::swap(current, next);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An executor that records which timesteps it was handed.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<usize>,
    }

    impl StepExecutor for Recorder {
        fn step(&mut self, current: &mut Field, next: &mut Field, timestep: usize) -> Result<()> {
            self.seen.push(timestep);
            // Tag the next buffer so the swap is observable.
            next.set(1, 1, (timestep % 2) as u8);
            let _ = current;
            Ok(())
        }
    }

    #[test]
    fn driver_passes_consecutive_timesteps() {
        let mut current = Field::new(4, 4, 1, 1).unwrap();
        let mut next = Field::like(&current).unwrap();
        let mut recorder = Recorder::default();
        simulate_steps(&mut recorder, &mut current, &mut next, 5).unwrap();
        assert_eq!(recorder.seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn driver_swaps_buffers_after_each_step() {
        let mut current = Field::new(4, 4, 1, 1).unwrap();
        let mut next = Field::like(&current).unwrap();
        simulate_steps(&mut Recorder::default(), &mut current, &mut next, 3).unwrap();
        // Step 2 wrote `2 % 2 == 0` into its next buffer, which the final
        // swap moved into `current`.
        assert_eq!(current.get(1, 1), 0);
        // Step 1 wrote into the buffer that ended up as `next`.
        assert_eq!(next.get(1, 1), 1);
    }
}

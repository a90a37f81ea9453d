//! Shared-memory tiled executor.
//!
//! Runs the kernel over every planned tile in parallel within one process.
//! Tiles share read-only access to the current buffer and write disjoint
//! regions of the next buffer, so no locking is needed inside a step; the
//! only synchronization point is the fork-join barrier at the end of the
//! parallel iterator - every tile of step t finishes before the caller
//! swaps buffers for step t+1.

use std::marker::PhantomData;

use lifering_core::error::Result;
use rayon::prelude::*;
use tracing::debug;

use super::field::Field;
use super::kernel;
use super::plan::TilePlan;
use super::StepExecutor;

/// Shared-memory executor over a verified tile plan.
#[derive(Debug, Clone)]
pub struct TiledExecutor {
    plan: TilePlan,
}

impl TiledExecutor {
    /// Build an executor for a field's stored tiling.
    pub fn new(field: &Field) -> Result<Self> {
        Ok(Self::with_plan(TilePlan::for_field(field)?))
    }

    /// Build an executor from an explicit plan.
    pub fn with_plan(plan: TilePlan) -> Self {
        debug!(
            segments_x = plan.segments_x,
            segments_y = plan.segments_y,
            "created tiled executor"
        );
        Self { plan }
    }

    /// The tile plan driving this executor.
    pub fn plan(&self) -> &TilePlan {
        &self.plan
    }
}

impl StepExecutor for TiledExecutor {
    fn step(&mut self, current: &mut Field, next: &mut Field, _timestep: usize) -> Result<()> {
        current.wrap_borders();

        let width = current.width;
        let cells = current.cells();
        let out = DisjointWriter::new(next.cells_mut());

        self.plan.tiles().par_iter().for_each(|tile| {
            for y in tile.start_y..tile.end_y {
                // Interior coordinates are offset by the ghost border.
                let idx0 = (y + 1) * width + tile.start_x + 1;
                let len = tile.end_x - tile.start_x;
                // Safety: the plan is a verified exact partition, so the
                // row spans of distinct tiles never overlap.
                let row = unsafe { out.slice_mut(idx0, len) };
                kernel::step_row(cells, row, width, idx0);
            }
        });

        Ok(())
    }
}

/// Shared handle over the next buffer for tile tasks with disjoint write
/// regions.
struct DisjointWriter<'a> {
    ptr: *mut u8,
    len: usize,
    _lifetime: PhantomData<&'a mut [u8]>,
}

// Tasks only touch non-overlapping subslices (see `slice_mut`).
unsafe impl Send for DisjointWriter<'_> {}
unsafe impl Sync for DisjointWriter<'_> {}

impl<'a> DisjointWriter<'a> {
    fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            ptr: buffer.as_mut_ptr(),
            len: buffer.len(),
            _lifetime: PhantomData,
        }
    }

    /// Mutable view of `start..start + len`.
    ///
    /// # Safety
    /// No two live views may overlap, and the range must be in bounds.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slice_mut(&self, start: usize, len: usize) -> &mut [u8] {
        debug_assert!(start + len <= self.len);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::serial::ScalarExecutor;
    use crate::simulation::simulate_steps;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_field(width: usize, height: usize, sx: usize, sy: usize, seed: u64) -> Field {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut field = Field::new(width, height, sx, sy).unwrap();
        field.fill_random(&mut rng);
        field
    }

    #[test]
    fn tiled_matches_scalar_for_fifty_steps() {
        for &(sx, sy) in &[(1usize, 1usize), (2, 2), (4, 1), (3, 2)] {
            let mut tiled_cur = random_field(33, 17, sx, sy, 1234);
            let mut scalar_cur = tiled_cur.clone();
            let mut tiled_next = Field::like(&tiled_cur).unwrap();
            let mut scalar_next = Field::like(&scalar_cur).unwrap();

            let mut tiled = TiledExecutor::new(&tiled_cur).unwrap();
            simulate_steps(&mut tiled, &mut tiled_cur, &mut tiled_next, 50).unwrap();
            simulate_steps(&mut ScalarExecutor, &mut scalar_cur, &mut scalar_next, 50).unwrap();

            assert_eq!(
                tiled_cur.interior_cells(),
                scalar_cur.interior_cells(),
                "{sx}x{sy} tiling diverged from the scalar reference"
            );
        }
    }

    #[test]
    fn tile_seams_do_not_leak() {
        // A glider crossing tile boundaries is the sharpest seam test.
        let mut tiled_cur = Field::new(16, 16, 4, 4).unwrap();
        // .O.
        // ..O
        // OOO
        for (x, y) in [(6, 5), (7, 6), (5, 7), (6, 7), (7, 7)] {
            tiled_cur.set(x, y, 1);
        }
        let mut scalar_cur = tiled_cur.clone();
        let mut tiled_next = Field::like(&tiled_cur).unwrap();
        let mut scalar_next = Field::like(&scalar_cur).unwrap();

        let mut tiled = TiledExecutor::new(&tiled_cur).unwrap();
        for step in 0..64 {
            tiled.step(&mut tiled_cur, &mut tiled_next, step).unwrap();
            ScalarExecutor.step(&mut scalar_cur, &mut scalar_next, step).unwrap();
            assert_eq!(
                tiled_next.interior_cells(),
                scalar_next.interior_cells(),
                "diverged at step {step}"
            );
            std::mem::swap(&mut tiled_cur, &mut tiled_next);
            std::mem::swap(&mut scalar_cur, &mut scalar_next);
        }
    }
}

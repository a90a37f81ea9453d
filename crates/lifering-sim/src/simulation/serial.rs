//! Single-process executors: scalar and vectorized.
//!
//! Both refresh the current field's ghost border from toroidal wraparound
//! and sweep the interior row by row into the next field. They differ only
//! in which kernel path covers a row: the scalar executor is the reference
//! implementation, the vector executor runs the lane-batched kernel with
//! the scalar remainder split.

use lifering_core::error::Result;

use super::field::Field;
use super::kernel;
use super::StepExecutor;

/// Reference executor: one tile, scalar kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarExecutor;

impl StepExecutor for ScalarExecutor {
    fn step(&mut self, current: &mut Field, next: &mut Field, _timestep: usize) -> Result<()> {
        current.wrap_borders();
        let width = current.width;
        for y in 1..current.height - 1 {
            let idx0 = y * width + 1;
            let row = &mut next.cells_mut()[idx0..idx0 + width - 2];
            kernel::step_span_scalar(current.cells(), row, width, idx0);
        }
        Ok(())
    }
}

/// Vectorized executor: one tile, batch kernel over the lane-aligned
/// column span, scalar kernel for the `interior_width % LANES` remainder.
#[derive(Debug, Default, Clone, Copy)]
pub struct VectorExecutor;

impl StepExecutor for VectorExecutor {
    fn step(&mut self, current: &mut Field, next: &mut Field, _timestep: usize) -> Result<()> {
        current.wrap_borders();
        let width = current.width;
        for y in 1..current.height - 1 {
            let idx0 = y * width + 1;
            let row = &mut next.cells_mut()[idx0..idx0 + width - 2];
            kernel::step_row(current.cells(), row, width, idx0);
        }
        Ok(())
    }
}

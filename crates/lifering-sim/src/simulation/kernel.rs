//! Scalar and lane-batched update kernels.
//!
//! Both kernels assume the ghost border has already been populated (by
//! toroidal wrap or halo exchange), so neighbor reads are plain offsets
//! with no modulo arithmetic.
//!
//! The batch kernel processes [`LANES`] cells per operation: the three
//! cells above, two beside, and three below are loaded as shifted slices,
//! summed with eight lane-wise additions, the sum compared to 2 and 3, the
//! "==2" lanes ANDed with "currently alive", ORed with the "==3" lanes,
//! and stored as 0/1 per lane. With the `simd` feature this maps onto
//! `std::simd::u8x16`; without it a fixed-size-array path computes the
//! same lanes on stable. Columns left over when a span's width is not a
//! multiple of [`LANES`] are handled by the scalar kernel at an explicit
//! split point - see [`step_row`].

/// Lane width of the batch kernel: cells processed per vector operation.
pub const LANES: usize = 16;

/// The rule: a cell is alive next step iff exactly 3 of its 8 neighbors
/// are alive, or exactly 2 are alive and the cell is currently alive.
#[inline(always)]
pub fn next_state(alive: u8, neighbors: u8) -> u8 {
    (neighbors == 3 || (neighbors == 2 && alive == 1)) as u8
}

/// Scalar kernel for the cell at linear index `idx` of a buffer with row
/// stride `width`. Reads the 8 explicit offset neighbors.
#[inline(always)]
pub fn step_cell(current: &[u8], width: usize, idx: usize) -> u8 {
    let above = idx - width;
    let below = idx + width;
    let neighbors = current[above - 1]
        + current[above]
        + current[above + 1]
        + current[idx - 1]
        + current[idx + 1]
        + current[below - 1]
        + current[below]
        + current[below + 1];
    next_state(current[idx], neighbors)
}

/// Scalar path over a contiguous span of one row.
///
/// `out` receives the next states of the cells at `idx0..idx0 + out.len()`
/// in `current`. Returns true if any cell changed.
pub fn step_span_scalar(current: &[u8], out: &mut [u8], width: usize, idx0: usize) -> bool {
    let mut delta = false;
    for (k, cell) in out.iter_mut().enumerate() {
        let idx = idx0 + k;
        let next = step_cell(current, width, idx);
        delta |= next != current[idx];
        *cell = next;
    }
    delta
}

/// Batch path over a lane-aligned span of one row.
///
/// `out.len()` must be a multiple of [`LANES`]. Returns true if any cell
/// changed.
pub fn step_span_batch(current: &[u8], out: &mut [u8], width: usize, idx0: usize) -> bool {
    debug_assert_eq!(out.len() % LANES, 0, "batch span must be lane-aligned");

    let mut delta = false;
    for (chunk_index, chunk) in out.chunks_exact_mut(LANES).enumerate() {
        let idx = idx0 + chunk_index * LANES;
        delta |= step_lanes(current, chunk, width, idx);
    }
    delta
}

#[cfg(feature = "simd")]
#[inline]
fn step_lanes(current: &[u8], out: &mut [u8], width: usize, idx: usize) -> bool {
    use std::simd::prelude::*;

    let above = idx - width;
    let below = idx + width;

    // Shifted register loads: 3 above, 2 beside, 3 below.
    let sum = u8x16::from_slice(&current[above - 1..])
        + u8x16::from_slice(&current[above..])
        + u8x16::from_slice(&current[above + 1..])
        + u8x16::from_slice(&current[idx - 1..])
        + u8x16::from_slice(&current[idx + 1..])
        + u8x16::from_slice(&current[below - 1..])
        + u8x16::from_slice(&current[below..])
        + u8x16::from_slice(&current[below + 1..]);

    let alive = u8x16::from_slice(&current[idx..]);
    let survives = sum.simd_eq(u8x16::splat(2)) & alive.simd_eq(u8x16::splat(1));
    let born = sum.simd_eq(u8x16::splat(3));
    let next = (born | survives).select(u8x16::splat(1), u8x16::splat(0));

    out.copy_from_slice(&next.to_array());
    next.simd_ne(alive).any()
}

#[cfg(not(feature = "simd"))]
#[inline]
fn step_lanes(current: &[u8], out: &mut [u8], width: usize, idx: usize) -> bool {
    let above = idx - width;
    let below = idx + width;

    // Same shifted-load shape as the vector registers; the fixed-size
    // lanes keep the loop trivially unrollable on stable.
    let mut sum = [0u8; LANES];
    for offset in [
        above - 1,
        above,
        above + 1,
        idx - 1,
        idx + 1,
        below - 1,
        below,
        below + 1,
    ] {
        for (lane, cell) in sum.iter_mut().enumerate() {
            *cell += current[offset + lane];
        }
    }

    let mut delta = false;
    for (lane, cell) in out.iter_mut().enumerate() {
        let alive = current[idx + lane];
        let next = next_state(alive, sum[lane]);
        delta |= next != alive;
        *cell = next;
    }
    delta
}

/// One row span with the vector/scalar split: the batch kernel covers the
/// lane-aligned prefix, the scalar kernel the remaining
/// `out.len() % LANES` columns. Returns true if any cell changed.
pub fn step_row(current: &[u8], out: &mut [u8], width: usize, idx0: usize) -> bool {
    let split = (out.len() / LANES) * LANES;
    let (batch, remainder) = out.split_at_mut(split);
    let batch_delta = step_span_batch(current, batch, width, idx0);
    let scalar_delta = step_span_scalar(current, remainder, width, idx0 + split);
    batch_delta || scalar_delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn rule_truth_table() {
        for neighbors in 0..=8u8 {
            assert_eq!(next_state(0, neighbors), (neighbors == 3) as u8);
            assert_eq!(
                next_state(1, neighbors),
                (neighbors == 2 || neighbors == 3) as u8
            );
        }
    }

    /// Random buffer of `width * height` 0/1 cells with a dead border, so
    /// kernels can read offsets without wraparound concerns.
    fn random_buffer(width: usize, height: usize, rng: &mut StdRng) -> Vec<u8> {
        let mut cells = vec![0u8; width * height];
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                cells[y * width + x] = rng.gen_bool(0.4) as u8;
            }
        }
        cells
    }

    #[test]
    fn scalar_and_batch_agree_on_every_cell() {
        let mut rng = StdRng::seed_from_u64(42);
        // Lane-aligned and misaligned interior widths, including spans
        // narrower than one lane.
        for interior_width in [1usize, 3, 15, 16, 17, 31, 32, 33, 40] {
            let width = interior_width + 2;
            let height = 18;
            let current = random_buffer(width, height, &mut rng);

            for y in 1..height - 1 {
                let idx0 = y * width + 1;
                let mut scalar_row = vec![0u8; interior_width];
                let mut split_row = vec![0u8; interior_width];

                let scalar_delta = step_span_scalar(&current, &mut scalar_row, width, idx0);
                let split_delta = step_row(&current, &mut split_row, width, idx0);

                assert_eq!(scalar_row, split_row, "row {y}, width {interior_width}");
                assert_eq!(scalar_delta, split_delta);
            }
        }
    }

    #[test]
    fn batch_split_point_is_exact() {
        // 35 columns = 2 full lanes + 3 scalar remainder columns.
        let interior_width = 2 * LANES + 3;
        let width = interior_width + 2;
        let mut rng = StdRng::seed_from_u64(7);
        let current = random_buffer(width, 5, &mut rng);

        let idx0 = 2 * width + 1;
        let mut out = vec![0u8; interior_width];
        step_row(&current, &mut out, width, idx0);

        let mut expected = vec![0u8; interior_width];
        step_span_scalar(&current, &mut expected, width, idx0);
        assert_eq!(out, expected);
    }

    #[test]
    fn delta_reports_change() {
        // A lone live cell dies; an empty row stays empty.
        let width = LANES + 2;
        let mut current = vec![0u8; width * 3];
        let idx0 = width + 1;
        let mut out = vec![0u8; LANES];
        assert!(!step_span_batch(&current, &mut out, width, idx0));

        current[idx0 + 4] = 1;
        assert!(step_span_batch(&current, &mut out, width, idx0));
        assert_eq!(out[4], 0);
    }
}

//! Toroidal cell lattice with a one-cell ghost border.
//!
//! Cells are stored row-major as 0/1 bytes. The ghost border (row 0, the
//! last row, column 0, the last column) always mirrors either toroidal
//! wraparound or a neighbor worker's boundary; it never carries independent
//! live content. Update kernels therefore read plain offsets with no modulo
//! arithmetic in the interior.

use lifering_core::config::LaunchConfig;
use lifering_core::error::{LifeRingError, Result};
use rand::Rng;

use super::plan;

/// Probability that an interior cell starts alive.
pub const FILL_DENSITY: f64 = 0.1;

/// A simulation grid: interior cells plus the ghost border.
///
/// Two fields exist per executor (current, next); ownership alternates by
/// `std::mem::swap` after each completed step, never by copying.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Total width, interior plus 2 ghost columns.
    pub width: usize,
    /// Total height, interior plus 2 ghost rows.
    pub height: usize,
    /// Tile count along the x axis.
    pub segments_x: usize,
    /// Tile count along the y axis.
    pub segments_y: usize,
    /// Tile-size factor `interior_width / segments_x`.
    pub factor_x: f64,
    /// Tile-size factor `interior_height / segments_y`.
    pub factor_y: f64,

    /// Cell states (0 dead, 1 alive), row-major.
    cells: Vec<u8>,
}

impl Field {
    /// Create a zeroed field for an `interior_width x interior_height`
    /// torus. Zero segment counts are auto-planned from the available
    /// parallel workers.
    pub fn new(
        interior_width: usize,
        interior_height: usize,
        segments_x: usize,
        segments_y: usize,
    ) -> Result<Self> {
        if interior_width == 0 || interior_height == 0 {
            return Err(LifeRingError::InvalidConfig(format!(
                "interior dimensions must be positive, got {interior_width}x{interior_height}"
            )));
        }

        let (segments_x, segments_y) = if segments_x == 0 || segments_y == 0 {
            plan::plan_segments(interior_width, interior_height, rayon::current_num_threads())
        } else {
            (segments_x, segments_y)
        };

        let width = interior_width + 2;
        let height = interior_height + 2;
        let cells = allocate_cells(width * height)?;

        Ok(Self {
            width,
            height,
            segments_x,
            segments_y,
            factor_x: interior_width as f64 / segments_x as f64,
            factor_y: interior_height as f64 / segments_y as f64,
            cells,
        })
    }

    /// Create a zeroed field with the same shape and tiling as `other`.
    pub fn like(other: &Field) -> Result<Self> {
        let cells = allocate_cells(other.width * other.height)?;
        Ok(Self {
            width: other.width,
            height: other.height,
            segments_x: other.segments_x,
            segments_y: other.segments_y,
            factor_x: other.factor_x,
            factor_y: other.factor_y,
            cells,
        })
    }

    /// Interior width (cells excluding the ghost border).
    pub fn interior_width(&self) -> usize {
        self.width - 2
    }

    /// Interior height (cells excluding the ghost border).
    pub fn interior_height(&self) -> usize {
        self.height - 2
    }

    /// Convert (x, y) field coordinates to a linear index.
    #[inline(always)]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Cell state at (x, y) in field coordinates (ghost border included).
    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[self.idx(x, y)]
    }

    /// Set the cell at (x, y) in field coordinates.
    #[inline(always)]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        let idx = self.idx(x, y);
        self.cells[idx] = value;
    }

    /// The flat cell buffer.
    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Mutable access to the flat cell buffer.
    #[inline]
    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    /// Mirror the interior's outer columns into the ghost columns
    /// (horizontal toroidal wraparound). Skips the ghost rows; run
    /// [`Field::wrap_rows`] afterwards to complete the border.
    pub fn wrap_columns(&mut self) {
        for y in 1..self.height - 1 {
            let row = y * self.width;
            self.cells[row] = self.cells[row + self.width - 2];
            self.cells[row + self.width - 1] = self.cells[row + 1];
        }
    }

    /// Mirror the interior's outer rows into the ghost rows (vertical
    /// toroidal wraparound), full width including the ghost columns. Run
    /// after the ghost columns are valid so the four corners mirror them.
    pub fn wrap_rows(&mut self) {
        let width = self.width;
        let last = (self.height - 1) * width;
        self.cells.copy_within(last - width..last, 0);
        self.cells.copy_within(width..2 * width, last);
    }

    /// Refresh the whole ghost border from toroidal wraparound.
    pub fn wrap_borders(&mut self) {
        self.wrap_columns();
        self.wrap_rows();
    }

    /// Seed interior cells independently alive with [`FILL_DENSITY`]
    /// probability; the border stays dead until the first wrap/exchange.
    pub fn fill_random(&mut self, rng: &mut impl Rng) {
        for y in 1..self.height - 1 {
            for x in 1..self.width - 1 {
                let alive = rng.gen_bool(FILL_DENSITY);
                self.set(x, y, alive as u8);
            }
        }
    }

    /// Copy of the interior cells, row-major.
    pub fn interior_cells(&self) -> Vec<u8> {
        let mut interior = Vec::with_capacity(self.interior_width() * self.interior_height());
        for y in 1..self.height - 1 {
            let row = y * self.width;
            interior.extend_from_slice(&self.cells[row + 1..row + self.width - 1]);
        }
        interior
    }

    /// Number of live interior cells.
    pub fn live_cells(&self) -> usize {
        self.interior_cells().iter().map(|&c| c as usize).sum()
    }
}

/// Create the (current, next) field pair for a launch configuration.
pub fn initialize_fields(config: &LaunchConfig) -> Result<(Field, Field)> {
    let current = Field::new(config.width, config.height, config.segments_x, config.segments_y)?;
    let next = Field::like(&current)?;
    Ok((current, next))
}

fn allocate_cells(len: usize) -> Result<Vec<u8>> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(len)
        .map_err(|e| LifeRingError::ResourceExhausted(format!("cell buffer of {len} bytes: {e}")))?;
    cells.resize(len, 0);
    Ok(cells)
}

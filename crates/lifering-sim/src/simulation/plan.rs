//! Domain-decomposition planner.
//!
//! Splits `num_workers` into a divisor pair as close to square as the
//! worker count allows, then derives per-tile rectangles from rounded
//! multiples of the tile-size factor. The resulting tile set partitions
//! the interior exactly; the constructor verifies this instead of
//! tolerating drift from the floating-point rounding.

use lifering_core::error::{LifeRingError, Result};
use tracing::debug;

use super::field::Field;

/// A tile rectangle in interior coordinates: `[start_x, end_x) x [start_y, end_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// First interior column of the tile.
    pub start_x: usize,
    /// One past the last interior column.
    pub end_x: usize,
    /// First interior row of the tile.
    pub start_y: usize,
    /// One past the last interior row.
    pub end_y: usize,
}

impl Tile {
    /// Number of cells covered by the tile.
    pub fn area(&self) -> usize {
        (self.end_x - self.start_x) * (self.end_y - self.start_y)
    }
}

/// Choose `(segments_x, segments_y)` for `num_workers` parallel workers.
///
/// Picks the largest divisor of `num_workers` that is at most
/// `floor(sqrt(num_workers))` and pairs it with its cofactor, so
/// `segments_x * segments_y == num_workers` exactly. The larger factor
/// goes on the longer axis, trending tiles toward square.
pub fn plan_segments(interior_width: usize, interior_height: usize, num_workers: usize) -> (usize, usize) {
    let workers = num_workers.max(1);
    let root = (workers as f64).sqrt().floor() as usize;

    let mut small = 1;
    for candidate in (1..=root).rev() {
        if workers % candidate == 0 {
            small = candidate;
            break;
        }
    }
    let large = workers / small;

    if interior_height > interior_width {
        (small, large)
    } else {
        (large, small)
    }
}

/// Rounded boundary of segment `i` for a tile-size `factor`:
/// `floor(factor * i + 0.5)`.
#[inline]
pub fn segment_start(i: usize, factor: f64) -> usize {
    (factor * i as f64 + 0.5).floor() as usize
}

/// The rectangle of tile `(i, j)` for the given tile-size factors.
pub fn tile_bounds(i: usize, j: usize, factor_x: f64, factor_y: f64) -> Tile {
    Tile {
        start_x: segment_start(i, factor_x),
        end_x: segment_start(i + 1, factor_x),
        start_y: segment_start(j, factor_y),
        end_y: segment_start(j + 1, factor_y),
    }
}

/// A verified exact partition of the interior into tiles.
#[derive(Debug, Clone)]
pub struct TilePlan {
    /// Tile count along the x axis.
    pub segments_x: usize,
    /// Tile count along the y axis.
    pub segments_y: usize,
    tiles: Vec<Tile>,
}

impl TilePlan {
    /// Plan tiles for an interior of the given size.
    ///
    /// Fails fast with an [`LifeRingError::InvariantViolation`] if the
    /// rounded boundaries leave a gap, overlap, or a degenerate
    /// (zero-extent) tile; a silently clamped plan would corrupt the
    /// partition contract the executors rely on.
    pub fn new(
        interior_width: usize,
        interior_height: usize,
        segments_x: usize,
        segments_y: usize,
    ) -> Result<Self> {
        if segments_x == 0 || segments_y == 0 {
            return Err(LifeRingError::InvalidConfig(format!(
                "segment counts must be positive, got {segments_x}x{segments_y}"
            )));
        }

        let factor_x = interior_width as f64 / segments_x as f64;
        let factor_y = interior_height as f64 / segments_y as f64;

        let mut tiles = Vec::with_capacity(segments_x * segments_y);
        for j in 0..segments_y {
            for i in 0..segments_x {
                tiles.push(tile_bounds(i, j, factor_x, factor_y));
            }
        }

        let plan = Self {
            segments_x,
            segments_y,
            tiles,
        };
        plan.verify(interior_width, interior_height)?;

        debug!(
            segments_x,
            segments_y,
            interior_width,
            interior_height,
            "planned {} tiles",
            plan.tiles.len()
        );
        Ok(plan)
    }

    /// Plan tiles from a field's stored segment counts.
    pub fn for_field(field: &Field) -> Result<Self> {
        Self::new(
            field.interior_width(),
            field.interior_height(),
            field.segments_x,
            field.segments_y,
        )
    }

    /// The planned tiles, row-major by (j, i).
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Check the exact-partition contract: the first tile starts at 0 on
    /// each axis, the last ends at the interior extent, each tile's end
    /// matches the next tile's start, and no tile is empty.
    fn verify(&self, interior_width: usize, interior_height: usize) -> Result<()> {
        let violation = |detail: String| Err(LifeRingError::InvariantViolation(detail));

        for j in 0..self.segments_y {
            for i in 0..self.segments_x {
                let tile = self.tiles[j * self.segments_x + i];

                if tile.start_x >= tile.end_x || tile.start_y >= tile.end_y {
                    return violation(format!("tile ({i},{j}) is degenerate: {tile:?}"));
                }
                if (i == 0 && tile.start_x != 0) || (j == 0 && tile.start_y != 0) {
                    return violation(format!("tile ({i},{j}) does not start the axis: {tile:?}"));
                }
                if i + 1 == self.segments_x && tile.end_x != interior_width {
                    return violation(format!(
                        "tile ({i},{j}) ends at {} instead of the interior width {interior_width}",
                        tile.end_x
                    ));
                }
                if j + 1 == self.segments_y && tile.end_y != interior_height {
                    return violation(format!(
                        "tile ({i},{j}) ends at {} instead of the interior height {interior_height}",
                        tile.end_y
                    ));
                }
                if i + 1 < self.segments_x {
                    let right = self.tiles[j * self.segments_x + i + 1];
                    if tile.end_x != right.start_x {
                        return violation(format!(
                            "tiles ({i},{j}) and ({},{j}) leave a seam at x={}..{}",
                            i + 1,
                            tile.end_x,
                            right.start_x
                        ));
                    }
                }
                if j + 1 < self.segments_y {
                    let below = self.tiles[(j + 1) * self.segments_x + i];
                    if tile.end_y != below.start_y {
                        return violation(format!(
                            "tiles ({i},{j}) and ({i},{}) leave a seam at y={}..{}",
                            j + 1,
                            tile.end_y,
                            below.start_y
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

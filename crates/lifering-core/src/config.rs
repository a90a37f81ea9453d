//! Launch configuration.
//!
//! A thin CLI or config-file loader (out of scope here) produces the raw
//! integers; [`LaunchConfig::sanitize`] repairs non-positive values by
//! falling back to defaults, so configuration problems are never fatal.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default number of timesteps when none (or a non-positive count) is given.
pub const DEFAULT_TIMESTEPS: usize = 100;
/// Default interior width in cells.
pub const DEFAULT_WIDTH: usize = 32;
/// Default interior height in cells.
pub const DEFAULT_HEIGHT: usize = 32;

/// Validated launch parameters for a simulation run.
///
/// `width` and `height` are *interior* dimensions; the grid adds a one-cell
/// ghost border on each side. Zero segment counts mean "auto-plan from the
/// available parallel workers".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Number of simulation steps to run.
    pub timesteps: usize,
    /// Interior width in cells.
    pub width: usize,
    /// Interior height in cells.
    pub height: usize,
    /// Tile count along the x axis (0 = auto-plan).
    pub segments_x: usize,
    /// Tile count along the y axis (0 = auto-plan).
    pub segments_y: usize,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            timesteps: DEFAULT_TIMESTEPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            segments_x: 0,
            segments_y: 0,
        }
    }
}

impl LaunchConfig {
    /// Build a configuration from raw (possibly invalid) integers.
    ///
    /// Non-positive timesteps or dimensions fall back to defaults; negative
    /// segment counts fall back to auto-planning. Recovery is logged, never
    /// fatal.
    pub fn sanitize(timesteps: i64, width: i64, height: i64, segments_x: i64, segments_y: i64) -> Self {
        let defaults = Self::default();

        let timesteps = if timesteps > 0 {
            timesteps as usize
        } else {
            warn!(timesteps, default = defaults.timesteps, "non-positive timesteps, using default");
            defaults.timesteps
        };
        let width = if width > 0 {
            width as usize
        } else {
            warn!(width, default = defaults.width, "non-positive width, using default");
            defaults.width
        };
        let height = if height > 0 {
            height as usize
        } else {
            warn!(height, default = defaults.height, "non-positive height, using default");
            defaults.height
        };

        let segments_x = segments_x.max(0) as usize;
        let segments_y = segments_y.max(0) as usize;

        Self {
            timesteps,
            width,
            height,
            segments_x,
            segments_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_accepts_valid_values() {
        let config = LaunchConfig::sanitize(500, 1024, 768, 4, 2);
        assert_eq!(config.timesteps, 500);
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, 768);
        assert_eq!(config.segments_x, 4);
        assert_eq!(config.segments_y, 2);
    }

    #[test]
    fn sanitize_defaults_non_positive_values() {
        let config = LaunchConfig::sanitize(0, -3, 0, -1, -1);
        assert_eq!(config.timesteps, DEFAULT_TIMESTEPS);
        assert_eq!(config.width, DEFAULT_WIDTH);
        assert_eq!(config.height, DEFAULT_HEIGHT);
        // Negative segments mean auto-plan, not an error.
        assert_eq!(config.segments_x, 0);
        assert_eq!(config.segments_y, 0);
    }

    #[test]
    fn default_auto_plans_segments() {
        let config = LaunchConfig::default();
        assert_eq!(config.segments_x, 0);
        assert_eq!(config.segments_y, 0);
    }
}

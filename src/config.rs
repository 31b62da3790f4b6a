//! Simulation configuration.
//!
//! Every section is serde-friendly and falls back to defaults for missing
//! fields, so a config file only needs the values it changes:
//!
//! ```json
//! {
//!     "spawn": { "count": 20000, "predators": 50 },
//!     "grid": { "strategy": "linked_buckets" },
//!     "composition": "tap"
//! }
//! ```

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flocking::{CompositionPolicy, FlockingParams, SpeedLimits};
use crate::spatial::morton::{table_len, MAX_TABLE_LEN};
use crate::spatial::{CellCoding, GridConfig, GridStrategy};

/// What happens to agents that leave the grid volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Re-enter on the opposite face.
    #[default]
    Wrap,
    /// Leave freely. Sort-based grids then fail the next build.
    Open,
}

impl Boundary {
    pub fn apply(self, position: Vec3, origin: Vec3, extent: Vec3) -> Vec3 {
        match self {
            Boundary::Open => position,
            Boundary::Wrap => {
                let local = (position - origin).rem_euclid(extent);
                // rem_euclid can round up to exactly `extent` for tiny negatives
                let local = Vec3::select(local.cmpge(extent), Vec3::ZERO, local);
                origin + local
            }
        }
    }
}

/// Initial population.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub count: usize,
    /// The last `predators` agents are predators.
    pub predators: usize,
    /// Full edge lengths of the spawn box.
    pub extent: Vec3,
    /// Center of the spawn box.
    pub offset: Vec3,
    /// Keep agents in the z = 0 plane.
    pub planar: bool,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            count: 10_000,
            predators: 0,
            extent: Vec3::splat(600.0),
            offset: Vec3::splat(350.0),
            planar: false,
        }
    }
}

/// Top-level configuration for a [`Simulation`](crate::Simulation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub grid: GridConfig,
    pub flocking: FlockingParams,
    pub spawn: SpawnConfig,
    pub composition: CompositionPolicy,
    pub boundary: Boundary,
    /// Run grid builds and force evaluation on the rayon pool.
    pub parallel: bool,
    /// Spawn seed. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            flocking: FlockingParams::default(),
            spawn: SpawnConfig::default(),
            composition: CompositionPolicy::default(),
            boundary: Boundary::default(),
            parallel: true,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Sets the population size and how many of it are predators.
    pub fn with_population(mut self, count: usize, predators: usize) -> Self {
        self.spawn.count = count;
        self.spawn.predators = predators;
        self
    }

    pub fn with_strategy(mut self, strategy: GridStrategy) -> Self {
        self.grid.strategy = strategy;
        self
    }

    pub fn with_coding(mut self, coding: CellCoding) -> Self {
        self.grid.coding = coding;
        self
    }

    pub fn with_composition(mut self, policy: CompositionPolicy) -> Self {
        self.composition = policy;
        self
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Restricts spawning and motion to the z = 0 plane.
    pub fn with_planar(mut self, planar: bool) -> Self {
        self.spawn.planar = planar;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects configurations that would produce incomplete neighbor sets or
    /// an unusable population.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("grid.cell_size", self.grid.cell_size)?;
        positive("flocking.scope", self.flocking.scope)?;
        if (self.flocking.scope - self.grid.cell_size).abs() > f32::EPSILON * self.grid.cell_size {
            return Err(ConfigError::ScopeMismatch {
                scope: self.flocking.scope,
                cell_size: self.grid.cell_size,
            });
        }
        if !(1..=1024).contains(&self.grid.resolution) {
            return Err(ConfigError::GridResolution(self.grid.resolution));
        }
        let sort_based = self.grid.strategy.is_sort_based();
        let cells = table_len(self.grid.resolution);
        if sort_based && cells > MAX_TABLE_LEN {
            return Err(ConfigError::TableTooLarge {
                resolution: self.grid.resolution,
                cells,
                limit: MAX_TABLE_LEN,
            });
        }

        let extent = self.spawn.extent;
        let flat_ok = self.spawn.planar && extent.x > 0.0 && extent.y > 0.0;
        if !extent.is_finite() || extent.min_element() < 0.0 || !(flat_ok || extent.min_element() > 0.0) {
            return Err(ConfigError::EmptySpawnVolume {
                extent: extent.to_array(),
            });
        }
        let half = extent * 0.5;
        let offset = self.spawn.offset;
        if !(offset - half).is_finite() || !(offset + half).is_finite() {
            return Err(ConfigError::NonFiniteSpawnBox {
                offset: offset.to_array(),
                extent: extent.to_array(),
            });
        }
        if sort_based {
            self.spawn_fits_grid()?;
        }
        if self.spawn.predators > self.spawn.count {
            return Err(ConfigError::TooManyPredators {
                predators: self.spawn.predators,
                count: self.spawn.count,
            });
        }

        speed_range("prey", &self.flocking.prey)?;
        speed_range("predator", &self.flocking.predator)?;
        Ok(())
    }

    /// Checks that every position the spawner can draw lands in a grid cell.
    fn spawn_fits_grid(&self) -> Result<(), ConfigError> {
        let half = self.spawn.extent * 0.5;
        let mut min = self.spawn.offset - half;
        let mut max = self.spawn.offset + half;
        if self.spawn.planar {
            min.z = 0.0;
            max.z = 0.0;
        }
        let grid = &self.grid;
        if grid.contains_cell(grid.cell_of(min)) && grid.contains_cell(grid.cell_of(max)) {
            Ok(())
        } else {
            Err(ConfigError::SpawnOutsideGrid {
                min: min.to_array(),
                max: max.to_array(),
            })
        }
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn speed_range(kind: &'static str, limits: &SpeedLimits) -> Result<(), ConfigError> {
    let ok = limits.min_speed >= 0.0
        && limits.min_speed <= limits.max_speed
        && limits.max_speed.is_finite()
        && limits.max_acceleration >= 0.0;
    if ok {
        Ok(())
    } else {
        Err(ConfigError::SpeedRange {
            kind,
            min: limits.min_speed,
            max: limits.max_speed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn test_scope_must_match_cell_size() {
        let mut config = SimConfig::default();
        config.flocking.scope = 12.0;
        assert!(matches!(config.validate(), Err(ConfigError::ScopeMismatch { .. })));
    }

    #[test]
    fn test_empty_spawn_volume() {
        let mut config = SimConfig::default();
        config.spawn.extent = Vec3::new(100.0, 100.0, 0.0);
        assert!(matches!(config.validate(), Err(ConfigError::EmptySpawnVolume { .. })));

        // a flat box is fine for planar flocks
        config.spawn.planar = true;
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_counts_and_speeds() {
        let mut config = SimConfig::default();
        config.spawn.count = 3;
        config.spawn.predators = 4;
        assert!(matches!(config.validate(), Err(ConfigError::TooManyPredators { .. })));

        let mut config = SimConfig::default();
        config.flocking.predator.min_speed = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::SpeedRange { kind: "predator", .. })));

        let mut config = SimConfig::default();
        config.grid.resolution = 2048;
        assert!(matches!(config.validate(), Err(ConfigError::GridResolution(2048))));

        let mut config = SimConfig::default();
        config.grid.cell_size = f32::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::NonPositive { .. })));
    }

    #[test]
    fn test_spawn_box_must_fit_sorted_grid() {
        let mut config = SimConfig::default();
        config.spawn.offset = Vec3::ZERO;
        config.spawn.extent = Vec3::splat(100.0);
        assert!(matches!(config.validate(), Err(ConfigError::SpawnOutsideGrid { .. })));

        // buckets index any cell, so the same box is fine there
        config.grid.strategy = GridStrategy::LinkedBuckets;
        config.validate().unwrap();

        // planar flocks only need the z = 0 slice inside the grid
        let mut config = SimConfig::default();
        config.spawn.offset = Vec3::new(350.0, 350.0, -500.0);
        config.spawn.extent = Vec3::new(100.0, 100.0, 0.0);
        config.spawn.planar = true;
        config.validate().unwrap();
    }

    #[test]
    fn test_spawn_box_must_be_finite() {
        let mut config = SimConfig::default();
        config.grid.strategy = GridStrategy::LinkedBuckets;
        config.spawn.offset = Vec3::new(f32::INFINITY, 0.0, 0.0);
        assert!(matches!(config.validate(), Err(ConfigError::NonFiniteSpawnBox { .. })));

        config.spawn.offset = Vec3::new(0.0, f32::NAN, 0.0);
        assert!(matches!(config.validate(), Err(ConfigError::NonFiniteSpawnBox { .. })));

        // finite on its own, but the box corner overflows
        config.spawn.offset = Vec3::splat(f32::MAX);
        config.spawn.extent = Vec3::splat(f32::MAX);
        assert!(matches!(config.validate(), Err(ConfigError::NonFiniteSpawnBox { .. })));
    }

    #[test]
    fn test_sort_based_table_is_capped() {
        let mut config = SimConfig::default();
        config.grid.resolution = 1024;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TableTooLarge { resolution: 1024, .. })
        ));

        config.grid.strategy = GridStrategy::LinkedBuckets;
        config.validate().unwrap();

        config.grid.strategy = GridStrategy::Sorted;
        config.grid.resolution = 256;
        assert_eq!(table_len(256), MAX_TABLE_LEN);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json_str(
            r#"{
                "spawn": { "count": 500, "predators": 5, "planar": true },
                "grid": { "strategy": "linked_buckets", "coding": "concatenation" },
                "composition": "tap",
                "seed": 7
            }"#,
        )
        .unwrap();
        assert_eq!(config.spawn.count, 500);
        assert_eq!(config.spawn.extent, SpawnConfig::default().extent);
        assert_eq!(config.grid.cell_size, 10.0);
        assert_eq!(config.composition, CompositionPolicy::Tap);
        assert_eq!(config.seed, Some(7));
        assert!(config.parallel);
    }

    #[test]
    fn test_json_round_trip() {
        let config = SimConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(SimConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(SimConfig::from_json_str("{ nope"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_wrap_boundary() {
        let origin = Vec3::ZERO;
        let extent = Vec3::splat(700.0);
        let p = Boundary::Wrap.apply(Vec3::new(701.0, -1.0, 350.0), origin, extent);
        assert!((p - Vec3::new(1.0, 699.0, 350.0)).length() < 1e-3);

        let p = Boundary::Wrap.apply(Vec3::new(-1e-8, 0.0, 0.0), origin, extent);
        assert!(p.x >= 0.0 && p.x < 700.0);

        let far = Vec3::splat(-5000.0);
        assert_eq!(Boundary::Open.apply(far, origin, extent), far);
    }
}

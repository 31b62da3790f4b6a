//! Bulk construction of the initial population.
//!
//! Agents are scattered uniformly over the spawn box with a random heading and
//! a speed drawn from their kind's speed range. The last `predators` agents of
//! the population are predators.

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

use crate::agent::Agent;
use crate::config::SpawnConfig;
use crate::flocking::{FlockingParams, SpeedLimits};

/// Random source with spawn helpers.
pub struct SpawnContext {
    rng: SmallRng,
}

impl SpawnContext {
    /// Reproducible context for a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Random f32 in `min..=max`. Equal bounds return `min`.
    #[inline]
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        self.rng.gen_range(min..=max)
    }

    /// Uniform point in the box of full size `extent` centered on `center`.
    pub fn random_in_box(&mut self, center: Vec3, extent: Vec3) -> Vec3 {
        let half = extent * 0.5;
        Vec3::new(
            self.random_range(center.x - half.x, center.x + half.x),
            self.random_range(center.y - half.y, center.y + half.y),
            self.random_range(center.z - half.z, center.z + half.z),
        )
    }

    /// Unit vector uniformly distributed on the sphere.
    pub fn random_direction(&mut self) -> Vec3 {
        let z = self.rng.gen_range(-1.0f32..=1.0);
        let theta = self.rng.gen_range(0.0..TAU);
        let r = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(r * theta.cos(), r * theta.sin(), z)
    }

    /// Unit vector in the xy plane.
    pub fn random_direction_2d(&mut self) -> Vec3 {
        let theta = self.rng.gen_range(0.0..TAU);
        Vec3::new(theta.cos(), theta.sin(), 0.0)
    }

    /// Velocity with a random heading and a speed inside `limits`.
    pub fn random_velocity(&mut self, limits: &SpeedLimits, planar: bool) -> Vec3 {
        let direction = if planar {
            self.random_direction_2d()
        } else {
            self.random_direction()
        };
        direction * self.random_range(limits.min_speed, limits.max_speed)
    }
}

/// Builds `config.count` agents.
pub fn spawn_agents(config: &SpawnConfig, params: &FlockingParams, ctx: &mut SpawnContext) -> Vec<Agent> {
    let first_predator = config.count - config.predators.min(config.count);
    (0..config.count)
        .map(|i| {
            let mut position = ctx.random_in_box(config.offset, config.extent);
            if config.planar {
                position.z = 0.0;
            }
            if i >= first_predator {
                Agent::predator(position, ctx.random_velocity(&params.predator, config.planar))
            } else {
                Agent::prey(position, ctx.random_velocity(&params.prey, config.planar))
            }
        })
        .collect()
}

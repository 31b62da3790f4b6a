//! Force composition.
//!
//! For each agent the engine gathers weighted steering forces from its
//! neighbors and the [`Scene`], combines them into one acceleration under a
//! per-kind budget, then integrates velocity and position.
//!
//! Evaluation reads only the frozen snapshot and the frozen grid, so agents
//! can be advanced in any order or in parallel.
//!
//! # Force terms
//!
//! | Term | Applies to | Direction |
//! |------|------------|-----------|
//! | planes | all | along the plane normal, `softness / distance` |
//! | flee | prey | away from each visible predator |
//! | ray | all | away from (or toward) the user ray, `1 / distance` |
//! | separation | same kind | away from each neighbor, `1 / distance` |
//! | hunt | predators | toward the average or nearest visible prey |
//! | points | all | toward or away from each source, `1 / distance` |
//! | cohesion | prey | toward the mean prey position |
//! | alignment | prey | toward the mean prey velocity |
//!
//! The table order is the priority order used by [`CompositionPolicy::Tap`].

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::config::Boundary;
use crate::scene::Scene;
use crate::spatial::{GridConfig, GridIndex};

/// Speed and acceleration bounds for one kind of agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedLimits {
    pub min_speed: f32,
    pub max_speed: f32,
    /// Largest velocity change per step.
    pub max_acceleration: f32,
}

impl SpeedLimits {
    pub fn new(min_speed: f32, max_speed: f32, max_acceleration: f32) -> Self {
        Self {
            min_speed,
            max_speed,
            max_acceleration,
        }
    }

    pub fn contains_speed(&self, speed: f32) -> bool {
        const SLACK: f32 = 1e-5;
        speed >= self.min_speed - SLACK && speed <= self.max_speed + SLACK
    }
}

/// How weighted forces share the acceleration budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionPolicy {
    /// Sum every force, then truncate the sum to the budget.
    #[default]
    Additive,
    /// Spend the budget on forces in priority order until it runs out.
    Tap,
}

/// Which prey position a predator steers toward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HuntTarget {
    #[default]
    Average,
    Nearest,
}

/// Tunable constants of the flocking rules.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockingParams {
    /// Interaction radius. Must equal the grid cell size.
    pub scope: f32,
    /// Prey closer than this to a predator or lethal source die.
    pub death_distance: f32,
    /// Distances at or below this are treated as coincident.
    pub epsilon: f32,

    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub flee_weight: f32,
    pub hunt_weight: f32,
    pub plane_weight: f32,
    pub point_weight: f32,
    pub ray_weight: f32,

    pub plane_softness: f32,
    /// Planes farther than this exert no force.
    pub plane_avoid_distance: f32,
    /// Lower clamp on plane distance, reached on or behind the plane.
    pub plane_min_distance: f32,

    pub ray_radius: f32,
    pub ray_death_distance: f32,

    pub prey: SpeedLimits,
    pub predator: SpeedLimits,
    /// Extra acceleration fraction for prey that see a predator.
    pub flee_boost: f32,
    pub hunt_target: HuntTarget,
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self {
            scope: 10.0,
            death_distance: 3.5,
            epsilon: 1e-4,

            separation_weight: 8.0,
            alignment_weight: 1.0,
            cohesion_weight: 0.1,
            flee_weight: 12.0,
            hunt_weight: 2.0,
            plane_weight: 1.0,
            point_weight: 10.0,
            ray_weight: 20.0,

            plane_softness: 20.0,
            plane_avoid_distance: 40.0,
            plane_min_distance: 0.1,

            ray_radius: 30.0,
            ray_death_distance: 3.5,

            prey: SpeedLimits::new(0.2, 0.3, 0.07),
            predator: SpeedLimits::new(0.2, 0.3, 0.05),
            flee_boost: 0.7,
            hunt_target: HuntTarget::Average,
        }
    }
}

impl FlockingParams {
    pub fn limits_for(&self, agent: &Agent) -> &SpeedLimits {
        if agent.is_predator() {
            &self.predator
        } else {
            &self.prey
        }
    }
}

/// Weighted forces acting on one agent, before composition.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceBreakdown {
    pub planes: Vec3,
    pub flee: Vec3,
    pub ray: Vec3,
    pub separation: Vec3,
    pub hunt: Vec3,
    pub points: Vec3,
    pub cohesion: Vec3,
    pub alignment: Vec3,
    pub prey_seen: usize,
    pub predators_seen: usize,
}

impl ForceBreakdown {
    /// Forces in tap priority order.
    pub fn prioritized(&self) -> [Vec3; 8] {
        [
            self.planes,
            self.flee,
            self.ray,
            self.separation,
            self.hunt,
            self.points,
            self.cohesion,
            self.alignment,
        ]
    }

    pub fn total(&self) -> Vec3 {
        self.prioritized().into_iter().sum()
    }
}

/// Result of evaluating one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Evaluation {
    /// Was dead before this step.
    Dead,
    /// Dies this step. No forces were accumulated.
    Killed,
    Alive(ForceBreakdown),
}

impl CompositionPolicy {
    /// Combines `forces` into one acceleration no longer than `budget`.
    pub fn compose(self, forces: &ForceBreakdown, budget: f32) -> Vec3 {
        match self {
            CompositionPolicy::Additive => forces.total().clamp_length_max(budget),
            CompositionPolicy::Tap => {
                let mut remaining = budget;
                let mut acceleration = Vec3::ZERO;
                for force in forces.prioritized() {
                    if remaining <= 0.0 {
                        break;
                    }
                    let magnitude = force.length();
                    if magnitude <= remaining {
                        acceleration += force;
                        remaining -= magnitude;
                    } else {
                        acceleration += force * (remaining / magnitude);
                        remaining = 0.0;
                    }
                }
                acceleration
            }
        }
    }
}

/// Per-step view over everything a force evaluation reads.
///
/// Shared by reference across worker threads; every field is read-only.
pub struct ForceEngine<'a> {
    pub params: &'a FlockingParams,
    pub policy: CompositionPolicy,
    pub scene: &'a Scene,
    pub grid: &'a dyn GridIndex,
    pub grid_config: &'a GridConfig,
    pub agents: &'a [Agent],
    pub boundary: Boundary,
    pub planar: bool,
}

impl ForceEngine<'_> {
    /// Gathers the weighted forces on agent `index`, or reports its death.
    pub fn evaluate(&self, index: usize) -> Evaluation {
        let agent = &self.agents[index];
        if !agent.is_alive() {
            return Evaluation::Dead;
        }
        if self.touches_lethal_source(agent) {
            return Evaluation::Killed;
        }

        let p = self.params;
        let is_prey = !agent.is_predator();

        let mut killed = false;
        let mut prey_count = 0usize;
        let mut predator_count = 0usize;
        let mut prey_position_sum = Vec3::ZERO;
        let mut prey_velocity_sum = Vec3::ZERO;
        let mut nearest_prey: Option<(f32, Vec3)> = None;
        let mut separation = Vec3::ZERO;
        let mut flee = Vec3::ZERO;

        self.grid
            .for_each_neighbor(self.agents, index, p.scope, &mut |n| {
                if killed || !n.agent.is_alive() {
                    return;
                }
                let other_is_predator = n.agent.is_predator();
                if is_prey && other_is_predator && n.distance < p.death_distance {
                    killed = true;
                    return;
                }
                if n.distance <= p.epsilon {
                    return;
                }
                let away = -n.offset / n.distance;

                if other_is_predator {
                    predator_count += 1;
                    if is_prey {
                        flee += away;
                    } else {
                        separation += away / n.distance;
                    }
                } else {
                    prey_count += 1;
                    prey_position_sum += n.agent.position;
                    prey_velocity_sum += n.agent.velocity;
                    if nearest_prey.map_or(true, |(d, _)| n.distance < d) {
                        nearest_prey = Some((n.distance, n.agent.position));
                    }
                    if is_prey {
                        separation += away / n.distance;
                    }
                }
            });

        if killed {
            return Evaluation::Killed;
        }

        let mut forces = ForceBreakdown {
            prey_seen: prey_count,
            predators_seen: predator_count,
            separation: separation * p.separation_weight,
            flee: flee * p.flee_weight,
            ..Default::default()
        };

        if prey_count > 0 {
            let inv = 1.0 / prey_count as f32;
            let mean_position = prey_position_sum * inv;
            if is_prey {
                forces.cohesion = (mean_position - agent.position) * p.cohesion_weight;
                forces.alignment = (prey_velocity_sum * inv - agent.velocity) * p.alignment_weight;
            } else {
                let target = match (p.hunt_target, nearest_prey) {
                    (HuntTarget::Nearest, Some((_, position))) => position,
                    _ => mean_position,
                };
                forces.hunt = (target - agent.position).normalize_or_zero() * p.hunt_weight;
            }
        }

        forces.planes = self.plane_force(agent.position) * p.plane_weight;
        forces.points = self.point_force(agent.position) * p.point_weight;
        forces.ray = self.ray_force(agent.position) * p.ray_weight;

        Evaluation::Alive(forces)
    }

    /// Next-frame state of agent `index`.
    pub fn advance(&self, index: usize) -> Agent {
        let agent = self.agents[index];
        match self.evaluate(index) {
            Evaluation::Dead => agent,
            Evaluation::Killed => {
                let mut dead = agent;
                dead.kill();
                dead
            }
            Evaluation::Alive(forces) => {
                let limits = self.params.limits_for(&agent);
                let mut budget = limits.max_acceleration;
                if !agent.is_predator() && forces.predators_seen > 0 {
                    budget *= 1.0 + self.params.flee_boost;
                }
                let acceleration = self.policy.compose(&forces, budget);
                let velocity = integrate_velocity(agent.velocity, acceleration, limits, self.planar);
                let position = self.boundary.apply(
                    agent.position + velocity,
                    self.grid_config.origin,
                    self.grid_config.extent(),
                );
                Agent::new(position, velocity, agent.status)
            }
        }
    }

    fn touches_lethal_source(&self, agent: &Agent) -> bool {
        let p = self.params;
        let by_point = self
            .scene
            .points
            .iter()
            .any(|s| s.lethal && s.position.distance(agent.position) < p.death_distance);
        let by_ray = self.scene.user_ray.is_some_and(|ray| {
            ray.lethal && ray.closest_point(agent.position).distance(agent.position) < p.ray_death_distance
        });
        by_point || by_ray
    }

    fn plane_force(&self, position: Vec3) -> Vec3 {
        let p = self.params;
        let mut force = Vec3::ZERO;
        for plane in &self.scene.planes {
            let (Some(normal), Some(distance)) = (plane.unit_normal(), plane.signed_distance(position))
            else {
                continue;
            };
            if distance < p.plane_avoid_distance {
                force += normal * (p.plane_softness / distance.max(p.plane_min_distance));
            }
        }
        force
    }

    fn point_force(&self, position: Vec3) -> Vec3 {
        let mut force = Vec3::ZERO;
        for source in &self.scene.points {
            let offset = source.position - position;
            let distance = offset.length();
            if distance <= self.params.epsilon {
                continue;
            }
            let toward = offset / (distance * distance);
            force += if source.attractive { toward } else { -toward };
        }
        force
    }

    fn ray_force(&self, position: Vec3) -> Vec3 {
        let Some(ray) = self.scene.user_ray else {
            return Vec3::ZERO;
        };
        let offset = position - ray.closest_point(position);
        let distance = offset.length();
        if distance >= self.params.ray_radius || distance <= self.params.epsilon {
            return Vec3::ZERO;
        }
        let away = offset / (distance * distance);
        if ray.attract {
            -away
        } else {
            away
        }
    }
}

/// Adds `acceleration` and rescales the result into the speed range.
///
/// A degenerate result keeps the previous heading, or +X when there is none.
pub fn integrate_velocity(
    velocity: Vec3,
    acceleration: Vec3,
    limits: &SpeedLimits,
    planar: bool,
) -> Vec3 {
    let flatten = |v: Vec3| if planar { v.with_z(0.0) } else { v };
    let candidate = flatten(velocity + acceleration);
    let speed = candidate.length();
    let direction = if speed.is_finite() && speed > f32::EPSILON {
        candidate / speed
    } else {
        flatten(velocity).try_normalize().unwrap_or(Vec3::X)
    };
    let speed = if speed.is_finite() { speed } else { limits.max_speed };
    direction * speed.clamp(limits.min_speed, limits.max_speed)
}

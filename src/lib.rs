//! # boidsim - uniform grid boids
//!
//! A flocking core for large agent populations: a uniform grid spatial index
//! rebuilt every frame, a 3x3x3 neighbor query, weighted flocking forces and a
//! double-buffered step that can run across all cores.
//!
//! ## Quick Start
//!
//! ```ignore
//! use boidsim::prelude::*;
//!
//! let config = SimConfig::default()
//!     .with_population(20_000, 40)
//!     .with_strategy(GridStrategy::Sorted);
//! let mut sim = Simulation::new(config)?;
//! let scene = Scene::room(Vec3::ZERO, Vec3::splat(700.0));
//!
//! for _ in 0..100 {
//!     let report = sim.step(&scene)?;
//!     println!("frame {} alive {}", report.frame, report.alive);
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Agents
//!
//! An [`Agent`] is a position, a velocity and a [`Status`] word with
//! `PREDATOR` and `ALIVE` flags. Agents are never removed; death clears
//! `ALIVE` so indices stay stable.
//!
//! ### Grid strategies
//!
//! | Strategy | Build | Use it for |
//! |----------|-------|------------|
//! | [`GridStrategy::LinkedBuckets`] | hash map of linked buckets | small flocks, unbounded space |
//! | [`GridStrategy::Sorted`] | parallel code, sort, scan | large flocks |
//! | [`GridStrategy::Naive`] | none, O(n) per query | reference and tests |
//!
//! The `gpu` feature adds `GridStrategy::SortedGpu`, which runs the sort-based
//! build as wgpu compute passes.
//!
//! Cells are coded with [`CellCoding::Morton`] (Z-order) or
//! [`CellCoding::Concatenation`]. The interaction radius must equal the cell
//! size; [`SimConfig::validate`] enforces this.
//!
//! ### Steps
//!
//! [`Simulation::step`] rebuilds the index, evaluates every agent against the
//! frozen frame into a staging buffer and swaps it in. A failing step leaves
//! the previous frame in place.

pub mod agent;
pub mod config;
pub mod error;
pub mod flocking;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod scene;
pub mod simulation;
pub mod spatial;
pub mod spawn;
pub mod store;
pub mod timing;

pub use agent::{Agent, Status};
pub use config::{Boundary, SimConfig, SpawnConfig};
pub use error::{ConfigError, GridError, SimulationError};
#[cfg(feature = "gpu")]
pub use error::GpuError;
pub use flocking::{
    CompositionPolicy, Evaluation, ForceBreakdown, ForceEngine, FlockingParams, HuntTarget,
    SpeedLimits,
};
pub use glam::{IVec3, Vec3};
pub use scene::{ObstaclePlane, PointSource, Scene, UserRay};
pub use simulation::{Phase, Simulation, StepReport};
pub use spatial::{
    CellCoding, GridConfig, GridIndex, GridStats, GridStrategy, LinkedGrid, NaiveGrid, Neighbor,
    SortedGrid,
};
pub use spawn::SpawnContext;
pub use store::AgentStore;
pub use timing::StepTimings;

/// Everything needed to configure and run a simulation.
pub mod prelude {
    pub use crate::agent::{Agent, Status};
    pub use crate::config::{Boundary, SimConfig};
    pub use crate::flocking::{CompositionPolicy, FlockingParams};
    pub use crate::scene::{ObstaclePlane, PointSource, Scene, UserRay};
    pub use crate::simulation::{Simulation, StepReport};
    pub use crate::spatial::{CellCoding, GridIndex, GridStrategy};
    pub use crate::Vec3;
}

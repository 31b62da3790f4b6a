//! Error types for boidsim.
//!
//! Configuration problems are reported at setup time. Grid capacity and
//! numerical errors abort a step before it commits, so the store always holds
//! the last fully computed frame.

use glam::IVec3;
use thiserror::Error;

/// Rejected simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The interaction radius must match the cell edge or the 3x3x3 walk
    /// misses neighbors.
    #[error("scope radius {scope} must equal cell size {cell_size}")]
    ScopeMismatch { scope: f32, cell_size: f32 },
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f32 },
    #[error("spawn volume is empty (extent {extent:?})")]
    EmptySpawnVolume { extent: [f32; 3] },
    #[error("spawn box must be finite (offset {offset:?}, extent {extent:?})")]
    NonFiniteSpawnBox { offset: [f32; 3], extent: [f32; 3] },
    /// Sort-based grids reject agents outside the grid volume, so the spawn
    /// box has to fit inside it.
    #[error("spawn box {min:?}..={max:?} does not fit inside the grid volume")]
    SpawnOutsideGrid { min: [f32; 3], max: [f32; 3] },
    #[error("{predators} predators requested but only {count} agents")]
    TooManyPredators { predators: usize, count: usize },
    #[error("invalid speed range for {kind}: min {min} max {max}")]
    SpeedRange { kind: &'static str, min: f32, max: f32 },
    #[error("grid resolution {0} is outside 1..=1024")]
    GridResolution(u32),
    /// The dense cell tables of a sort-based grid would exceed the table cap.
    #[error("resolution {resolution} needs {cells} table entries, more than the limit of {limit}")]
    TableTooLarge { resolution: u32, cells: usize, limit: usize },
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while building a grid index.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    /// An agent's cell lies outside the allocated cell table.
    #[error("agent {agent} maps to cell {cell:?}, outside a {resolution}^3 grid")]
    OutOfRange {
        agent: usize,
        cell: IVec3,
        resolution: u32,
    },
    /// More agents than the backend's buffers can address.
    #[error("{agents} agents exceed the index capacity of {limit}")]
    TooManyAgents { agents: usize, limit: usize },
    /// The compute backend failed mid-build.
    #[error("device error during index build: {0}")]
    Device(String),
}

/// Errors that abort a [`Simulation::step`](crate::Simulation::step).
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Grid(#[from] GridError),
    /// A staged agent has a NaN or infinite component.
    #[error("agent {agent} produced a non-finite state")]
    NonFinite { agent: usize },
    #[cfg(feature = "gpu")]
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Errors from the compute backend.
#[cfg(feature = "gpu")]
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
    #[error("failed to map GPU buffer: {0}")]
    BufferMapping(String),
    /// The dense cell tables exceed the device's storage binding limit.
    #[error("cell table of {cells} entries exceeds the device limit of {limit} bytes")]
    GridTooLarge { cells: u64, limit: u64 },
}

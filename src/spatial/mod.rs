//! Uniform grid spatial indexing.
//!
//! Space is cut into cubic cells of edge `cell_size`. Each frame the index is
//! rebuilt from scratch from a frozen agent snapshot, then queried once per
//! agent by visiting the 3x3x3 block of cells around it.
//!
//! Three interchangeable strategies share the [`GridIndex`] contract:
//!
//! | Strategy | Build | Notes |
//! |----------|-------|-------|
//! | [`LinkedGrid`] | sequential, hash map of buckets | unbounded space |
//! | [`SortedGrid`] | parallel code / sort / scan | dense tables, bounded grid |
//! | [`NaiveGrid`] | nothing | O(n) per query, reference only |
//!
//! With the `gpu` feature, `GpuSortedGrid` runs the sort-based build on a
//! compute device.
//!
//! The cell walk over-admits (block corners reach past the scope sphere), so
//! [`GridIndex::for_each_neighbor`] applies the self-exclusion and the strict
//! `distance < scope` filter on top of it.

mod linked;
pub mod morton;
mod naive;
mod sorted;

pub use linked::{CellHasher, LinkedGrid};
pub use morton::CellCoding;
pub use naive::NaiveGrid;
pub use sorted::SortedGrid;

use glam::{IVec3, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::{GridError, SimulationError};

/// Offsets of the 27 cells in a 3x3x3 block, center included.
pub const NEIGHBOR_OFFSETS: [IVec3; 27] = {
    let mut offsets = [IVec3::ZERO; 27];
    let mut i = 0;
    while i < 27 {
        offsets[i] = IVec3::new(
            (i % 3) as i32 - 1,
            ((i / 3) % 3) as i32 - 1,
            (i / 9) as i32 - 1,
        );
        i += 1;
    }
    offsets
};

/// Which index construction to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStrategy {
    /// Hash map of cell buckets threaded through a `next` array.
    LinkedBuckets,
    /// Code, stable sort, rearrange, range scan.
    #[default]
    Sorted,
    /// All-pairs scan.
    Naive,
    /// Sort-based build on a wgpu compute device.
    #[cfg(feature = "gpu")]
    SortedGpu,
}

impl GridStrategy {
    /// Whether the strategy keeps dense per-code tables and rejects agents
    /// outside the grid volume.
    pub fn is_sort_based(self) -> bool {
        match self {
            GridStrategy::LinkedBuckets | GridStrategy::Naive => false,
            GridStrategy::Sorted => true,
            #[cfg(feature = "gpu")]
            GridStrategy::SortedGpu => true,
        }
    }
}

/// Grid geometry and construction choice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub strategy: GridStrategy,
    pub coding: CellCoding,
    /// Edge length of a cell in world units.
    pub cell_size: f32,
    /// Cells per axis. Sort-based strategies reject agents outside
    /// `origin .. origin + resolution * cell_size`.
    pub resolution: u32,
    /// World position of the grid's minimum corner.
    pub origin: Vec3,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            strategy: GridStrategy::default(),
            coding: CellCoding::default(),
            cell_size: 10.0,
            resolution: 70, // 700 world units per axis
            origin: Vec3::ZERO,
        }
    }
}

impl GridConfig {
    pub fn new(cell_size: f32, resolution: u32) -> Self {
        Self {
            cell_size,
            resolution,
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: GridStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_coding(mut self, coding: CellCoding) -> Self {
        self.coding = coding;
        self
    }

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    /// World-space edge of the whole grid.
    pub fn extent(&self) -> Vec3 {
        Vec3::splat(self.cell_size * self.resolution as f32)
    }

    pub fn bits_per_axis(&self) -> u32 {
        morton::bits_per_axis(self.resolution)
    }

    /// Integer cell containing `position`.
    #[inline]
    pub fn cell_of(&self, position: Vec3) -> IVec3 {
        ((position - self.origin) / self.cell_size).floor().as_ivec3()
    }

    #[inline]
    pub fn contains_cell(&self, cell: IVec3) -> bool {
        let res = self.resolution as i32;
        cell.cmpge(IVec3::ZERO).all() && cell.cmplt(IVec3::splat(res)).all()
    }

    /// Table code for an in-range cell, `None` outside the grid.
    #[inline]
    pub fn code_of(&self, cell: IVec3) -> Option<u32> {
        if self.contains_cell(cell) {
            Some(self.coding.encode(cell.as_uvec3(), self.bits_per_axis()))
        } else {
            None
        }
    }

    pub fn cell_of_code(&self, code: u32) -> UVec3 {
        self.coding.decode(code, self.bits_per_axis())
    }

    /// Builds an empty index for this configuration.
    pub fn create_index(&self, parallel: bool) -> Result<Box<dyn GridIndex>, SimulationError> {
        Ok(match self.strategy {
            GridStrategy::LinkedBuckets => Box::new(LinkedGrid::new(*self)),
            GridStrategy::Sorted => Box::new(SortedGrid::new(*self).with_parallel(parallel)),
            GridStrategy::Naive => Box::new(NaiveGrid::new(*self)),
            #[cfg(feature = "gpu")]
            GridStrategy::SortedGpu => Box::new(crate::gpu::GpuSortedGrid::new(*self)?),
        })
    }
}

/// Occupancy summary of the last build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridStats {
    pub agents: usize,
    pub occupied_cells: usize,
    pub max_occupancy: usize,
}

impl GridStats {
    /// Mean agents per non-empty cell.
    pub fn mean_occupancy(&self) -> f32 {
        if self.occupied_cells == 0 {
            0.0
        } else {
            self.agents as f32 / self.occupied_cells as f32
        }
    }
}

/// A neighbor that passed the self and scope filters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub agent: Agent,
    /// `neighbor.position - self.position`.
    pub offset: Vec3,
    pub distance: f32,
}

/// Cell to agent mapping rebuilt every frame.
///
/// Usage per frame is `build`, any number of queries, then `clear` (or the
/// next `build`, which clears first).
pub trait GridIndex: Send + Sync {
    fn strategy(&self) -> GridStrategy;

    /// Indexes every agent of the snapshot. Agents keep their slice index as
    /// their identifier.
    fn build(&mut self, agents: &[Agent]) -> Result<(), GridError>;

    /// Drops all cell membership. Safe to call repeatedly.
    fn clear(&mut self);

    /// Calls `visitor` for each agent indexed in the 3x3x3 block around
    /// `position`, the agent at `position` included.
    ///
    /// `agents` must be the snapshot passed to the last `build`.
    fn visit_candidates(
        &self,
        agents: &[Agent],
        position: Vec3,
        visitor: &mut dyn FnMut(usize, &Agent),
    );

    fn stats(&self) -> GridStats;

    /// Visits every agent other than `index` strictly closer than `scope`.
    fn for_each_neighbor(
        &self,
        agents: &[Agent],
        index: usize,
        scope: f32,
        visitor: &mut dyn FnMut(Neighbor),
    ) {
        let position = agents[index].position;
        self.visit_candidates(agents, position, &mut |other, agent| {
            if other == index {
                return;
            }
            let offset = agent.position - position;
            let distance = offset.length();
            if distance < scope {
                visitor(Neighbor {
                    index: other,
                    agent: *agent,
                    offset,
                    distance,
                });
            }
        });
    }

    /// Materialized form of [`for_each_neighbor`](Self::for_each_neighbor).
    fn neighbors_of(&self, agents: &[Agent], index: usize, scope: f32) -> Vec<Neighbor> {
        let mut out = Vec::new();
        self.for_each_neighbor(agents, index, scope, &mut |n| out.push(n));
        out
    }
}

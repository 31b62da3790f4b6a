//! Linked-bucket grid.
//!
//! Cells live in a hash map from cell coordinate to a bucket holding the first
//! and last agent id. Buckets are singly linked lists threaded through a flat
//! `next` array indexed by agent id, so inserting never allocates a node.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher};

use glam::{IVec3, Vec3};

use super::{GridConfig, GridIndex, GridStats, GridStrategy, NEIGHBOR_OFFSETS};
use crate::agent::Agent;
use crate::error::GridError;

const NONE: u32 = u32::MAX;

/// Seed-mixing hasher for integer cell coordinates.
///
/// Each written word is folded in with
/// `seed ^= v + 0x9e3779b9 + (seed << 6) + (seed >> 2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CellHasher {
    seed: u64,
}

impl CellHasher {
    #[inline]
    fn combine(&mut self, value: u64) {
        self.seed ^= value
            .wrapping_add(0x9e37_79b9)
            .wrapping_add(self.seed << 6)
            .wrapping_add(self.seed >> 2);
    }
}

impl Hasher for CellHasher {
    fn finish(&self) -> u64 {
        self.seed
    }

    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.combine(u32::from_le_bytes(word) as u64);
        }
    }

    fn write_i32(&mut self, value: i32) {
        self.combine(value as u32 as u64);
    }
}

type CellMap = HashMap<IVec3, Bucket, BuildHasherDefault<CellHasher>>;

#[derive(Clone, Copy, Debug)]
struct Bucket {
    head: u32,
    tail: u32,
    len: u32,
}

/// Sequential grid over unbounded space.
pub struct LinkedGrid {
    config: GridConfig,
    buckets: CellMap,
    next: Vec<u32>,
    agents: usize,
}

impl LinkedGrid {
    pub fn new(config: GridConfig) -> Self {
        Self {
            config,
            buckets: CellMap::default(),
            next: Vec::new(),
            agents: 0,
        }
    }

    fn insert(&mut self, id: u32, cell: IVec3) {
        self.next[id as usize] = NONE;
        match self.buckets.get_mut(&cell) {
            Some(bucket) => {
                self.next[bucket.tail as usize] = id;
                bucket.tail = id;
                bucket.len += 1;
            }
            None => {
                self.buckets.insert(
                    cell,
                    Bucket {
                        head: id,
                        tail: id,
                        len: 1,
                    },
                );
            }
        }
    }

    /// Agent ids in the bucket of `cell`, in insertion order.
    pub fn bucket(&self, cell: IVec3) -> impl Iterator<Item = usize> + '_ {
        let mut id = self.buckets.get(&cell).map_or(NONE, |b| b.head);
        std::iter::from_fn(move || {
            if id == NONE {
                return None;
            }
            let current = id;
            id = self.next[current as usize];
            Some(current as usize)
        })
    }
}

impl GridIndex for LinkedGrid {
    fn strategy(&self) -> GridStrategy {
        GridStrategy::LinkedBuckets
    }

    fn build(&mut self, agents: &[Agent]) -> Result<(), GridError> {
        self.clear();
        self.next.resize(agents.len(), NONE);
        for (id, agent) in agents.iter().enumerate() {
            let cell = self.config.cell_of(agent.position);
            self.insert(id as u32, cell);
        }
        self.agents = agents.len();
        Ok(())
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.agents = 0;
    }

    fn visit_candidates(
        &self,
        agents: &[Agent],
        position: Vec3,
        visitor: &mut dyn FnMut(usize, &Agent),
    ) {
        let center = self.config.cell_of(position);
        for offset in NEIGHBOR_OFFSETS {
            for id in self.bucket(center + offset) {
                visitor(id, &agents[id]);
            }
        }
    }

    fn stats(&self) -> GridStats {
        GridStats {
            agents: self.agents,
            occupied_cells: self.buckets.len(),
            max_occupancy: self.buckets.values().map(|b| b.len as usize).max().unwrap_or(0),
        }
    }
}

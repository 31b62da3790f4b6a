//! Sort-based grid.
//!
//! Build runs as four data-parallel phases, each finishing before the next
//! reads its output:
//!
//! 1. every agent gets the code of its cell
//! 2. agent ids are stable-sorted by code
//! 3. agents are copied into a second buffer in sorted order
//! 4. the sorted codes are scanned for change points, giving each occupied
//!    cell a `[start, end)` range into the sorted buffer
//!
//! `cell_start`/`cell_end` are dense tables indexed by code. Only the entries
//! written by the last build are meaningful; `clear` resets exactly those.

use glam::Vec3;
use rayon::prelude::*;

use super::{GridConfig, GridIndex, GridStats, GridStrategy, NEIGHBOR_OFFSETS};
use crate::agent::Agent;
use crate::error::GridError;

/// Table sentinel for a cell with no agents.
pub const EMPTY: u32 = u32::MAX;

pub struct SortedGrid {
    config: GridConfig,
    parallel: bool,
    codes: Vec<u32>,
    sorted_ids: Vec<u32>,
    sorted_codes: Vec<u32>,
    sorted_agents: Vec<Agent>,
    cell_start: Vec<u32>,
    cell_end: Vec<u32>,
    touched: Vec<u32>,
}

impl SortedGrid {
    pub fn new(config: GridConfig) -> Self {
        let len = super::morton::table_len(config.resolution);
        Self {
            config,
            parallel: true,
            codes: Vec::new(),
            sorted_ids: Vec::new(),
            sorted_codes: Vec::new(),
            sorted_agents: Vec::new(),
            cell_start: vec![EMPTY; len],
            cell_end: vec![EMPTY; len],
            touched: Vec::new(),
        }
    }

    /// Runs build phases on the calling thread when `false`.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Agent ids in sorted order.
    pub fn sorted_ids(&self) -> &[u32] {
        &self.sorted_ids
    }

    pub fn sorted_codes(&self) -> &[u32] {
        &self.sorted_codes
    }

    pub fn sorted_agents(&self) -> &[Agent] {
        &self.sorted_agents
    }

    /// `[start, end)` range into the sorted buffers for `code`.
    pub fn cell_range(&self, code: u32) -> Option<std::ops::Range<usize>> {
        let start = *self.cell_start.get(code as usize)?;
        if start == EMPTY {
            return None;
        }
        Some(start as usize..self.cell_end[code as usize] as usize)
    }

    /// Codes written by the last build, in ascending order.
    pub fn touched(&self) -> &[u32] {
        &self.touched
    }

    pub(crate) fn code_for(config: &GridConfig, id: usize, agent: &Agent) -> Result<u32, GridError> {
        let cell = config.cell_of(agent.position);
        config.code_of(cell).ok_or(GridError::OutOfRange {
            agent: id,
            cell,
            resolution: config.resolution,
        })
    }

    fn assign_codes(&mut self, agents: &[Agent]) -> Result<(), GridError> {
        let config = self.config;
        self.codes = if self.parallel {
            agents
                .par_iter()
                .enumerate()
                .map(|(id, agent)| Self::code_for(&config, id, agent))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            agents
                .iter()
                .enumerate()
                .map(|(id, agent)| Self::code_for(&config, id, agent))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(())
    }

    fn sort_ids(&mut self) {
        let codes = &self.codes;
        self.sorted_ids.clear();
        self.sorted_ids.extend(0..codes.len() as u32);
        // both sorts are stable: equal codes keep ascending id order
        if self.parallel {
            self.sorted_ids.par_sort_by_key(|&id| codes[id as usize]);
        } else {
            self.sorted_ids.sort_by_key(|&id| codes[id as usize]);
        }
    }

    fn rearrange(&mut self, agents: &[Agent]) {
        let codes = &self.codes;
        if self.parallel {
            self.sorted_ids
                .par_iter()
                .map(|&id| agents[id as usize])
                .collect_into_vec(&mut self.sorted_agents);
            self.sorted_ids
                .par_iter()
                .map(|&id| codes[id as usize])
                .collect_into_vec(&mut self.sorted_codes);
        } else {
            self.sorted_agents.clear();
            self.sorted_agents
                .extend(self.sorted_ids.iter().map(|&id| agents[id as usize]));
            self.sorted_codes.clear();
            self.sorted_codes
                .extend(self.sorted_ids.iter().map(|&id| codes[id as usize]));
        }
    }

    fn scan_ranges(&mut self) {
        let codes = &self.sorted_codes;
        let is_start = |i: &usize| *i == 0 || codes[*i] != codes[*i - 1];
        let starts: Vec<usize> = if self.parallel {
            (0..codes.len()).into_par_iter().filter(is_start).collect()
        } else {
            (0..codes.len()).filter(is_start).collect()
        };

        // one writer per distinct code
        for (k, &start) in starts.iter().enumerate() {
            let end = starts.get(k + 1).copied().unwrap_or(codes.len());
            let code = codes[start];
            self.cell_start[code as usize] = start as u32;
            self.cell_end[code as usize] = end as u32;
            self.touched.push(code);
        }
    }

    /// Installs a build computed elsewhere (the compute backend).
    ///
    /// `cell_start`/`cell_end` must be full tables for this grid's resolution.
    #[cfg(feature = "gpu")]
    pub(crate) fn load_build(
        &mut self,
        sorted_ids: Vec<u32>,
        sorted_codes: Vec<u32>,
        sorted_agents: Vec<Agent>,
        cell_start: Vec<u32>,
        cell_end: Vec<u32>,
    ) {
        self.codes.clear();
        self.touched.clear();
        self.touched.extend(
            sorted_codes
                .iter()
                .enumerate()
                .filter(|&(i, code)| i == 0 || sorted_codes[i - 1] != *code)
                .map(|(_, &code)| code),
        );
        self.sorted_ids = sorted_ids;
        self.sorted_codes = sorted_codes;
        self.sorted_agents = sorted_agents;
        self.cell_start = cell_start;
        self.cell_end = cell_end;
    }
}

impl GridIndex for SortedGrid {
    fn strategy(&self) -> GridStrategy {
        GridStrategy::Sorted
    }

    fn build(&mut self, agents: &[Agent]) -> Result<(), GridError> {
        self.clear();
        self.assign_codes(agents)?;
        self.sort_ids();
        self.rearrange(agents);
        self.scan_ranges();
        Ok(())
    }

    fn clear(&mut self) {
        for &code in &self.touched {
            self.cell_start[code as usize] = EMPTY;
            self.cell_end[code as usize] = EMPTY;
        }
        self.touched.clear();
        self.sorted_ids.clear();
        self.sorted_codes.clear();
        self.sorted_agents.clear();
    }

    fn visit_candidates(
        &self,
        _agents: &[Agent],
        position: Vec3,
        visitor: &mut dyn FnMut(usize, &Agent),
    ) {
        let center = self.config.cell_of(position);
        for offset in NEIGHBOR_OFFSETS {
            let Some(code) = self.config.code_of(center + offset) else {
                continue;
            };
            let Some(range) = self.cell_range(code) else {
                continue;
            };
            for slot in range {
                visitor(self.sorted_ids[slot] as usize, &self.sorted_agents[slot]);
            }
        }
    }

    fn stats(&self) -> GridStats {
        let max_occupancy = self
            .touched
            .iter()
            .map(|&code| (self.cell_end[code as usize] - self.cell_start[code as usize]) as usize)
            .max()
            .unwrap_or(0);
        GridStats {
            agents: self.sorted_ids.len(),
            occupied_cells: self.touched.len(),
            max_occupancy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::CellCoding;
    use glam::IVec3;

    fn agents() -> Vec<Agent> {
        vec![
            Agent::prey(Vec3::new(35.0, 5.0, 5.0), Vec3::X),
            Agent::prey(Vec3::new(5.0, 5.0, 5.0), Vec3::X),
            Agent::prey(Vec3::new(36.0, 6.0, 6.0), Vec3::X),
            Agent::prey(Vec3::new(6.0, 6.0, 6.0), Vec3::X),
            Agent::prey(Vec3::new(5.5, 5.5, 5.5), Vec3::X),
        ]
    }

    #[test]
    fn test_build_groups_cells_contiguously() {
        for parallel in [true, false] {
            let mut grid = SortedGrid::new(GridConfig::new(10.0, 8)).with_parallel(parallel);
            grid.build(&agents()).unwrap();

            // cell (0,0,0) has code 0 and comes first, stable in id order
            assert_eq!(grid.sorted_ids(), &[1, 3, 4, 0, 2]);
            assert_eq!(grid.cell_range(0), Some(0..3));

            let code = grid.config().code_of(IVec3::new(3, 0, 0)).unwrap();
            assert_eq!(grid.cell_range(code), Some(3..5));
            assert_eq!(grid.touched(), &[0, code]);
            assert!(grid.sorted_codes().windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_clear_resets_only_touched() {
        let mut grid = SortedGrid::new(GridConfig::new(10.0, 8));
        grid.build(&agents()).unwrap();
        grid.clear();
        assert!(grid.cell_start.iter().all(|&s| s == EMPTY));
        assert!(grid.cell_end.iter().all(|&e| e == EMPTY));
        assert_eq!(grid.stats(), GridStats::default());
        grid.clear();
        assert!(grid.touched().is_empty());
    }

    #[test]
    fn test_out_of_range_agent_is_rejected() {
        let mut grid = SortedGrid::new(GridConfig::new(10.0, 8));
        let mut snapshot = agents();
        snapshot.push(Agent::prey(Vec3::new(85.0, 0.0, 0.0), Vec3::X));
        let err = grid.build(&snapshot).unwrap_err();
        assert_eq!(
            err,
            GridError::OutOfRange {
                agent: 5,
                cell: IVec3::new(8, 0, 0),
                resolution: 8
            }
        );
    }

    #[test]
    fn test_concatenation_coding_builds_same_ranges() {
        let config = GridConfig::new(10.0, 8).with_coding(CellCoding::Concatenation);
        let mut grid = SortedGrid::new(config);
        grid.build(&agents()).unwrap();
        let stats = grid.stats();
        assert_eq!(stats.occupied_cells, 2);
        assert_eq!(stats.max_occupancy, 3);
        assert_eq!(stats.agents, 5);
    }
}

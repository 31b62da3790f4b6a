//! All-pairs reference index.
//!
//! Builds nothing and scans the whole snapshot per query, admitting exactly
//! the agents whose cell lies in the 3x3x3 block. Candidate sets therefore
//! match the real grids, which makes this the baseline in equivalence tests.

use glam::Vec3;

use super::{GridConfig, GridIndex, GridStats, GridStrategy};
use crate::agent::Agent;
use crate::error::GridError;

pub struct NaiveGrid {
    config: GridConfig,
    agents: usize,
}

impl NaiveGrid {
    pub fn new(config: GridConfig) -> Self {
        Self { config, agents: 0 }
    }
}

impl GridIndex for NaiveGrid {
    fn strategy(&self) -> GridStrategy {
        GridStrategy::Naive
    }

    fn build(&mut self, agents: &[Agent]) -> Result<(), GridError> {
        self.agents = agents.len();
        Ok(())
    }

    fn clear(&mut self) {
        self.agents = 0;
    }

    fn visit_candidates(
        &self,
        agents: &[Agent],
        position: Vec3,
        visitor: &mut dyn FnMut(usize, &Agent),
    ) {
        let center = self.config.cell_of(position);
        for (id, agent) in agents.iter().enumerate().take(self.agents) {
            let delta = self.config.cell_of(agent.position) - center;
            if delta.abs().max_element() <= 1 {
                visitor(id, agent);
            }
        }
    }

    fn stats(&self) -> GridStats {
        GridStats {
            agents: self.agents,
            occupied_cells: usize::from(self.agents > 0),
            max_occupancy: self.agents,
        }
    }
}

//! The per-frame step.
//!
//! A step walks `Idle -> IndexBuilding -> Querying -> Committing -> Idle`:
//!
//! - **IndexBuilding** rebuilds the grid from the committed frame.
//! - **Querying** advances every agent against the frozen frame and frozen
//!   grid, writing into the staging buffer. Lanes never share an output slot.
//! - **Committing** rejects non-finite results, then swaps the buffers.
//!
//! Any error returns before the swap, so the committed frame is always the
//! last complete one.

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::agent::Agent;
use crate::config::SimConfig;
use crate::error::SimulationError;
use crate::flocking::{Evaluation, ForceEngine};
use crate::scene::Scene;
use crate::spatial::{GridIndex, GridStats, Neighbor};
use crate::spawn::{spawn_agents, SpawnContext};
use crate::store::AgentStore;
use crate::timing::{timed, StepTimings};

/// Where the step state machine is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    IndexBuilding,
    Querying,
    Committing,
}

/// Summary of one completed step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Frame number that was just committed.
    pub frame: u64,
    pub alive: usize,
    /// Agents that died during this step.
    pub killed: usize,
    pub predators_alive: usize,
    pub grid: GridStats,
    pub timings: StepTimings,
}

/// A flock and the machinery to advance it.
pub struct Simulation {
    config: SimConfig,
    store: AgentStore,
    grid: Box<dyn GridIndex>,
    phase: Phase,
    frame: u64,
    index_fresh: bool,
}

impl Simulation {
    /// Validates `config` and spawns its population.
    pub fn new(config: SimConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut ctx = SpawnContext::new(config.seed);
        let agents = spawn_agents(&config.spawn, &config.flocking, &mut ctx);
        Self::from_agents(config, agents)
    }

    /// Starts from an explicit population. `config.spawn` is not used.
    pub fn from_agents(config: SimConfig, agents: Vec<Agent>) -> Result<Self, SimulationError> {
        config.validate()?;
        let grid = config.grid.create_index(config.parallel)?;
        info!(
            agents = agents.len(),
            predators = agents.iter().filter(|a| a.is_predator()).count(),
            strategy = ?config.grid.strategy,
            coding = ?config.grid.coding,
            composition = ?config.composition,
            "simulation created"
        );
        Ok(Self {
            config,
            store: AgentStore::new(agents),
            grid,
            phase: Phase::Idle,
            frame: 0,
            index_fresh: false,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of committed frames.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// The committed frame.
    pub fn agents(&self) -> &[Agent] {
        self.store.as_slice()
    }

    pub fn agent(&self, index: usize) -> Agent {
        self.store.get(index)
    }

    /// Replaces committed agent `index` between steps.
    pub fn set_agent(&mut self, index: usize, agent: Agent) {
        self.store.set(index, agent);
        self.index_fresh = false;
    }

    pub fn alive_count(&self) -> usize {
        self.store.iter().filter(|a| a.is_alive()).count()
    }

    pub fn grid(&self) -> &dyn GridIndex {
        self.grid.as_ref()
    }

    /// Indexes the committed frame without stepping.
    pub fn rebuild_index(&mut self) -> Result<GridStats, SimulationError> {
        self.grid.build(self.store.as_slice())?;
        self.index_fresh = true;
        Ok(self.grid.stats())
    }

    /// Neighbors of agent `index` in the committed frame.
    pub fn neighbors_of(&mut self, index: usize) -> Result<Vec<Neighbor>, SimulationError> {
        if !self.index_fresh {
            self.rebuild_index()?;
        }
        Ok(self
            .grid
            .neighbors_of(self.store.as_slice(), index, self.config.flocking.scope))
    }

    /// Evaluates every agent of the committed frame without committing.
    pub fn evaluate_all(&mut self, scene: &Scene) -> Result<Vec<Evaluation>, SimulationError> {
        if !self.index_fresh {
            self.rebuild_index()?;
        }
        let agents = self.store.as_slice();
        let engine = ForceEngine {
            params: &self.config.flocking,
            policy: self.config.composition,
            scene,
            grid: self.grid.as_ref(),
            grid_config: &self.config.grid,
            agents,
            boundary: self.config.boundary,
            planar: self.config.spawn.planar,
        };
        Ok(if self.config.parallel {
            (0..agents.len()).into_par_iter().map(|i| engine.evaluate(i)).collect()
        } else {
            (0..agents.len()).map(|i| engine.evaluate(i)).collect()
        })
    }

    /// Advances the flock by one frame.
    ///
    /// On error the committed frame is unchanged and the machine is back in
    /// [`Phase::Idle`].
    pub fn step(&mut self, scene: &Scene) -> Result<StepReport, SimulationError> {
        let result = self.try_step(scene);
        transition(&mut self.phase, Phase::Idle);
        match &result {
            Ok(report) => debug!(
                frame = report.frame,
                alive = report.alive,
                killed = report.killed,
                occupied_cells = report.grid.occupied_cells,
                build_us = report.timings.index_build.as_micros() as u64,
                query_us = report.timings.query.as_micros() as u64,
                "step committed"
            ),
            Err(err) => warn!(frame = self.frame, error = %err, "step aborted, keeping previous frame"),
        }
        result
    }

    fn try_step(&mut self, scene: &Scene) -> Result<StepReport, SimulationError> {
        let mut timings = StepTimings::default();

        transition(&mut self.phase, Phase::IndexBuilding);
        self.index_fresh = false;
        let (built, elapsed) = timed(|| self.grid.build(self.store.as_slice()));
        built?;
        timings.index_build = elapsed;
        let grid_stats = self.grid.stats();

        transition(&mut self.phase, Phase::Querying);
        let parallel = self.config.parallel;
        let (current, staging) = self.store.split();
        let engine = ForceEngine {
            params: &self.config.flocking,
            policy: self.config.composition,
            scene,
            grid: self.grid.as_ref(),
            grid_config: &self.config.grid,
            agents: current,
            boundary: self.config.boundary,
            planar: self.config.spawn.planar,
        };
        let ((), elapsed) = timed(|| {
            if parallel {
                staging
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(i, slot)| *slot = engine.advance(i));
            } else {
                for (i, slot) in staging.iter_mut().enumerate() {
                    *slot = engine.advance(i);
                }
            }
        });
        timings.query = elapsed;

        transition(&mut self.phase, Phase::Committing);
        let (checked, elapsed) = timed(|| {
            let bad = if parallel {
                staging.par_iter().position_any(|a| !a.is_finite())
            } else {
                staging.iter().position(|a| !a.is_finite())
            };
            if let Some(agent) = bad {
                return Err(SimulationError::NonFinite { agent });
            }
            let killed = current
                .iter()
                .zip(staging.iter())
                .filter(|(before, after)| before.is_alive() && !after.is_alive())
                .count();
            let alive = staging.iter().filter(|a| a.is_alive()).count();
            let predators_alive = staging
                .iter()
                .filter(|a| a.is_alive() && a.is_predator())
                .count();
            Ok((killed, alive, predators_alive))
        });
        let (killed, alive, predators_alive) = checked?;
        self.store.commit();
        self.frame += 1;
        timings.commit = elapsed;

        Ok(StepReport {
            frame: self.frame,
            alive,
            killed,
            predators_alive,
            grid: grid_stats,
            timings,
        })
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    trace!(from = ?*phase, to = ?next, "phase");
    *phase = next;
}

//! Integration tests for the grid strategies.
//!
//! Every strategy must report the same neighbor set for every agent, find all
//! agents within scope and never report one past the 3x3x3 block.

use std::collections::BTreeSet;

use boidsim::{
    Agent, CellCoding, GridConfig, GridIndex, LinkedGrid, NaiveGrid, SortedGrid, SpawnContext,
};
use glam::Vec3;

const SCOPE: f32 = 10.0;

fn random_flock(count: usize, extent: f32, seed: u64) -> Vec<Agent> {
    let mut ctx = SpawnContext::seeded(seed);
    (0..count)
        .map(|i| {
            let position = ctx.random_in_box(Vec3::splat(extent * 0.5), Vec3::splat(extent * 0.999));
            let velocity = ctx.random_direction() * 0.25;
            if i % 50 == 0 {
                Agent::predator(position, velocity)
            } else {
                Agent::prey(position, velocity)
            }
        })
        .collect()
}

fn neighbor_set(grid: &dyn GridIndex, agents: &[Agent], index: usize) -> BTreeSet<usize> {
    grid.neighbors_of(agents, index, SCOPE)
        .into_iter()
        .map(|n| n.index)
        .collect()
}

fn all_strategies(config: GridConfig) -> Vec<Box<dyn GridIndex>> {
    vec![
        Box::new(LinkedGrid::new(config)),
        Box::new(SortedGrid::new(config)),
        Box::new(SortedGrid::new(config).with_parallel(false)),
        Box::new(NaiveGrid::new(config)),
    ]
}

// ============================================================================
// Equivalence
// ============================================================================

#[test]
fn test_strategies_agree_on_neighbor_sets() {
    for coding in [CellCoding::Morton, CellCoding::Concatenation] {
        let config = GridConfig::new(SCOPE, 16).with_coding(coding);
        let agents = random_flock(3000, 160.0, 42);

        let mut grids = all_strategies(config);
        for grid in grids.iter_mut() {
            grid.build(&agents).unwrap();
        }

        for index in 0..agents.len() {
            let reference = neighbor_set(grids[0].as_ref(), &agents, index);
            for grid in &grids[1..] {
                assert_eq!(
                    neighbor_set(grid.as_ref(), &agents, index),
                    reference,
                    "{:?}/{coding:?} disagrees for agent {index}",
                    grid.strategy()
                );
            }
        }
    }
}

#[test]
fn test_strategies_agree_on_stats() {
    let config = GridConfig::new(SCOPE, 16);
    let agents = random_flock(2000, 160.0, 5);
    let mut linked = LinkedGrid::new(config);
    let mut sorted = SortedGrid::new(config);
    linked.build(&agents).unwrap();
    sorted.build(&agents).unwrap();
    assert_eq!(linked.stats(), sorted.stats());
}

#[test]
fn test_offset_origin() {
    let config = GridConfig::new(SCOPE, 8).with_origin(Vec3::splat(-40.0));
    let agents = random_flock(500, 80.0, 8)
        .into_iter()
        .map(|mut a| {
            a.position -= Vec3::splat(40.0);
            a
        })
        .collect::<Vec<_>>();

    let mut linked = LinkedGrid::new(config);
    let mut sorted = SortedGrid::new(config);
    linked.build(&agents).unwrap();
    sorted.build(&agents).unwrap();
    for index in 0..agents.len() {
        assert_eq!(
            neighbor_set(&linked, &agents, index),
            neighbor_set(&sorted, &agents, index)
        );
    }
}

// ============================================================================
// Completeness and bounds
// ============================================================================

#[test]
fn test_finds_every_agent_within_scope() {
    let config = GridConfig::new(SCOPE, 16);
    let agents = random_flock(1500, 160.0, 7);
    for mut grid in all_strategies(config) {
        grid.build(&agents).unwrap();
        for index in (0..agents.len()).step_by(7) {
            let expected: BTreeSet<usize> = agents
                .iter()
                .enumerate()
                .filter(|&(other, a)| {
                    other != index && a.position.distance(agents[index].position) < SCOPE
                })
                .map(|(other, _)| other)
                .collect();
            assert_eq!(neighbor_set(grid.as_ref(), &agents, index), expected);
        }
    }
}

#[test]
fn test_candidates_stay_inside_block() {
    let config = GridConfig::new(SCOPE, 16);
    let agents = random_flock(1500, 160.0, 9);
    let outer_radius = 2.0 * SCOPE * 3f32.sqrt();
    for mut grid in all_strategies(config) {
        grid.build(&agents).unwrap();
        for agent in agents.iter().step_by(11) {
            grid.visit_candidates(&agents, agent.position, &mut |_, candidate| {
                assert!(candidate.position.distance(agent.position) <= outer_radius);
            });
        }
    }
}

#[test]
fn test_self_is_never_a_neighbor() {
    let config = GridConfig::new(SCOPE, 16);
    let agents = random_flock(400, 40.0, 3);
    for mut grid in all_strategies(config) {
        grid.build(&agents).unwrap();
        for index in 0..agents.len() {
            assert!(!neighbor_set(grid.as_ref(), &agents, index).contains(&index));
        }
    }
}

#[test]
fn test_coincident_agents_see_each_other() {
    let config = GridConfig::new(SCOPE, 16);
    let p = Vec3::new(55.0, 55.0, 55.0);
    let agents = vec![Agent::prey(p, Vec3::X), Agent::prey(p, Vec3::Y)];
    for mut grid in all_strategies(config) {
        grid.build(&agents).unwrap();
        let neighbors = grid.neighbors_of(&agents, 0, SCOPE);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].distance, 0.0);
    }
}

// ============================================================================
// Clear and empty builds
// ============================================================================

#[test]
fn test_clear_is_idempotent() {
    let config = GridConfig::new(SCOPE, 16);
    let agents = random_flock(300, 160.0, 1);
    for mut grid in all_strategies(config) {
        grid.build(&agents).unwrap();
        grid.clear();
        grid.clear();
        for index in 0..agents.len() {
            assert!(grid.neighbors_of(&agents, index, SCOPE).is_empty());
        }
        assert_eq!(grid.stats().occupied_cells, 0);
    }
}

#[test]
fn test_empty_build() {
    let config = GridConfig::new(SCOPE, 16);
    for mut grid in all_strategies(config) {
        grid.build(&[]).unwrap();
        let mut visited = 0;
        grid.visit_candidates(&[], Vec3::splat(50.0), &mut |_, _| visited += 1);
        assert_eq!(visited, 0);
        assert_eq!(grid.stats().agents, 0);
    }
}

#[test]
fn test_rebuild_after_motion() {
    let config = GridConfig::new(SCOPE, 16);
    let mut agents = random_flock(800, 160.0, 12);
    let mut linked = LinkedGrid::new(config);
    let mut sorted = SortedGrid::new(config);
    for _ in 0..5 {
        linked.build(&agents).unwrap();
        sorted.build(&agents).unwrap();
        for index in (0..agents.len()).step_by(5) {
            assert_eq!(
                neighbor_set(&linked, &agents, index),
                neighbor_set(&sorted, &agents, index)
            );
        }
        for agent in agents.iter_mut() {
            agent.position = (agent.position + agent.velocity * 40.0).clamp(Vec3::ZERO, Vec3::splat(159.9));
        }
    }
}

// ============================================================================
// Scale
// ============================================================================

#[test]
fn test_hundred_thousand_agents_have_constant_occupancy() {
    let config = GridConfig::new(SCOPE, 70);
    let agents = random_flock(100_000, 700.0, 2024);
    for mut grid in [
        Box::new(SortedGrid::new(config)) as Box<dyn GridIndex>,
        Box::new(LinkedGrid::new(config)),
    ] {
        grid.build(&agents).unwrap();
        let stats = grid.stats();
        assert_eq!(stats.agents, 100_000);
        // 343k cells for 100k agents: well under one agent per cell on average
        assert!(stats.mean_occupancy() < 4.0, "mean occupancy {}", stats.mean_occupancy());
        assert!(stats.max_occupancy < 32, "max occupancy {}", stats.max_occupancy);
    }
}

//! Headless runner: spawns a flock in a walled room and steps it.

use std::path::PathBuf;
use std::time::Instant;

use boidsim::prelude::*;
use boidsim::StepTimings;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Linked,
    Sorted,
    Naive,
    #[cfg(feature = "gpu")]
    Gpu,
}

impl From<StrategyArg> for GridStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Linked => GridStrategy::LinkedBuckets,
            StrategyArg::Sorted => GridStrategy::Sorted,
            StrategyArg::Naive => GridStrategy::Naive,
            #[cfg(feature = "gpu")]
            StrategyArg::Gpu => GridStrategy::SortedGpu,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodingArg {
    Morton,
    Concatenation,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Additive,
    Tap,
}

#[derive(Parser)]
#[command(name = "boidsim", about = "Run a headless boids simulation")]
struct Args {
    /// JSON config file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    agents: Option<usize>,
    #[arg(short, long)]
    predators: Option<usize>,
    #[arg(short, long, default_value = "1000")]
    steps: u64,
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    #[arg(long, value_enum)]
    coding: Option<CodingArg>,
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    #[arg(long)]
    seed: Option<u64>,
    /// Keep the flock in the z = 0 plane.
    #[arg(long)]
    planar: bool,
    /// Evaluate agents on the calling thread only.
    #[arg(long)]
    sequential: bool,
    /// Sweep a repelling ray through the room.
    #[arg(long)]
    ray: bool,
    /// Log a summary every N steps.
    #[arg(long, default_value = "100")]
    report_every: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(agents) = args.agents {
        config.spawn.count = agents;
    }
    if let Some(predators) = args.predators {
        config.spawn.predators = predators;
    }
    if let Some(strategy) = args.strategy {
        config.grid.strategy = strategy.into();
    }
    if let Some(coding) = args.coding {
        config.grid.coding = match coding {
            CodingArg::Morton => CellCoding::Morton,
            CodingArg::Concatenation => CellCoding::Concatenation,
        };
    }
    if let Some(policy) = args.policy {
        config.composition = match policy {
            PolicyArg::Additive => CompositionPolicy::Additive,
            PolicyArg::Tap => CompositionPolicy::Tap,
        };
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    config.spawn.planar |= args.planar;
    config.parallel &= !args.sequential;

    let mut sim = Simulation::new(config)?;
    let grid = sim.config().grid;
    let mut scene = Scene::room(grid.origin, grid.origin + grid.extent());

    let started = Instant::now();
    let mut totals = StepTimings::default();
    for step in 0..args.steps {
        if args.ray {
            scene.set_user_ray(Some(sweeping_ray(step, grid.origin, grid.extent())));
        }
        let report = sim.step(&scene)?;
        totals.accumulate(&report.timings);

        if args.report_every > 0 && report.frame % args.report_every == 0 {
            info!(
                frame = report.frame,
                alive = report.alive,
                killed = report.killed,
                predators = report.predators_alive,
                occupied_cells = report.grid.occupied_cells,
                max_occupancy = report.grid.max_occupancy,
                mean_occupancy = report.grid.mean_occupancy(),
                build_ms = report.timings.index_build.as_secs_f64() * 1e3,
                query_ms = report.timings.query.as_secs_f64() * 1e3,
                "progress"
            );
        }
    }

    let frames = args.steps.max(1) as f64;
    info!(
        steps = args.steps,
        alive = sim.alive_count(),
        elapsed_s = started.elapsed().as_secs_f64(),
        avg_build_ms = totals.index_build.as_secs_f64() * 1e3 / frames,
        avg_query_ms = totals.query.as_secs_f64() * 1e3 / frames,
        avg_commit_ms = totals.commit.as_secs_f64() * 1e3 / frames,
        "done"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// A ray along +z whose origin circles the room's center.
fn sweeping_ray(step: u64, origin: Vec3, extent: Vec3) -> UserRay {
    let angle = step as f32 * 0.01;
    let center = origin + extent * 0.5;
    let radius = extent.x * 0.25;
    let start = Vec3::new(
        center.x + radius * angle.cos(),
        center.y + radius * angle.sin(),
        origin.z,
    );
    UserRay::new(start, Vec3::Z)
}

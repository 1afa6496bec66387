use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use logoworld_core::{AgentRef, AgentSet, Program, Value, World, WorldConfig};
use logoworld_job::{
    Ask, Block, Carefully, CommandError, Context, Flow, FnCommand, Forward, JobReport, Scheduler,
    SetVariable,
};
use logoworld_storage::{load_world, save_world};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "logoworld",
    version,
    about = "Build, run, export and import LogoWorld agent worlds"
)]
struct Cli {
    /// JSON file holding `world` (a world config) and `program` (variable and breed declarations).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the simulation RNG; overrides the config file.
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Populate a world and run the wandering demo.
    Run {
        #[arg(long, default_value_t = 50)]
        turtles: usize,
        #[arg(long, default_value_t = 100)]
        ticks: u64,
        /// Export the final world to this file.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Populate a world and export it without running.
    Export {
        path: PathBuf,
        #[arg(long, default_value_t = 50)]
        turtles: usize,
    },
    /// Import an exported world, optionally run it further and export it again.
    Import {
        path: PathBuf,
        #[arg(long, default_value_t = 0)]
        ticks: u64,
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    world: WorldConfig,
    program: Option<Program>,
}

impl AppConfig {
    fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.world.rng_seed = Some(seed);
    }
    let mut world = build_world(&config)?;
    let scheduler = Scheduler::new();

    match cli.command {
        Command::Run {
            turtles,
            ticks,
            export,
        } => {
            populate(&mut world, turtles)?;
            run_ticks(&scheduler, &mut world, ticks)?;
            if let Some(path) = export {
                save(&world, &path)?;
            }
        }
        Command::Export { path, turtles } => {
            populate(&mut world, turtles)?;
            save(&world, &path)?;
        }
        Command::Import {
            path,
            ticks,
            export,
        } => {
            let summary = load_world(&mut world, &path)
                .with_context(|| format!("failed to import {}", path.display()))?;
            println!(
                "imported {} turtles, {} patches and {} links",
                summary.turtles, summary.patches, summary.links
            );
            if ticks > 0 {
                if world.ticks().is_none() {
                    world.reset_ticks();
                }
                run_ticks(&scheduler, &mut world, ticks)?;
            }
            if let Some(path) = export {
                save(&world, &path)?;
            }
        }
    }

    println!(
        "ticks {:?}: {} turtles, {} links",
        world.ticks(),
        world.turtle_count(),
        world.link_count()
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn demo_program() -> Program {
    Program::new()
        .with_globals(["starved"])
        .with_turtles_own(["energy"])
        .with_patches_own(["chemical"])
}

fn build_world(config: &AppConfig) -> Result<World> {
    let program = config.program.clone().unwrap_or_else(demo_program);
    World::with_program(config.world.clone(), program).context("failed to build world")
}

/// Scatters `count` turtles with some energy and ties each consecutive pair.
fn populate(world: &mut World, count: usize) -> Result<()> {
    let ids = world.create_turtles(count, "turtles")?;
    let bounds = *world.bounds();
    for &id in &ids {
        let x = world
            .rng()
            .random_range(f64::from(bounds.min_pxcor)..=f64::from(bounds.max_pxcor));
        let y = world
            .rng()
            .random_range(f64::from(bounds.min_pycor)..=f64::from(bounds.max_pycor));
        world.set_xy(id, x, y)?;
        let energy = world.rng().random_range(10.0..40.0);
        if world.variable_index(AgentRef::Turtle(id), "energy").is_ok() {
            world.set_variable(AgentRef::Turtle(id), "energy", Value::Number(energy))?;
        }
    }
    for pair in ids.chunks_exact(2) {
        let link = world.create_link_with(pair[0], pair[1], "links")?;
        world.tie(link)?;
    }
    world.reset_ticks();
    info!(turtles = ids.len(), links = world.link_count(), "world populated");
    Ok(())
}

fn number(value: Value, what: &str) -> Result<f64, CommandError> {
    value.as_number().ok_or_else(|| {
        logoworld_core::AgentError::InvalidOperation(format!("{what} is not a number")).into()
    })
}

/// One tick of the demo: every turtle wiggles, walks, marks its patch and burns
/// energy; turtles that run dry die; the chemical then spreads.
fn demo_step() -> Block {
    let wiggle = FnCommand::new("WIGGLE", |world: &mut World, ctx: &mut Context| {
        let id = ctx.require_turtle("WIGGLE")?;
        let turn = world.rng().random_range(-40.0..=40.0);
        world.right(id, turn)?;
        Ok(Flow::Continue)
    });
    let mark = FnCommand::new("MARK", |world: &mut World, ctx: &mut Context| {
        let id = ctx.require_turtle("MARK")?;
        let patch = AgentRef::Patch(world.turtle(id)?.patch_here());
        let chemical = number(world.variable(patch, "chemical")?, "chemical")?;
        world.set_variable(patch, "chemical", Value::Number(chemical + 10.0))?;
        Ok(Flow::Continue)
    });
    let burn = SetVariable::computed("energy", |world: &World, ctx: &Context| {
        let energy = world.variable(ctx.agent(), "energy")?;
        Ok(Value::Number(energy.as_number().unwrap_or(0.0) - 1.0))
    });
    let starve = FnCommand::new("STARVE", |world: &mut World, ctx: &mut Context| {
        let id = ctx.require_turtle("STARVE")?;
        let energy = number(world.variable(ctx.agent(), "energy")?, "energy")?;
        if energy > 0.0 {
            return Ok(Flow::Continue);
        }
        let starved = number(world.variable(AgentRef::Observer, "starved")?, "starved")?;
        world.set_variable(AgentRef::Observer, "starved", Value::Number(starved + 1.0))?;
        world.die(id)?;
        Ok(Flow::Stop)
    });
    // A missing patch variable only costs the mark, not the turtle's turn.
    let mark_carefully = Carefully::new(
        Block::new().then(mark).shared(),
        Block::new()
            .then(FnCommand::new("REPORT", |_: &mut World, ctx: &mut Context| {
                warn!(message = ctx.error_message().unwrap_or_default(), "mark skipped");
                Ok(Flow::Continue)
            }))
            .shared(),
    );
    let turtle_step = Block::new()
        .then(wiggle)
        .then(Forward(1.0))
        .then(mark_carefully)
        .then(burn)
        .then(starve)
        .shared();

    Block::new()
        .then(Ask::new(AgentSet::Turtles, turtle_step))
        .then(FnCommand::new("DIFFUSE", |world: &mut World, _: &mut Context| {
            world.diffuse("chemical", 0.5)?;
            Ok(Flow::Continue)
        }))
}

fn run_ticks(scheduler: &Scheduler, world: &mut World, ticks: u64) -> Result<()> {
    if world.schema().turtles("TURTLES").and_then(|layout| layout.index_of("energy")).is_none()
        || world.schema().patches().index_of("chemical").is_none()
        || world.schema().globals().index_of("starved").is_none()
    {
        bail!("the demo needs turtles-own energy, patches-own chemical and a starved global");
    }
    let step = demo_step();
    for _ in 0..ticks {
        if let Some(report) = scheduler.run_top_level(world, &step)? {
            report_job(&report);
            if report.halted {
                break;
            }
        }
        world.tick()?;
        if world.turtle_count() == 0 {
            info!(ticks = ?world.ticks(), "every turtle has starved");
            break;
        }
    }
    Ok(())
}

fn report_job(report: &JobReport) {
    if report.halted {
        warn!("demo halted");
    } else {
        warn!(%report, "demo step stopped early");
    }
}

fn save(world: &World, path: &Path) -> Result<()> {
    save_world(world, path).with_context(|| format!("failed to export {}", path.display()))?;
    println!("exported to {}", path.display());
    Ok(())
}

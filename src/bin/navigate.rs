//! Simulated PiCar navigation run
//!
//! Usage:
//!   cargo run --bin navigate -- --goal 0,100 --wall=-10,40:10,40
//!   cargo run --bin navigate -- --config picar.toml --goal 50,50 --plot run.png

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use picar_navigation::common::{Coordinate, Direction, NavigationError, NavigationResult, VehiclePose};
use picar_navigation::config::NavigationConfig;
use picar_navigation::mission_planning::Navigator;
use picar_navigation::simulation::{SimulatedCar, WallSpec};
use picar_navigation::utils::visualization::quick_plot_navigation;

/// Drive a simulated PiCar to a goal through an obstacle world
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start cell as x,y
    #[arg(short, long, default_value = "0,0", allow_hyphen_values = true)]
    start: Coordinate,

    /// Initial heading (north, northeast, east, ...)
    #[arg(long, default_value = "north", value_parser = parse_heading)]
    heading: Direction,

    /// Goal cell as x,y
    #[arg(short, long, allow_hyphen_values = true)]
    goal: Coordinate,

    /// Extra wall as x1,y1:x2,y2, may be repeated
    #[arg(short, long = "wall", value_parser = parse_wall, allow_hyphen_values = true)]
    walls: Vec<WallSpec>,

    /// Standard deviation of simulated range noise in cm
    #[arg(long)]
    noise: Option<f64>,

    /// Save a plot of the run to this PNG file
    #[arg(long)]
    plot: Option<String>,

    /// Dump the final occupancy grid to this file
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn parse_heading(s: &str) -> Result<Direction, String> {
    Direction::ALL
        .iter()
        .copied()
        .find(|d| d.name() == s.to_lowercase())
        .ok_or_else(|| format!("unknown heading '{}'", s))
}

fn parse_wall(s: &str) -> Result<WallSpec, String> {
    let (from, to) = s
        .split_once(':')
        .ok_or_else(|| format!("expected x1,y1:x2,y2, got '{}'", s))?;
    Ok(WallSpec { from: from.parse()?, to: to.parse()? })
}

fn main() -> NavigationResult<()> {
    let directive: Directive = "picar_navigation=info"
        .parse()
        .map_err(|e| NavigationError::Config(format!("log directive: {}", e)))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            NavigationConfig::load(path)?
        }
        None => {
            info!("Using default configuration");
            NavigationConfig::default()
        }
    };
    config.simulation.walls.extend(args.walls.iter().copied());
    if let Some(noise) = args.noise {
        config.simulation.noise_std_cm = noise;
    }

    let start = VehiclePose::new(args.start, args.heading);
    let sim = SimulatedCar::new(start, config.calibration(), config.simulation.clone())?;
    let mut navigator = Navigator::from_config(sim, start, &config)?;
    let result = navigator.navigate(args.goal);

    if let Some(path) = &args.snapshot {
        navigator.write_map_snapshot(BufWriter::new(File::create(path)?))?;
        info!("Map snapshot written to {:?}", path);
    }

    if let Some(path) = &args.plot {
        let sim = navigator.car().hardware();
        let mut world: Vec<Coordinate> = sim.obstacles().iter().copied().collect();
        world.sort();
        let mut vis = quick_plot_navigation(
            navigator.grid(),
            navigator.last_path(),
            sim.trajectory(),
            args.start,
            args.goal,
            "PiCar navigation",
        );
        vis.plot_world(&world);
        vis.plot_vehicle(&navigator.car().pose(), 1.5);
        vis.save_png(path, 800, 800)?;
        info!("Plot saved to {}", path);
    }

    let report = result?;
    info!(
        "Reached {} (goal {}) in {} cycles, {:.1}cm traveled, {} simulated collisions",
        report.final_pose.location,
        report.goal,
        report.cycles,
        report.distance_traveled,
        navigator.car().hardware().collisions()
    );
    Ok(())
}

use std::path::PathBuf;

use clap::Parser;

mod app;
mod sim;
mod tracker;

use app::{App, Options, RunMode};

#[derive(Parser)]
#[command(name = "gazex")]
#[command(about = "Gaze-contingent calibration and fuse test, headless", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Routine to run
    #[arg(short, long, value_enum, default_value_t = RunMode::Fuse)]
    mode: RunMode,

    /// Tick rate of the frame loop (Hz)
    #[arg(long, default_value_t = 90.0)]
    rate: f64,

    /// Byte-stream device receiving reward commands
    #[arg(long, value_name = "PATH")]
    reward_device: Option<PathBuf>,

    /// Probability the simulated subject looks at a given target
    #[arg(long, default_value_t = 0.8)]
    hit_rate: f64,

    /// Seed for the trial order and simulated gaze
    #[arg(long)]
    seed: Option<u64>,

    /// Advance only on operator input from stdin
    #[arg(long)]
    manual: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let app = App::new(Options {
        config: cli.config,
        mode: cli.mode,
        rate_hz: cli.rate,
        reward_device: cli.reward_device,
        hit_rate: cli.hit_rate,
        seed: cli.seed,
        manual: cli.manual,
    })?;
    app.run()?;

    Ok(())
}

use std::fs::OpenOptions;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use gazex_core::SessionMode;
use gazex_experiment::{Command, ExperimentConfig, ExperimentEvent, RewardSignaler, TrialStateMachine};
use gazex_timing::{HighPrecisionTimer, Timer};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sim::SimulatedGaze;
use crate::tracker::{OfflineLink, ReferenceRecorder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    Calibrate,
    Fuse,
}

pub struct Options {
    pub config: Option<PathBuf>,
    pub mode: RunMode,
    pub rate_hz: f64,
    pub reward_device: Option<PathBuf>,
    pub hit_rate: f64,
    pub seed: Option<u64>,
    pub manual: bool,
}

pub struct App {
    experiment: TrialStateMachine<HighPrecisionTimer, StdRng>,
    gaze: SimulatedGaze,
    mode: RunMode,
    frame_period: Duration,
    triggers: Option<Receiver<Command>>,
}

impl App {
    pub fn new(opts: Options) -> Result<Self> {
        let frame_period = Duration::try_from_secs_f64(1.0 / opts.rate_hz)
            .with_context(|| format!("tick rate {} Hz gives no usable frame period", opts.rate_hz))?;
        if !(0.0..=1.0).contains(&opts.hit_rate) {
            bail!("hit rate must be within [0, 1], got {}", opts.hit_rate);
        }

        let mut config = match &opts.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if opts.manual {
            config.auto_advance = false;
        }

        let mut seeds = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let gaze = SimulatedGaze::new(opts.hit_rate, StdRng::seed_from_u64(seeds.random()));
        let rng = StdRng::seed_from_u64(seeds.random());

        let reward = match &opts.reward_device {
            Some(path) => {
                let device = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .with_context(|| format!("opening reward device {}", path.display()))?;
                RewardSignaler::new(device)
            }
            None => RewardSignaler::disconnected(),
        };
        let reference_path = config.session.base_dir.join("reference_data.json");

        let experiment = TrialStateMachine::builder()
            .config(config)
            .targets_from_config()
            .gaze(gaze.clone())
            .tracker_link(OfflineLink { offset_s: 0.0 })
            .protocol(ReferenceRecorder::new(reference_path))
            .reward(reward)
            .timer(HighPrecisionTimer::new())
            .rng(rng)
            .build()
            .context("building the trial controller")?;

        let triggers = opts.manual.then(spawn_trigger_reader);

        Ok(Self {
            experiment,
            gaze,
            mode: opts.mode,
            frame_period,
            triggers,
        })
    }

    pub fn run(mut self) -> Result<()> {
        println!("=== GAZE FUSION EXPERIMENT ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Run number: {}", self.experiment.run_number());
        if self.triggers.is_some() {
            println!("Manual mode: press ENTER to advance, q + ENTER to stop.\n");
        }

        let start = match self.mode {
            RunMode::Calibrate => Command::StartCalibration,
            RunMode::Fuse => Command::StartFuseTest,
        };
        let events = self.experiment.handle_command(start);
        self.dispatch(&events);
        if !self.experiment.mode().is_active() {
            bail!("{:?} did not start", self.mode);
        }

        loop {
            let frame_start = self.experiment.timer().now();

            if self.poll_triggers() {
                break;
            }

            self.gaze.follow(
                self.experiment.target_position().xy(),
                self.experiment.thresholds(),
            );
            let events = self.experiment.tick();
            let finished = self.dispatch(&events);

            let elapsed = self.experiment.timer().elapsed_since(frame_start);
            let timer = self.experiment.timer_mut();
            timer.record_frame(Duration::from_secs_f64(elapsed));

            if finished {
                break;
            }
            if let Some(rest) = self.frame_period.checked_sub(Duration::from_secs_f64(elapsed)) {
                timer.sleep(rest);
            }
        }

        self.report();
        Ok(())
    }

    /// Returns true once the requested routine has finished.
    fn dispatch(&mut self, events: &[ExperimentEvent]) -> bool {
        let mut finished = false;
        for event in events {
            match event {
                ExperimentEvent::CalibrationStarted
                | ExperimentEvent::TargetAdvanced { .. }
                | ExperimentEvent::TrialStarted { .. } => {
                    self.gaze.new_presentation();
                    debug!(
                        "marker at {:?}, size {:.3}",
                        self.experiment.target_position(),
                        self.experiment.marker_size()
                    );
                }
                ExperimentEvent::CalibrationRoutineDone | ExperimentEvent::FuseTestComplete => {
                    finished = true;
                }
                ExperimentEvent::CalibrationSucceeded => info!("tracker accepted calibration"),
                ExperimentEvent::CalibrationFailed => warn!("tracker rejected calibration"),
                ExperimentEvent::SessionSaved(path) => info!("session saved to {}", path.display()),
                ExperimentEvent::SessionSaveFailed(e) => warn!("session not saved: {e}"),
                _ => {}
            }
        }
        finished
    }

    /// Forwards manual triggers; returns true if the operator asked to quit.
    fn poll_triggers(&mut self) -> bool {
        let Some(rx) = &self.triggers else {
            return false;
        };
        let mut commands = Vec::new();
        let closed = loop {
            match rx.try_recv() {
                Ok(command) => commands.push(command),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if closed {
            self.triggers = None;
        }

        let mut quit = false;
        for command in commands {
            let command = match (command, self.experiment.mode()) {
                (Command::StopFuseTest, SessionMode::Calibrating) => Command::StopCalibration,
                (c, _) => c,
            };
            let events = self.experiment.handle_command(command);
            quit |= self.dispatch(&events);
        }
        quit
    }

    fn report(&self) {
        let stats = self.experiment.timer().frame_stats();
        println!("\nSession finished.");
        println!(
            "Correct: {} of {} presentations",
            self.experiment.num_correct(),
            self.experiment.trial_number() + 1
        );
        println!("Frame timing:");
        println!("  Frames: {}", stats.frames);
        println!("  Average: {:.3}ms", stats.average_frame_time_ns / 1e6);
        println!("  Jitter: {:.3}ms", stats.jitter_ns / 1e6);
        println!(
            "  Min/Max: {:.3}ms / {:.3}ms",
            stats.min_frame_time_ns / 1e6,
            stats.max_frame_time_ns / 1e6
        );
    }
}

/// Reads operator lines from stdin: empty advances, `q` stops.
fn spawn_trigger_reader() -> Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "q" | "quit" => Command::StopFuseTest,
                _ => Command::Advance,
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(rate_hz: f64, hit_rate: f64) -> Options {
        Options {
            config: None,
            mode: RunMode::Fuse,
            rate_hz,
            reward_device: None,
            hit_rate,
            seed: Some(1),
            manual: false,
        }
    }

    #[test]
    fn unusable_tick_rates_are_rejected() {
        for rate in [1e-20, 0.0, -60.0, f64::NAN] {
            assert!(App::new(options(rate, 0.5)).is_err(), "rate {rate}");
        }
    }

    #[test]
    fn hit_rate_outside_unit_interval_is_rejected() {
        for hit_rate in [f64::NAN, -0.1, 1.5] {
            assert!(App::new(options(90.0, hit_rate)).is_err(), "hit rate {hit_rate}");
        }
    }
}

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::rc::Rc;

use gazex_core::{GazeSource, Vec2};
use gazex_experiment::{
    CalibrationProtocol, CalibrationSettings, ExperimentConfig, ExperimentEvent, ProtocolEvent,
    RewardSignaler, TrackerLink, TrialStateMachine,
};
use gazex_timing::ManualTimer;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

pub type Machine = TrialStateMachine<ManualTimer, StdRng>;

#[derive(Clone, Default)]
pub struct SharedGaze(pub Rc<Cell<Vec2>>);

impl SharedGaze {
    pub fn set(&self, p: Vec2) {
        self.0.set(p);
    }
}

impl GazeSource for SharedGaze {
    fn position(&self) -> Vec2 {
        self.0.get()
    }
}

#[derive(Clone)]
pub struct FakeLink {
    pub connected: Rc<Cell<bool>>,
}

impl TrackerLink for FakeLink {
    fn is_connected(&self) -> bool {
        self.connected.get()
    }
    fn to_tracker_time(&self, local_s: f64) -> f64 {
        local_s + 1000.0
    }
}

#[derive(Debug, Default)]
pub struct ProtocolLog {
    pub started: usize,
    pub stopped: usize,
    pub sends: usize,
    pub samples: Vec<([f32; 3], f64)>,
    pub settings: Option<CalibrationSettings>,
    pub pending: Vec<ProtocolEvent>,
    /// Queued as the routine stops, like a tracker settling its result.
    pub result_on_stop: Option<ProtocolEvent>,
}

#[derive(Clone, Default)]
pub struct RecordingProtocol(pub Rc<RefCell<ProtocolLog>>);

impl CalibrationProtocol for RecordingProtocol {
    fn start(&mut self, settings: &CalibrationSettings, link: &dyn TrackerLink) {
        assert!(link.is_connected());
        let mut log = self.0.borrow_mut();
        log.started += 1;
        log.settings = Some(settings.clone());
    }
    fn stop(&mut self) {
        let mut log = self.0.borrow_mut();
        log.stopped += 1;
        if let Some(result) = log.result_on_stop {
            log.pending.push(result);
        }
    }
    fn add_reference_position(&mut self, position: [f32; 3], tracker_time: f64) {
        self.0.borrow_mut().samples.push((position, tracker_time));
    }
    fn send_reference_data(&mut self) {
        self.0.borrow_mut().sends += 1;
    }
    fn poll_event(&mut self) -> Option<ProtocolEvent> {
        self.0.borrow_mut().pending.pop()
    }
}

#[derive(Clone, Default)]
pub struct SharedSink(pub Rc<RefCell<Vec<u8>>>);

impl SharedSink {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Rig {
    pub machine: Machine,
    pub timer: ManualTimer,
    pub gaze: SharedGaze,
    pub connected: Rc<Cell<bool>>,
    pub protocol: Rc<RefCell<ProtocolLog>>,
    pub sink: SharedSink,
    pub dir: TempDir,
}

/// Small, fast timings with the session directory in a temp dir.
pub fn test_config() -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.presentation_time_s = 1.0;
    config.grace_period_s = 0.1;
    config.required_fixation_s = 0.5;
    config.inter_trial_interval_s = 0.5;
    config.reward_duration_s = 0.2;
    config.trials_per_target = 2;
    config.tracker.sample_rate_hz = 100.0;
    config.tracker.aspect_ratio = 2.0;
    config.session.subject = "tester".into();
    config
}

pub fn rig(mut config: ExperimentConfig, seed: u64) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    config.session.base_dir = dir.path().to_path_buf();

    let timer = ManualTimer::new();
    let gaze = SharedGaze::default();
    let connected = Rc::new(Cell::new(true));
    let protocol = RecordingProtocol::default();
    let sink = SharedSink::default();

    let machine = TrialStateMachine::builder()
        .config(config)
        .targets_from_config()
        .gaze(gaze.clone())
        .tracker_link(FakeLink {
            connected: connected.clone(),
        })
        .protocol(protocol.clone())
        .reward(RewardSignaler::new(sink.clone()))
        .timer(timer.clone())
        .rng(StdRng::seed_from_u64(seed))
        .build()
        .unwrap();

    Rig {
        machine,
        timer,
        gaze,
        connected,
        protocol: protocol.0,
        sink,
        dir,
    }
}

impl Rig {
    pub fn look_at_target(&self) {
        self.gaze.set(self.machine.target_position().xy());
    }

    pub fn look_away(&self) {
        self.gaze.set(Vec2::new(50.0, 50.0));
    }

    /// Advances the clock by `dt` and runs one tick.
    pub fn step(&mut self, dt: f64) -> Vec<ExperimentEvent> {
        self.timer.advance_secs(dt);
        self.machine.tick()
    }

    /// Ticks until `pred` matches an event, returning everything seen.
    pub fn run_until(
        &mut self,
        dt: f64,
        max_ticks: usize,
        follow_target: bool,
        pred: impl Fn(&ExperimentEvent) -> bool,
    ) -> Vec<ExperimentEvent> {
        let mut seen = Vec::new();
        for _ in 0..max_ticks {
            if follow_target {
                self.look_at_target();
            }
            let events = self.step(dt);
            let done = events.iter().any(&pred);
            seen.extend(events);
            if done {
                return seen;
            }
        }
        panic!("condition not reached after {max_ticks} ticks; saw {seen:?}");
    }
}

pub fn count(events: &[ExperimentEvent], pred: impl Fn(&ExperimentEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

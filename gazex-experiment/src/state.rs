use std::path::PathBuf;

use gazex_core::{
    EyeMode, GazeSource, RewardOutcome, SessionMode, TargetCatalog, Trial, TrialRecord, Vec3,
};
use gazex_timing::Timer;
use log::{debug, error, info, warn};
use rand::Rng;

use super::config::ExperimentConfig;
use super::error::{ExperimentError, Result};
use super::fixation::{DwellAccumulator, FixationWindow};
use super::logger::{RunCounter, SessionFile, TrialLogger};
use super::reward::RewardSignaler;
use super::sequence::TrialSequenceGenerator;
use super::tracker::{CalibrationProtocol, CalibrationSettings, ProtocolEvent, TrackerLink};
use super::trial::{TrialDurations, TrialTimestamps};

/// External requests to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartCalibration,
    StopCalibration,
    ToggleCalibration,
    StartFuseTest,
    StopFuseTest,
    ToggleFuseTest,
    /// Manual trigger for the next target or trial
    Advance,
}

/// Notifications returned from commands and ticks
#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    CalibrationStarted,
    CalibrationRoutineDone,
    CalibrationSucceeded,
    CalibrationFailed,
    FuseTestStarted,
    FuseTestComplete,
    TargetAdvanced { target: usize },
    TrialStarted { trial: usize, target: usize, eye: EyeMode },
    TrialCompleted { trial: usize, rewarded: bool },
    RewardSignaled { outcome: RewardOutcome },
    SessionSaved(PathBuf),
    SessionSaveFailed(String),
}

/// Mode-aware trial controller, re-entered once per frame through [`tick`].
///
/// [`tick`]: TrialStateMachine::tick
pub struct TrialStateMachine<T, R>
where
    T: Timer,
    R: Rng,
{
    config: ExperimentConfig,
    durations: TrialDurations,
    window: FixationWindow,
    settings: CalibrationSettings,
    generator: TrialSequenceGenerator,

    calibration_targets: Box<dyn TargetCatalog>,
    fuse_targets: Box<dyn TargetCatalog>,
    gaze: Box<dyn GazeSource>,
    link: Box<dyn TrackerLink>,
    protocol: Box<dyn CalibrationProtocol>,
    reward: RewardSignaler,
    logger: TrialLogger,
    session_file: SessionFile,
    run_counter: RunCounter,
    timer: T,
    rng: R,

    mode: SessionMode,
    scale: f32,
    target_index: usize,
    local_target: Vec3,
    trial_number: usize,
    num_correct: usize,
    dwell: DwellAccumulator,
    timestamps: TrialTimestamps,
    auto_index: usize,
    target_sample_count: usize,
    /// Presentation window of the active target is still open
    presenting: bool,
    advance_pending: bool,
    reward_outcome: Option<RewardOutcome>,
    sequence: Vec<Trial>,
    active_eye: Option<EyeMode>,
    marker_visible: bool,
    gaze_in_window: bool,
}

impl<T, R> TrialStateMachine<T, R>
where
    T: Timer,
    R: Rng,
{
    pub fn builder() -> StateMachineBuilder<T, R> {
        StateMachineBuilder::default()
    }

    pub fn handle_command(&mut self, command: Command) -> Vec<ExperimentEvent> {
        match command {
            Command::StartCalibration => self.start_calibration(),
            Command::StopCalibration => self.stop_calibration(),
            Command::ToggleCalibration => {
                if self.mode.is_calibrating() {
                    self.stop_calibration()
                } else {
                    self.start_calibration()
                }
            }
            Command::StartFuseTest => self.start_fuse_test(),
            Command::StopFuseTest => self.stop_fuse_test(),
            Command::ToggleFuseTest => {
                if self.mode.is_testing() {
                    self.stop_fuse_test()
                } else {
                    self.start_fuse_test()
                }
            }
            Command::Advance => {
                if self.mode.is_active() {
                    self.advance_pending = true;
                } else {
                    info!("Nothing to advance.");
                }
                Vec::new()
            }
        }
    }

    /// Runs one frame: polls tracker notifications, classifies the gaze
    /// sample and steps the active routine.
    pub fn tick(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        let now = self.timer.now();
        self.timestamps.observe_tick(now);

        self.drain_protocol_events(&mut events);

        let gaze = self.gaze.position();
        self.gaze_in_window = self
            .window
            .contains(gaze, self.target_position().xy(), self.scale);

        match self.mode {
            SessionMode::Calibrating => self.update_calibration(now, &mut events),
            SessionMode::Testing => self.update_fuse_test(now, &mut events),
            SessionMode::Idle | SessionMode::FixatingPause => {}
        }

        events
    }

    pub fn start_calibration(&mut self) -> Vec<ExperimentEvent> {
        if !self.mode.is_resting() {
            warn!("Cannot start calibration while {:?}", self.mode);
            return Vec::new();
        }
        if !self.link.is_connected() {
            warn!("Calibration not possible: not connected!");
            return Vec::new();
        }

        info!("Starting Calibration");
        let now = self.timer.now();
        self.reset_session(now);
        self.mode = SessionMode::Calibrating;
        self.scale = self.config.calibration_scale;
        self.select_target(self.calibration_targets.central_index());
        self.presenting = true;
        self.marker_visible = true;

        self.protocol.start(&self.settings, self.link.as_ref());
        info!("Sample Rate: {}", self.settings.sample_rate_hz);

        vec![ExperimentEvent::CalibrationStarted]
    }

    pub fn stop_calibration(&mut self) -> Vec<ExperimentEvent> {
        if !self.mode.is_calibrating() {
            info!("Nothing to stop.");
            return Vec::new();
        }

        info!("Stopping Calibration");
        self.protocol.stop();
        let now = self.timer.now();
        self.halt(now);
        self.mode = SessionMode::FixatingPause;
        self.scale = 1.0;
        self.select_target(self.calibration_targets.central_index());

        // The tracker may settle the routine as it stops.
        let mut events = vec![ExperimentEvent::CalibrationRoutineDone];
        self.drain_protocol_events(&mut events);
        events
    }

    pub fn start_fuse_test(&mut self) -> Vec<ExperimentEvent> {
        if !self.mode.is_resting() {
            warn!("Cannot start fuse test while {:?}", self.mode);
            return Vec::new();
        }

        info!("Starting Fuse Test.");
        let now = self.timer.now();
        self.reset_session(now);
        self.logger.clear();
        self.sequence = self.generator.generate(&mut self.rng);
        self.mode = SessionMode::Testing;
        self.scale = 1.0;

        let mut events = vec![ExperimentEvent::FuseTestStarted];
        self.start_trial(0, now, &mut events);
        events
    }

    /// Ends the fuse test and writes the session log. Safe mid-trial: the
    /// unfinished trial is dropped, not logged.
    pub fn stop_fuse_test(&mut self) -> Vec<ExperimentEvent> {
        if !self.mode.is_testing() {
            info!("Nothing to stop.");
            return Vec::new();
        }

        info!("Stopping Fuse Test.");
        let now = self.timer.now();
        self.halt(now);
        self.mode = SessionMode::Idle;

        let mut events = vec![ExperimentEvent::FuseTestComplete];
        events.push(self.save_session());
        events
    }

    fn update_calibration(&mut self, now: f64, events: &mut Vec<ExperimentEvent>) {
        let eps = self.timestamps.epsilon();

        // One sample per tracker period, not per frame.
        if now - self.dwell.last_sample() < self.settings.sample_period() - eps {
            return;
        }
        if self.timestamps.since_target_change(now) < self.durations.grace_s - eps {
            self.dwell.skip(now);
            return;
        }

        self.dwell.sample(now, self.gaze_in_window && self.presenting);
        self.add_reference_sample(now);
        self.target_sample_count += 1;

        if self.timestamps.since_target_change(now) < self.durations.presentation_s - eps {
            return;
        }

        // Checked on every sample past the window until it pays out once;
        // dwell is cleared after each check regardless of the result.
        if self.reward_outcome.is_none() && self.dwell.satisfies(self.durations.required_fixation_s) {
            self.pay_reward(events);
        }
        self.dwell.clear();

        if self.presenting {
            self.presenting = false;
            self.marker_visible = false;
            if self.config.auto_advance {
                self.timestamps.inter_trial_start = now;
            }
        }

        if self.config.auto_advance && self.inter_trial_elapsed(now) {
            self.advance_pending = true;
        }

        if self.advance_pending {
            // The routine opens on the central target, so `order[0]` is
            // never visited; advances walk `order[1..]`.
            if self.auto_index + 1 < self.config.calibration_order.len() {
                self.auto_index += 1;
                let next = self.config.calibration_order[self.auto_index];
                self.advance_calibration_target(next, now, events);
            } else {
                events.extend(self.stop_calibration());
            }
        }
    }

    fn advance_calibration_target(
        &mut self,
        target: usize,
        now: f64,
        events: &mut Vec<ExperimentEvent>,
    ) {
        self.protocol.send_reference_data();
        debug!(
            "sent {} reference samples for target {}",
            self.target_sample_count, self.target_index
        );

        self.select_target(target);
        self.timestamps.target_change = now;
        self.timestamps.inter_trial_start = now;
        self.dwell.reset(now);
        self.target_sample_count = 0;
        self.trial_number += 1;
        self.presenting = true;
        self.marker_visible = true;
        self.advance_pending = false;
        self.reward_outcome = None;

        debug!("calibration target {} (step {})", target, self.auto_index);
        events.push(ExperimentEvent::TargetAdvanced { target });
    }

    fn update_fuse_test(&mut self, now: f64, events: &mut Vec<ExperimentEvent>) {
        let eps = self.timestamps.epsilon();
        let elapsed = self.timestamps.since_target_change(now);

        if self.presenting {
            if elapsed < self.durations.grace_s - eps {
                self.dwell.skip(now);
            } else {
                // Time past the window edge is never credited.
                let window_end = self.timestamps.target_change + self.durations.presentation_s;
                self.dwell.sample(now.min(window_end), self.gaze_in_window);
            }
            if elapsed < self.durations.presentation_s - eps {
                return;
            }

            // Evaluated once, on the tick that closes the presentation window.
            self.presenting = false;
            self.complete_trial(events);
            self.dwell.clear();
            self.active_eye = None;
            self.marker_visible = false;
            if self.config.auto_advance {
                self.timestamps.inter_trial_start = now;
            }
        }

        if self.config.auto_advance && self.inter_trial_elapsed(now) {
            self.advance_pending = true;
        }

        if self.advance_pending {
            let next = self.trial_number + 1;
            if next < self.sequence.len() {
                self.start_trial(next, now, events);
            } else {
                events.extend(self.stop_fuse_test());
            }
        }
    }

    fn start_trial(&mut self, index: usize, now: f64, events: &mut Vec<ExperimentEvent>) {
        let Some(trial) = self.sequence.get(index) else {
            error!("trial {index} is outside the generated sequence");
            return;
        };
        let (target, eye) = (trial.target, trial.eye);

        self.trial_number = index;
        self.select_target(target);
        self.active_eye = Some(eye);
        self.timestamps.target_change = now;
        self.timestamps.inter_trial_start = now;
        self.dwell.reset(now);
        self.presenting = true;
        self.marker_visible = true;
        self.advance_pending = false;
        self.reward_outcome = None;

        debug!("trial {index} started: target {target}, {eye:?}");
        events.push(ExperimentEvent::TrialStarted {
            trial: index,
            target,
            eye,
        });
    }

    fn complete_trial(&mut self, events: &mut Vec<ExperimentEvent>) {
        let total = self.dwell.total();
        let outcome = if self.dwell.satisfies(self.durations.required_fixation_s) {
            self.pay_reward(events)
        } else {
            RewardOutcome::NotEarned
        };

        let number = self.trial_number;
        let Some(trial) = self.sequence.get_mut(number) else {
            return;
        };
        trial.outcome = Some(outcome);
        let record = TrialRecord::from(&*trial);
        self.logger.record(record);

        info!("trial {number} complete");
        info!(
            "Total Time: {:.3}, Target Time: {:.3}",
            total, self.durations.required_fixation_s
        );
        events.push(ExperimentEvent::TrialCompleted {
            trial: number,
            rewarded: outcome.rewarded(),
        });
    }

    fn pay_reward(&mut self, events: &mut Vec<ExperimentEvent>) -> RewardOutcome {
        let outcome = self.reward.signal(self.durations.reward_s);
        self.reward_outcome = Some(outcome);
        self.num_correct += 1;
        events.push(ExperimentEvent::RewardSignaled { outcome });
        outcome
    }

    fn drain_protocol_events(&mut self, events: &mut Vec<ExperimentEvent>) {
        while let Some(event) = self.protocol.poll_event() {
            events.push(match event {
                ProtocolEvent::Succeeded => ExperimentEvent::CalibrationSucceeded,
                ProtocolEvent::Failed => ExperimentEvent::CalibrationFailed,
            });
        }
    }

    fn inter_trial_elapsed(&self, now: f64) -> bool {
        self.timestamps.since_inter_trial_start(now)
            >= self.durations.inter_trial_s - self.timestamps.epsilon()
    }

    fn add_reference_sample(&mut self, now: f64) {
        let position = self.settings.reference_position(self.local_target.to_array());
        let tracker_time = self.link.to_tracker_time(now);
        self.protocol.add_reference_position(position, tracker_time);
    }

    fn select_target(&mut self, index: usize) {
        let catalog = if self.mode.is_testing() {
            &self.fuse_targets
        } else {
            &self.calibration_targets
        };
        match catalog.position_at(index) {
            Some(position) => {
                self.target_index = index;
                self.local_target = position;
            }
            None => warn!(
                "target {index} not in catalog of {}, keeping {}",
                catalog.count(),
                self.target_index
            ),
        }
    }

    /// Full reset of per-session counters; nothing carries over to a restart.
    fn reset_session(&mut self, now: f64) {
        self.trial_number = 0;
        self.num_correct = 0;
        self.auto_index = 0;
        self.target_sample_count = 0;
        self.timestamps = TrialTimestamps::starting_at(now);
        self.halt(now);
    }

    /// Ends the active presentation; counters stay readable until the next start.
    fn halt(&mut self, now: f64) {
        self.dwell.reset(now);
        self.presenting = false;
        self.advance_pending = false;
        self.reward_outcome = None;
        self.active_eye = None;
        self.marker_visible = false;
    }

    fn save_session(&mut self) -> ExperimentEvent {
        let path = self
            .session_file
            .path_today(self.run_counter.fusion_run_number);

        match self.logger.flush(&path) {
            Ok(_) => {
                self.run_counter.increment();
                let state_path = self.config.session.run_state_path();
                if let Err(e) = self.run_counter.save(&state_path) {
                    error!(
                        "could not persist run number to {}: {e}",
                        state_path.display()
                    );
                }
                ExperimentEvent::SessionSaved(path)
            }
            Err(e) => {
                error!("could not save session log to {}: {e}", path.display());
                ExperimentEvent::SessionSaveFailed(e.to_string())
            }
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn target_index(&self) -> usize {
        self.target_index
    }

    /// Active target position with the zoom scale applied.
    pub fn target_position(&self) -> Vec3 {
        self.local_target * self.scale
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn thresholds(&self) -> (f32, f32) {
        self.window.thresholds(self.scale)
    }

    pub fn trial_number(&self) -> usize {
        self.trial_number
    }

    pub fn accumulated_dwell(&self) -> f64 {
        self.dwell.total()
    }

    pub fn num_correct(&self) -> usize {
        self.num_correct
    }

    pub fn target_sample_count(&self) -> usize {
        self.target_sample_count
    }

    /// Eye-mode of the running trial; `None` between trials and outside the fuse test.
    pub fn active_eye(&self) -> Option<EyeMode> {
        self.active_eye
    }

    pub fn left_masked(&self) -> bool {
        self.active_eye.is_some_and(|e| e.masks_left())
    }

    pub fn right_masked(&self) -> bool {
        self.active_eye.is_some_and(|e| e.masks_right())
    }

    /// Marker size with the zoom scale applied.
    pub fn marker_size(&self) -> f32 {
        self.config.marker_size * self.scale
    }

    pub fn marker_visible(&self) -> bool {
        self.marker_visible
    }

    pub fn gaze_in_window(&self) -> bool {
        self.gaze_in_window
    }

    pub fn is_presenting(&self) -> bool {
        self.presenting
    }

    pub fn sequence(&self) -> &[Trial] {
        &self.sequence
    }

    pub fn logger(&self) -> &TrialLogger {
        &self.logger
    }

    pub fn run_number(&self) -> u32 {
        self.run_counter.fusion_run_number
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

/// Collects the controller's collaborators; [`build`] refuses to produce a
/// controller with any required one missing.
///
/// [`build`]: StateMachineBuilder::build
pub struct StateMachineBuilder<T, R> {
    config: Option<ExperimentConfig>,
    calibration_targets: Option<Box<dyn TargetCatalog>>,
    fuse_targets: Option<Box<dyn TargetCatalog>>,
    gaze: Option<Box<dyn GazeSource>>,
    link: Option<Box<dyn TrackerLink>>,
    protocol: Option<Box<dyn CalibrationProtocol>>,
    reward: Option<RewardSignaler>,
    timer: Option<T>,
    rng: Option<R>,
}

impl<T, R> Default for StateMachineBuilder<T, R> {
    fn default() -> Self {
        Self {
            config: None,
            calibration_targets: None,
            fuse_targets: None,
            gaze: None,
            link: None,
            protocol: None,
            reward: None,
            timer: None,
            rng: None,
        }
    }
}

impl<T, R> StateMachineBuilder<T, R>
where
    T: Timer,
    R: Rng,
{
    pub fn config(mut self, config: ExperimentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses the target sets listed in the configuration for both catalogs.
    pub fn targets_from_config(mut self) -> Self {
        if let Some(config) = &self.config {
            self.calibration_targets = Some(Box::new(config.targets.calibration_catalog()));
            self.fuse_targets = Some(Box::new(config.targets.fuse_test_catalog()));
        }
        self
    }

    pub fn calibration_targets(mut self, catalog: impl TargetCatalog + 'static) -> Self {
        self.calibration_targets = Some(Box::new(catalog));
        self
    }

    pub fn fuse_targets(mut self, catalog: impl TargetCatalog + 'static) -> Self {
        self.fuse_targets = Some(Box::new(catalog));
        self
    }

    pub fn gaze(mut self, gaze: impl GazeSource + 'static) -> Self {
        self.gaze = Some(Box::new(gaze));
        self
    }

    pub fn tracker_link(mut self, link: impl TrackerLink + 'static) -> Self {
        self.link = Some(Box::new(link));
        self
    }

    pub fn protocol(mut self, protocol: impl CalibrationProtocol + 'static) -> Self {
        self.protocol = Some(Box::new(protocol));
        self
    }

    pub fn reward(mut self, reward: RewardSignaler) -> Self {
        self.reward = Some(reward);
        self
    }

    pub fn timer(mut self, timer: T) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn rng(mut self, rng: R) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn build(self) -> Result<TrialStateMachine<T, R>> {
        let missing = ExperimentError::MissingCollaborator;
        let config = self.config.ok_or(missing("configuration"))?;
        let calibration_targets = self
            .calibration_targets
            .ok_or(missing("calibration targets"))?;
        let fuse_targets = self.fuse_targets.ok_or(missing("fuse-test targets"))?;
        let gaze = self.gaze.ok_or(missing("gaze source"))?;
        let link = self.link.ok_or(missing("tracker link"))?;
        let protocol = self.protocol.ok_or(missing("calibration protocol"))?;
        let timer = self.timer.ok_or(missing("timer"))?;
        let rng = self.rng.ok_or(missing("random source"))?;

        config.validate()?;
        if calibration_targets.count() == 0 || fuse_targets.count() == 0 {
            return Err(ExperimentError::InvalidConfig(
                "target catalogs must not be empty".into(),
            ));
        }
        if let Some(bad) = config
            .calibration_order
            .iter()
            .find(|&&i| i >= calibration_targets.count())
        {
            return Err(ExperimentError::InvalidConfig(format!(
                "calibration order names target {bad}, catalog has {}",
                calibration_targets.count()
            )));
        }

        let reward = self.reward.unwrap_or_else(|| {
            warn!("no reward device configured, rewards will be unconfirmed");
            RewardSignaler::disconnected()
        });
        let run_counter = RunCounter::load(config.session.run_state_path())?;

        let now = timer.now();
        let central = calibration_targets.central_index();
        let local_target = calibration_targets.position_at(central).unwrap_or_default();

        Ok(TrialStateMachine {
            durations: TrialDurations::from(&config),
            window: FixationWindow::from_angles(config.x_angle_deg, config.y_angle_deg),
            settings: CalibrationSettings::from(&config.tracker),
            generator: TrialSequenceGenerator::new(fuse_targets.count(), config.trials_per_target),
            session_file: SessionFile::new(&config.session.base_dir, &config.session.subject),
            config,
            calibration_targets,
            fuse_targets,
            gaze,
            link,
            protocol,
            reward,
            logger: TrialLogger::new(),
            run_counter,
            timer,
            rng,
            mode: SessionMode::Idle,
            scale: 1.0,
            target_index: central,
            local_target,
            trial_number: 0,
            num_correct: 0,
            dwell: DwellAccumulator::new(now),
            timestamps: TrialTimestamps::starting_at(now),
            auto_index: 0,
            target_sample_count: 0,
            presenting: false,
            advance_pending: false,
            reward_outcome: None,
            sequence: Vec::new(),
            active_eye: None,
            marker_visible: false,
            gaze_in_window: false,
        })
    }
}

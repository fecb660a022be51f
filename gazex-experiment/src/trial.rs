use crate::config::ExperimentConfig;

/// Timing thresholds read once when a controller is built
#[derive(Debug, Clone, PartialEq)]
pub struct TrialDurations {
    pub presentation_s: f64,
    pub grace_s: f64,
    pub required_fixation_s: f64,
    pub inter_trial_s: f64,
    pub reward_s: f32,
}

impl From<&ExperimentConfig> for TrialDurations {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            presentation_s: config.presentation_time_s,
            grace_s: config.grace_period_s,
            required_fixation_s: config.required_fixation_s,
            inter_trial_s: config.inter_trial_interval_s,
            reward_s: config.reward_duration_s,
        }
    }
}

/// Wall-clock marks for the active target, in timer seconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTimestamps {
    pub target_change: f64,
    pub inter_trial_start: f64,
    pub last_tick: f64,
    pub tick_delta: f64,
}

impl TrialTimestamps {
    pub fn starting_at(now: f64) -> Self {
        Self {
            target_change: now,
            inter_trial_start: now,
            last_tick: now,
            tick_delta: 0.0,
        }
    }

    pub fn observe_tick(&mut self, now: f64) {
        self.tick_delta = (now - self.last_tick).max(0.0);
        self.last_tick = now;
    }

    /// Half of the last tick, absorbs one frame of jitter in interval checks.
    pub fn epsilon(&self) -> f64 {
        self.tick_delta / 2.0
    }

    pub fn since_target_change(&self, now: f64) -> f64 {
        now - self.target_change
    }

    pub fn since_inter_trial_start(&self, now: f64) -> f64 {
        now - self.inter_trial_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_tracks_half_the_last_tick() {
        let mut ts = TrialTimestamps::starting_at(1.0);
        assert_eq!(ts.epsilon(), 0.0);
        ts.observe_tick(1.02);
        assert!((ts.epsilon() - 0.01).abs() < 1e-12);
        assert!((ts.since_target_change(1.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn durations_come_from_config() {
        let config = ExperimentConfig::default();
        let d = TrialDurations::from(&config);
        assert_eq!(d.presentation_s, config.presentation_time_s);
        assert_eq!(d.reward_s, config.reward_duration_s);
    }
}

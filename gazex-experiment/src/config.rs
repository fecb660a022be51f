use std::path::{Path, PathBuf};

use gazex_core::{StaticCatalog, TargetCatalog};
use serde::{Deserialize, Serialize};

use crate::error::{ExperimentError, Result};

/// Fixed visiting order of the automatic calibration routine
pub const DEFAULT_CALIBRATION_ORDER: [usize; 17] = [3, 6, 7, 8, 5, 2, 1, 0, 3, 7, 5, 1, 0, 6, 8, 2, 4];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub auto_advance: bool,
    pub reward_duration_s: f32,
    pub presentation_time_s: f64,
    pub grace_period_s: f64,
    pub required_fixation_s: f64,
    pub inter_trial_interval_s: f64,
    pub x_angle_deg: f32,
    pub y_angle_deg: f32,
    pub marker_size: f32,
    pub calibration_scale: f32,
    pub trials_per_target: usize,
    pub calibration_order: Vec<usize>,
    pub tracker: TrackerConfig,
    pub session: SessionConfig,
    pub targets: TargetsConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            auto_advance: true,
            reward_duration_s: 0.2,
            presentation_time_s: 1.0,
            grace_period_s: 0.1,
            required_fixation_s: 0.5,
            inter_trial_interval_s: 1.0,
            x_angle_deg: 10.0,
            y_angle_deg: 10.0,
            marker_size: 0.02,
            calibration_scale: 1.5,
            trials_per_target: 25,
            calibration_order: DEFAULT_CALIBRATION_ORDER.to_vec(),
            tracker: TrackerConfig::default(),
            session: SessionConfig::default(),
            targets: TargetsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub sample_rate_hz: f64,
    pub aspect_ratio: f32,
    /// Multiplier from scene units to tracker units
    pub unit_scale: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 120.0,
            aspect_ratio: 16.0 / 9.0,
            unit_scale: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub base_dir: PathBuf,
    pub subject: String,
    pub run_state_file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            subject: "subject".to_string(),
            run_state_file: "run_state.json".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn run_state_path(&self) -> PathBuf {
        self.base_dir.join(&self.run_state_file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub calibration: Vec<[f32; 3]>,
    pub fuse_test: Vec<[f32; 3]>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        let keypad = StaticCatalog::keypad_grid(0.1, 1.0);
        let grid: Vec<[f32; 3]> = (0..keypad.count())
            .filter_map(|i| keypad.position_at(i))
            .map(|p| p.to_array())
            .collect();
        Self {
            calibration: grid.clone(),
            fuse_test: grid,
        }
    }
}

impl TargetsConfig {
    pub fn calibration_catalog(&self) -> StaticCatalog {
        StaticCatalog::from(self.calibration.as_slice())
    }

    pub fn fuse_test_catalog(&self) -> StaticCatalog {
        StaticCatalog::from(self.fuse_test.as_slice())
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ExperimentConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ExperimentError::InvalidConfig(msg));

        for (name, angle) in [("x_angle_deg", self.x_angle_deg), ("y_angle_deg", self.y_angle_deg)] {
            if !(1.0..=90.0).contains(&angle) {
                return invalid(format!("{name} must be within [1, 90], got {angle}"));
            }
        }
        if !(0.005..=0.1).contains(&self.marker_size) {
            return invalid(format!("marker_size must be within [0.005, 0.1], got {}", self.marker_size));
        }
        if self.presentation_time_s <= 0.0 {
            return invalid("presentation_time_s must be positive".into());
        }
        for (name, v) in [
            ("grace_period_s", self.grace_period_s),
            ("required_fixation_s", self.required_fixation_s),
            ("inter_trial_interval_s", self.inter_trial_interval_s),
        ] {
            if v < 0.0 {
                return invalid(format!("{name} must not be negative"));
            }
        }
        if self.reward_duration_s < 0.0 {
            return invalid("reward_duration_s must not be negative".into());
        }
        if self.calibration_scale <= 0.0 {
            return invalid("calibration_scale must be positive".into());
        }
        if self.tracker.sample_rate_hz <= 0.0 {
            return invalid("tracker.sample_rate_hz must be positive".into());
        }
        if self.tracker.aspect_ratio <= 0.0 {
            return invalid("tracker.aspect_ratio must be positive".into());
        }
        if self.trials_per_target == 0 {
            return invalid("trials_per_target must be at least 1".into());
        }
        if self.targets.calibration.is_empty() || self.targets.fuse_test.is_empty() {
            return invalid("both target sets need at least one target".into());
        }
        if self.calibration_order.is_empty() {
            return invalid("calibration_order is empty".into());
        }
        if let Some(bad) = self
            .calibration_order
            .iter()
            .find(|&&i| i >= self.targets.calibration.len())
        {
            return invalid(format!(
                "calibration_order names target {bad} but only {} calibration targets exist",
                self.targets.calibration.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.targets.calibration.len(), 9);
        assert_eq!(config.calibration_order.len(), 17);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = ExperimentConfig::from_toml_str(
            r#"
            auto_advance = false
            required_fixation_s = 0.75

            [session]
            subject = "monkey-b"

            [tracker]
            sample_rate_hz = 200.0
            "#,
        )
        .unwrap();
        assert!(!config.auto_advance);
        assert_eq!(config.required_fixation_s, 0.75);
        assert_eq!(config.session.subject, "monkey-b");
        assert_eq!(config.session.run_state_file, "run_state.json");
        assert_eq!(config.tracker.sample_rate_hz, 200.0);
        assert_eq!(config.tracker.unit_scale, 1000.0);
        assert_eq!(config.trials_per_target, 25);
    }

    #[test]
    fn rejects_out_of_range_angle() {
        let err = ExperimentConfig::from_toml_str("x_angle_deg = 120.0").unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_order_outside_catalog() {
        let mut config = ExperimentConfig::default();
        config.calibration_order = vec![0, 9];
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ExperimentConfig::from_toml_str("auto_advance = maybe").unwrap_err();
        assert!(matches!(err, ExperimentError::ConfigParse(_)));
    }
}

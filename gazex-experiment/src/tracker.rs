//! Contract with the external eye tracker and its calibration routine.

use crate::config::TrackerConfig;

/// Settings handed to the calibration routine when it starts
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSettings {
    pub sample_rate_hz: f64,
    pub aspect_ratio: f32,
    pub unit_scale: f32,
}

impl From<&TrackerConfig> for CalibrationSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            sample_rate_hz: config.sample_rate_hz,
            aspect_ratio: config.aspect_ratio,
            unit_scale: config.unit_scale,
        }
    }
}

impl CalibrationSettings {
    /// Seconds between reference samples.
    pub fn sample_period(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }

    /// Scene-local target position in tracker units, vertical axis corrected for aspect.
    pub fn reference_position(&self, local: [f32; 3]) -> [f32; 3] {
        let mut p = local;
        p[1] /= self.aspect_ratio;
        p.map(|v| v * self.unit_scale)
    }
}

/// Outcome reported by the tracker after a calibration routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolEvent {
    Succeeded,
    Failed,
}

/// Connection to the eye tracker
pub trait TrackerLink {
    fn is_connected(&self) -> bool;
    /// Converts local seconds to the tracker's clock.
    fn to_tracker_time(&self, local_s: f64) -> f64;
}

/// Calibration routine running on the tracker side
pub trait CalibrationProtocol {
    fn start(&mut self, settings: &CalibrationSettings, link: &dyn TrackerLink);
    fn stop(&mut self);
    fn add_reference_position(&mut self, position: [f32; 3], tracker_time: f64);
    fn send_reference_data(&mut self);
    /// Pending success/failure notification, polled once per tick.
    fn poll_event(&mut self) -> Option<ProtocolEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_position_divides_y_by_aspect_then_scales() {
        let settings = CalibrationSettings {
            sample_rate_hz: 120.0,
            aspect_ratio: 2.0,
            unit_scale: 1000.0,
        };
        let p = settings.reference_position([0.1, 0.2, 1.0]);
        assert!((p[0] - 100.0).abs() < 1e-3);
        assert!((p[1] - 100.0).abs() < 1e-3);
        assert!((p[2] - 1000.0).abs() < 1e-3);
        assert!((settings.sample_period() - 1.0 / 120.0).abs() < 1e-12);
    }
}

//! Fixation window hit test and dwell-time accumulation.

use gazex_core::Vec2;

/// Rectangular hit test. Both axes are compared independently and the
/// boundary counts as a hit.
pub fn is_fixating(gaze: Vec2, target: Vec2, x_threshold: f32, y_threshold: f32) -> bool {
    (gaze.x - target.x).abs() <= x_threshold && (gaze.y - target.y).abs() <= y_threshold
}

/// Angular tolerance window around a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixationWindow {
    x_tolerance: f32,
    y_tolerance: f32,
}

impl FixationWindow {
    pub fn from_angles(x_angle_deg: f32, y_angle_deg: f32) -> Self {
        Self {
            x_tolerance: (x_angle_deg.to_radians() / 2.0).tan(),
            y_tolerance: (y_angle_deg.to_radians() / 2.0).tan(),
        }
    }

    /// Thresholds in effect at the given zoom scale.
    pub fn thresholds(&self, scale: f32) -> (f32, f32) {
        (self.x_tolerance * scale, self.y_tolerance * scale)
    }

    pub fn contains(&self, gaze: Vec2, target: Vec2, scale: f32) -> bool {
        let (xt, yt) = self.thresholds(scale);
        is_fixating(gaze, target, xt, yt)
    }
}

/// Accumulated time on target within one trial.
///
/// `last_sample` always moves to the newest sample, hit or miss, so a miss
/// never inflates the delta credited to the following hit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DwellAccumulator {
    total: f64,
    last_sample: f64,
}

impl DwellAccumulator {
    pub fn new(now: f64) -> Self {
        Self {
            total: 0.0,
            last_sample: now,
        }
    }

    pub fn sample(&mut self, now: f64, hit: bool) {
        if hit {
            self.total += (now - self.last_sample).max(0.0);
        }
        self.last_sample = now;
    }

    /// Moves the sample clock without crediting any time.
    pub fn skip(&mut self, now: f64) {
        self.last_sample = now;
    }

    pub fn reset(&mut self, now: f64) {
        *self = Self::new(now);
    }

    /// Clears the total but keeps the sample clock.
    pub fn clear(&mut self) {
        self.total = 0.0;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }

    pub fn satisfies(&self, required: f64) -> bool {
        self.total >= required
    }
}

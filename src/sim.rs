use std::cell::RefCell;
use std::rc::Rc;

use gazex_core::{GazeSource, Vec2};
use rand::rngs::StdRng;
use rand::Rng;

/// Synthetic gaze that either settles on the presented target or wanders
/// outside its window, decided once per presentation.
#[derive(Clone)]
pub struct SimulatedGaze {
    state: Rc<RefCell<SimState>>,
}

struct SimState {
    rng: StdRng,
    hit_rate: f64,
    on_target: bool,
    point: Vec2,
}

impl SimulatedGaze {
    pub fn new(hit_rate: f64, rng: StdRng) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                rng,
                hit_rate: if hit_rate.is_nan() { 0.0 } else { hit_rate.clamp(0.0, 1.0) },
                on_target: false,
                point: Vec2::default(),
            })),
        }
    }

    /// Rolls whether the subject looks at the next target.
    pub fn new_presentation(&self) {
        let mut s = self.state.borrow_mut();
        let p = s.hit_rate;
        s.on_target = s.rng.random_bool(p);
    }

    #[cfg(test)]
    pub fn is_on_target(&self) -> bool {
        self.state.borrow().on_target
    }

    /// Moves the gaze point for this frame relative to `target`.
    pub fn follow(&self, target: Vec2, thresholds: (f32, f32)) {
        let mut s = self.state.borrow_mut();
        let (xt, yt) = thresholds;
        let (dx, dy) = if s.on_target {
            // Jitter stays within half the window.
            (
                s.rng.random_range(-0.5..=0.5) * xt,
                s.rng.random_range(-0.5..=0.5) * yt,
            )
        } else {
            let side = if s.rng.random_bool(0.5) { 1.0 } else { -1.0 };
            (side * s.rng.random_range(1.5..3.0) * xt, s.rng.random_range(-1.0..=1.0) * yt)
        };
        s.point = Vec2::new(target.x + dx, target.y + dy);
    }
}

impl GazeSource for SimulatedGaze {
    fn position(&self) -> Vec2 {
        self.state.borrow().point
    }
}

//! Randomised fuse-test trial order.

use gazex_core::{EyeMode, Trial};
use rand::Rng;

/// Builds the fuse-test order once per session.
///
/// Every target gets `trials_per_target` entries split into eye-mode thirds
/// (integer division, the remainder lands in the binocular third). The flat
/// list is shuffled as (target, eye) pairs and then given one forward pass
/// that breaks up equal adjacent targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialSequenceGenerator {
    pub target_count: usize,
    pub trials_per_target: usize,
}

impl TrialSequenceGenerator {
    pub fn new(target_count: usize, trials_per_target: usize) -> Self {
        Self {
            target_count,
            trials_per_target,
        }
    }

    pub fn total_trials(&self) -> usize {
        self.target_count * self.trials_per_target
    }

    pub fn eye_mode_for(&self, block_index: usize) -> EyeMode {
        let n = self.trials_per_target;
        if block_index < n / 3 {
            EyeMode::LeftMasked
        } else if block_index < n * 2 / 3 {
            EyeMode::RightMasked
        } else {
            EyeMode::Binocular
        }
    }

    pub fn generate<R: Rng>(&self, rng: &mut R) -> Vec<Trial> {
        let mut pairs: Vec<(usize, EyeMode)> = Vec::with_capacity(self.total_trials());
        for target in 0..self.target_count {
            for j in 0..self.trials_per_target {
                pairs.push((target, self.eye_mode_for(j)));
            }
        }

        shuffle_pairs(&mut pairs, rng);
        repair_adjacent(&mut pairs);

        pairs
            .into_iter()
            .enumerate()
            .map(|(number, (target, eye))| Trial::new(number, target, eye))
            .collect()
    }
}

/// Fisher-Yates over the whole list, swap index drawn from `0..=i`.
fn shuffle_pairs<R: Rng>(pairs: &mut [(usize, EyeMode)], rng: &mut R) {
    for i in (1..pairs.len()).rev() {
        let j = rng.random_range(0..=i);
        pairs.swap(i, j);
    }
}

/// Single best-effort pass: when entry `i` repeats the target of `i - 1`,
/// swap it forward with `i + 1`. The final pair is never examined and a run
/// of three equal targets can survive, neither is retried.
pub fn repair_adjacent<T: PartialEq, E>(entries: &mut [(T, E)]) {
    if entries.len() < 3 {
        return;
    }
    for i in 1..entries.len() - 1 {
        if entries[i].0 == entries[i - 1].0 {
            entries.swap(i, i + 1);
        }
    }
}

/// Interior positions `i` (excluding the final pair) where `i` and `i + 1`
/// share a target.
pub fn interior_adjacent_repeats(trials: &[Trial]) -> usize {
    if trials.len() < 3 {
        return 0;
    }
    trials[..trials.len() - 1]
        .windows(2)
        .filter(|w| w[0].target == w[1].target)
        .count()
}

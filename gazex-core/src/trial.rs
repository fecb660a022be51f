use serde::{Deserialize, Serialize};
use std::fmt;

/// Which eye(s) see the scene unmasked during a fuse-test trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EyeMode {
    LeftMasked,
    RightMasked,
    Binocular,
}

impl EyeMode {
    pub const ALL: [EyeMode; 3] = [EyeMode::LeftMasked, EyeMode::RightMasked, EyeMode::Binocular];

    /// Numeric code written to the trial log.
    pub fn code(&self) -> u8 {
        match self {
            EyeMode::LeftMasked => 0,
            EyeMode::RightMasked => 1,
            EyeMode::Binocular => 2,
        }
    }

    pub fn masks_left(&self) -> bool {
        matches!(self, EyeMode::LeftMasked)
    }

    pub fn masks_right(&self) -> bool {
        matches!(self, EyeMode::RightMasked)
    }
}

/// What happened to the reward for a completed trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardOutcome {
    NotEarned,
    Delivered,
    /// Reward was earned and attempted but the device write failed
    Unconfirmed,
}

impl RewardOutcome {
    pub fn rewarded(&self) -> bool {
        !matches!(self, RewardOutcome::NotEarned)
    }
}

/// One unit of the fuse-test sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub number: usize,
    pub target: usize,
    pub eye: EyeMode,
    pub outcome: Option<RewardOutcome>,
}

impl Trial {
    pub fn new(number: usize, target: usize, eye: EyeMode) -> Self {
        Self {
            number,
            target,
            eye,
            outcome: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Recorded result per completed trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub eye: EyeMode,
    pub target: usize,
    pub reward: RewardOutcome,
}

impl TrialRecord {
    pub fn rewarded(&self) -> bool {
        self.reward.rewarded()
    }
}

impl From<&Trial> for TrialRecord {
    fn from(trial: &Trial) -> Self {
        Self {
            trial: trial.number,
            eye: trial.eye,
            target: trial.target,
            reward: trial.outcome.unwrap_or(RewardOutcome::NotEarned),
        }
    }
}

impl fmt::Display for TrialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rewarded = if self.rewarded() { "True" } else { "False" };
        write!(
            f,
            "{},{},{},{}",
            self.trial,
            self.eye.code(),
            self.target,
            rewarded
        )
    }
}

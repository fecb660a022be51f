pub mod config;
pub mod error;
pub mod fixation;
pub mod logger;
pub mod reward;
pub mod sequence;
pub mod state;
pub mod tracker;
pub mod trial;

pub use config::{ExperimentConfig, SessionConfig, TargetsConfig, TrackerConfig};
pub use error::{ExperimentError, Result};
pub use fixation::{DwellAccumulator, FixationWindow, is_fixating};
pub use logger::{RunCounter, SessionFile, TrialLogger};
pub use reward::RewardSignaler;
pub use sequence::TrialSequenceGenerator;
pub use state::{Command, ExperimentEvent, StateMachineBuilder, TrialStateMachine};
pub use tracker::{CalibrationProtocol, CalibrationSettings, ProtocolEvent, TrackerLink};
pub use trial::{TrialDurations, TrialTimestamps};

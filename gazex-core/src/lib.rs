pub mod mode;
pub mod target;
pub mod trial;

pub use mode::SessionMode;
pub use target::{GazeSource, StaticCatalog, TargetCatalog, Vec2, Vec3};
pub use trial::{EyeMode, RewardOutcome, Trial, TrialRecord};

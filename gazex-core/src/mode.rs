/// Which routine the controller is currently running
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    Calibrating,
    /// Rest state entered after calibration stops, central target shown
    FixatingPause,
    Testing,
}

impl SessionMode {
    /// A trial or target is being presented and scored.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Calibrating | Self::Testing)
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(self, Self::Calibrating)
    }

    pub fn is_testing(&self) -> bool {
        matches!(self, Self::Testing)
    }

    /// Modes from which a new routine may be started.
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Idle | Self::FixatingPause)
    }
}

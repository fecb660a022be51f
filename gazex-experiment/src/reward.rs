use std::io::Write;

use gazex_core::RewardOutcome;
use log::{info, warn};

/// Fire-and-forget reward pulses over a byte-stream device.
///
/// The command is `"ij"` followed by the pulse duration in decimal seconds.
/// Nothing is read back from the device.
pub struct RewardSignaler {
    device: Option<Box<dyn Write>>,
}

impl RewardSignaler {
    pub fn new(device: impl Write + 'static) -> Self {
        Self {
            device: Some(Box::new(device)),
        }
    }

    /// No device attached; every reward is reported as unconfirmed.
    pub fn disconnected() -> Self {
        Self { device: None }
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    pub fn command(duration_s: f32) -> String {
        format!("ij{duration_s}")
    }

    pub fn signal(&mut self, duration_s: f32) -> RewardOutcome {
        let message = Self::command(duration_s);
        let Some(device) = self.device.as_mut() else {
            warn!("reward {message:?} not sent: no reward device attached");
            return RewardOutcome::Unconfirmed;
        };

        match device
            .write_all(message.as_bytes())
            .and_then(|_| device.flush())
        {
            Ok(()) => {
                info!("rewarded ({message})");
                RewardOutcome::Delivered
            }
            Err(e) => {
                warn!("reward {message:?} failed: {e}");
                RewardOutcome::Unconfirmed
            }
        }
    }
}

impl std::fmt::Debug for RewardSignaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardSignaler")
            .field("connected", &self.is_connected())
            .finish()
    }
}

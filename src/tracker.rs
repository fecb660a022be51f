//! Stand-in tracker for headless runs: reference data goes to a JSON file.

use std::fs;
use std::path::PathBuf;

use gazex_experiment::{CalibrationProtocol, CalibrationSettings, ProtocolEvent, TrackerLink};
use log::{debug, info, warn};
use serde::Serialize;

/// Always-connected link whose clock runs at a fixed offset from ours.
pub struct OfflineLink {
    pub offset_s: f64,
}

impl TrackerLink for OfflineLink {
    fn is_connected(&self) -> bool {
        true
    }

    fn to_tracker_time(&self, local_s: f64) -> f64 {
        local_s + self.offset_s
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferencePoint {
    pub position: [f32; 3],
    pub tracker_time_s: f64,
}

#[derive(Debug, Default, Serialize)]
struct ReferenceData {
    sample_rate_hz: f64,
    targets: Vec<Vec<ReferencePoint>>,
}

/// Collects reference samples per target and rewrites the output file
/// every time a batch is sent.
pub struct ReferenceRecorder {
    path: PathBuf,
    data: ReferenceData,
    pending: Vec<ReferencePoint>,
    running: bool,
    outcome: Option<ProtocolEvent>,
}

impl ReferenceRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: ReferenceData::default(),
            pending: Vec::new(),
            running: false,
            outcome: None,
        }
    }

    #[cfg(test)]
    pub fn batches(&self) -> usize {
        self.data.targets.len()
    }

    fn write(&self) {
        let result = serde_json::to_string_pretty(&self.data)
            .map_err(std::io::Error::from)
            .and_then(|json| fs::write(&self.path, json));
        if let Err(e) = result {
            warn!("could not write {}: {e}", self.path.display());
        }
    }
}

impl CalibrationProtocol for ReferenceRecorder {
    fn start(&mut self, settings: &CalibrationSettings, link: &dyn TrackerLink) {
        info!(
            "offline calibration at {} Hz, tracker clock offset {:.3}s",
            settings.sample_rate_hz,
            link.to_tracker_time(0.0)
        );
        self.data = ReferenceData {
            sample_rate_hz: settings.sample_rate_hz,
            targets: Vec::new(),
        };
        self.pending.clear();
        self.outcome = None;
        self.running = true;
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if !self.pending.is_empty() {
            self.send_reference_data();
        }
        self.outcome = Some(if self.data.targets.is_empty() {
            ProtocolEvent::Failed
        } else {
            ProtocolEvent::Succeeded
        });
    }

    fn add_reference_position(&mut self, position: [f32; 3], tracker_time: f64) {
        self.pending.push(ReferencePoint {
            position,
            tracker_time_s: tracker_time,
        });
    }

    fn send_reference_data(&mut self) {
        debug!("reference batch of {} samples", self.pending.len());
        self.data.targets.push(std::mem::take(&mut self.pending));
        self.write();
    }

    fn poll_event(&mut self) -> Option<ProtocolEvent> {
        self.outcome.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CalibrationSettings {
        CalibrationSettings {
            sample_rate_hz: 120.0,
            aspect_ratio: 1.0,
            unit_scale: 1000.0,
        }
    }

    #[test]
    fn batches_are_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference_data.json");
        let link = OfflineLink { offset_s: 10.0 };
        let mut rec = ReferenceRecorder::new(&path);

        rec.start(&settings(), &link);
        rec.add_reference_position([0.0, 0.0, 1000.0], link.to_tracker_time(0.5));
        rec.add_reference_position([0.0, 0.0, 1000.0], link.to_tracker_time(0.6));
        rec.send_reference_data();
        rec.add_reference_position([100.0, 0.0, 1000.0], link.to_tracker_time(1.5));
        rec.stop();

        assert_eq!(rec.batches(), 2);
        assert_eq!(rec.poll_event(), Some(ProtocolEvent::Succeeded));
        assert_eq!(rec.poll_event(), None);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["targets"].as_array().unwrap().len(), 2);
        let t = json["targets"][0][1]["tracker_time_s"].as_f64().unwrap();
        assert!((t - 10.6).abs() < 1e-9);
    }

    #[test]
    fn stopping_without_samples_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = ReferenceRecorder::new(dir.path().join("r.json"));
        rec.stop();
        assert_eq!(rec.poll_event(), None);

        rec.start(&settings(), &OfflineLink { offset_s: 0.0 });
        rec.stop();
        assert_eq!(rec.poll_event(), Some(ProtocolEvent::Failed));
    }
}

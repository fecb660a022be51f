use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use gazex_core::TrialRecord;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const LOG_HEADER: &str = "trial,eye,target,rewarded";

/// Append-only trial outcomes for one session
#[derive(Debug, Default, Clone)]
pub struct TrialLogger {
    records: Vec<TrialRecord>,
}

impl TrialLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: TrialRecord) {
        debug!("logged {record}");
        self.records.push(record);
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Header plus one row per record, in recording order.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(LOG_HEADER.len() + 16 * (self.records.len() + 1));
        out.push_str(LOG_HEADER);
        out.push('\n');
        for record in &self.records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }

    /// Writes everything recorded so far. Returns the number of rows written.
    pub fn flush(&self, destination: impl AsRef<Path>) -> Result<usize> {
        let destination = destination.as_ref();
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(destination, self.to_csv())?;
        info!(
            "wrote {} trial rows to {}",
            self.records.len(),
            destination.display()
        );
        Ok(self.records.len())
    }
}

/// Run number persisted between sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounter {
    pub fusion_run_number: u32,
}

impl RunCounter {
    /// Missing file means a fresh counter.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn increment(&mut self) {
        self.fusion_run_number += 1;
    }
}

/// Naming of the per-session log file
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFile {
    pub base_dir: PathBuf,
    pub subject: String,
}

impl SessionFile {
    pub fn new(base_dir: impl Into<PathBuf>, subject: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            subject: subject.into(),
        }
    }

    pub fn path_for(&self, date: NaiveDate, run: u32) -> PathBuf {
        self.base_dir.join(format!(
            "fusion_discontinuous_data_{}_{}_{}.txt",
            self.subject,
            date.format("%m%d%Y"),
            run
        ))
    }

    pub fn path_today(&self, run: u32) -> PathBuf {
        self.path_for(Local::now().date_naive(), run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazex_core::{EyeMode, RewardOutcome};

    fn record(trial: usize, target: usize, eye: EyeMode, reward: RewardOutcome) -> TrialRecord {
        TrialRecord {
            trial,
            eye,
            target,
            reward,
        }
    }

    #[test]
    fn csv_keeps_recording_order() {
        let mut logger = TrialLogger::new();
        logger.record(record(0, 4, EyeMode::LeftMasked, RewardOutcome::Delivered));
        logger.record(record(1, 2, EyeMode::Binocular, RewardOutcome::NotEarned));
        assert_eq!(
            logger.to_csv(),
            "trial,eye,target,rewarded\n0,0,4,True\n1,2,2,False\n"
        );
    }

    #[test]
    fn empty_logger_flushes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        let rows = TrialLogger::new().flush(&path).unwrap();
        assert_eq!(rows, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "trial,eye,target,rewarded\n");
    }

    #[test]
    fn flush_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.txt");
        let mut logger = TrialLogger::new();
        logger.record(record(0, 1, EyeMode::RightMasked, RewardOutcome::Unconfirmed));
        assert_eq!(logger.flush(&path).unwrap(), 1);
        assert!(fs::read_to_string(&path).unwrap().ends_with("0,1,1,True\n"));
    }

    #[test]
    fn session_file_name_has_subject_date_and_run() {
        let file = SessionFile::new("/data", "kiwi");
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            file.path_for(date, 12),
            PathBuf::from("/data/fusion_discontinuous_data_kiwi_03072024_12.txt")
        );
    }

    #[test]
    fn run_counter_round_trips_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_state.json");
        let mut counter = RunCounter::load(&path).unwrap();
        assert_eq!(counter.fusion_run_number, 0);
        counter.increment();
        counter.increment();
        counter.save(&path).unwrap();
        assert_eq!(RunCounter::load(&path).unwrap().fusion_run_number, 2);
    }

    #[test]
    fn corrupt_run_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_state.json");
        fs::write(&path, "not json").unwrap();
        assert!(RunCounter::load(&path).is_err());
    }
}

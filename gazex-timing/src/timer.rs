use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for the experiment loop, in seconds since the timer's epoch
pub trait Timer: Send + Sync {
    fn now(&self) -> f64;
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_stats(&self) -> FrameStats;

    fn elapsed_since(&self, t: f64) -> f64 {
        self.now() - t
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    pub frames: usize,
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl FrameStats {
    fn from_durations<'a>(frame_times: impl IntoIterator<Item = &'a Duration>) -> Self {
        let times: Vec<f64> = frame_times.into_iter().map(|d| d.as_nanos() as f64).collect();
        if times.is_empty() {
            return FrameStats::default();
        }
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        FrameStats {
            frames: times.len(),
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

/// Keeps the most recent `max_samples` frame times.
fn push_bounded(frame_times: &mut VecDeque<Duration>, max_samples: usize, d: Duration) {
    while frame_times.len() >= max_samples.max(1) {
        frame_times.pop_front();
    }
    frame_times.push_back(d);
}

const FRAME_WINDOW: usize = 1000;

/// Monotonic wall-clock timer
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub frame_times: VecDeque<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        push_bounded(&mut self.frame_times, self.max_samples, d);
    }
    fn frame_stats(&self) -> FrameStats {
        FrameStats::from_durations(&self.frame_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_times: VecDeque::with_capacity(FRAME_WINDOW),
            max_samples: FRAME_WINDOW,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Manually advanced timer for deterministic runs.
///
/// Clones share the same clock, so a test can keep one handle and hand
/// another to the state machine.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    nanos: Arc<AtomicU64>,
    frame_times: VecDeque<Duration>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    /// Jumps to an absolute time; never moves backwards.
    pub fn set_secs(&self, secs: f64) {
        let target = Duration::from_secs_f64(secs).as_nanos() as u64;
        self.nanos.fetch_max(target, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> f64 {
        self.nanos.load(Ordering::SeqCst) as f64 / 1e9
    }
    // Sleeping a manual clock just moves it forward.
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_frame(&mut self, d: Duration) {
        push_bounded(&mut self.frame_times, FRAME_WINDOW, d);
    }
    fn frame_stats(&self) -> FrameStats {
        FrameStats::from_durations(&self.frame_times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_clones_share_time() {
        let timer = ManualTimer::new();
        let handle = timer.clone();
        handle.advance(Duration::from_millis(250));
        assert!((timer.now() - 0.25).abs() < 1e-12);
        timer.sleep(Duration::from_millis(750));
        assert!((handle.now() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn set_secs_is_monotonic() {
        let timer = ManualTimer::new();
        timer.set_secs(2.0);
        timer.set_secs(1.0);
        assert!((timer.now() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn frame_stats_report_mean_and_extremes() {
        let mut timer = ManualTimer::new();
        for ms in [10, 20, 30] {
            timer.record_frame(Duration::from_millis(ms));
        }
        let stats = timer.frame_stats();
        assert_eq!(stats.frames, 3);
        assert!((stats.average_frame_time_ns - 20e6).abs() < 1.0);
        assert!((stats.min_frame_time_ns - 10e6).abs() < 1.0);
        assert!((stats.max_frame_time_ns - 30e6).abs() < 1.0);
        assert!((stats.effective_fps - 50.0).abs() < 1e-6);
    }

    #[test]
    fn frame_window_drops_oldest() {
        let mut timer = HighPrecisionTimer::new();
        timer.max_samples = 2;
        for ms in [100, 1, 3] {
            timer.record_frame(Duration::from_millis(ms));
        }
        let stats = timer.frame_stats();
        assert_eq!(stats.frames, 2);
        assert!((stats.max_frame_time_ns - 3e6).abs() < 1.0);
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = HighPrecisionTimer::new().frame_stats();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.effective_fps, 0.0);
    }
}

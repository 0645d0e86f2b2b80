//! Request/response latency statistics with periodic reporting.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// Online mean/min/max/stddev over response times in milliseconds.
#[derive(Debug, Clone, Default)]
struct ResponseStat {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl ResponseStat {
    fn feed(&mut self, value_ms: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value_ms;
            self.max = value_ms;
        } else {
            self.min = self.min.min(value_ms);
            self.max = self.max.max(value_ms);
        }
        let delta = value_ms - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value_ms - self.mean);
    }

    fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    fn reset(&mut self) {
        *self = ResponseStat::default();
    }
}

struct StatState {
    terminate: bool,
    /// Window since the last periodic report.
    instant: ResponseStat,
    /// Whole run.
    global: ResponseStat,
}

struct StatShared {
    interval: Duration,
    request_count: AtomicU64,
    state: Mutex<StatState>,
    condvar: Condvar,
}

impl StatShared {
    fn report(&self, stat: &ResponseStat) {
        info!(
            "req: {}, ecm: {}, response mean: {:.3} ms, min: {:.0}, max: {:.0}, dev: {:.3}",
            self.request_count.load(Ordering::Relaxed),
            stat.count,
            stat.mean,
            stat.min,
            stat.max,
            stat.stddev(),
        );
    }
}

/// Collects per-request latencies and reports a summary line on a fixed
/// interval from its own thread (interval zero = only a final summary).
pub struct Statistics {
    shared: Arc<StatShared>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl Statistics {
    pub fn new(interval: Duration) -> Self {
        let shared = Arc::new(StatShared {
            interval,
            request_count: AtomicU64::new(0),
            state: Mutex::new(StatState {
                terminate: false,
                instant: ResponseStat::default(),
                global: ResponseStat::default(),
            }),
            condvar: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let reporter = thread::Builder::new()
            .name("stats-reporter".into())
            .spawn(move || reporter_main(&thread_shared))
            .ok();
        Statistics { shared, reporter: Mutex::new(reporter) }
    }

    pub fn one_request(&self) {
        self.shared.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn one_response(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut state = self.shared.state.lock();
        state.instant.feed(ms);
        state.global.feed(ms);
    }

    /// Stop the reporter; it prints the cumulative summary on the way out.
    pub fn terminate(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.terminate {
                return;
            }
            state.terminate = true;
            self.shared.condvar.notify_one();
        }
        if let Some(reporter) = self.reporter.lock().take() {
            let _ = reporter.join();
        }
    }
}

impl Drop for Statistics {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn reporter_main(shared: &StatShared) {
    loop {
        let mut state = shared.state.lock();
        if shared.interval.is_zero() {
            shared.condvar.wait(&mut state);
        } else {
            shared.condvar.wait_for(&mut state, shared.interval);
        }
        if state.terminate {
            break;
        }
        let instant = state.instant.clone();
        state.instant.reset();
        drop(state);
        shared.report(&instant);
    }

    let state = shared.state.lock();
    shared.report(&state.global);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_two_pass_results() {
        let mut stat = ResponseStat::default();
        let samples = [12.0, 15.0, 9.0, 30.0, 21.0];
        for s in samples {
            stat.feed(s);
        }
        assert_eq!(stat.count, 5);
        assert_eq!(stat.min, 9.0);
        assert_eq!(stat.max, 30.0);
        assert!((stat.mean - 17.4).abs() < 1e-9);

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var =
            samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / (samples.len() - 1) as f64;
        assert!((stat.stddev() - var.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn single_sample_has_zero_deviation() {
        let mut stat = ResponseStat::default();
        stat.feed(42.0);
        assert_eq!(stat.stddev(), 0.0);
        assert_eq!(stat.min, 42.0);
        assert_eq!(stat.max, 42.0);
    }
}

use log::info;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
struct Baseline {
    at: Instant,
    count: u64,
}

/// Shared completion counter. Every `step` completions it logs the request
/// rate since the previous sample.
#[derive(Debug)]
pub struct Progress {
    count: AtomicU64,
    step: u64,
    silent: bool,
    baseline: Mutex<Baseline>,
}

impl Progress {
    pub fn new(total: u64, silent: bool) -> Self {
        Self {
            count: AtomicU64::new(0),
            step: (total / 10).max(1),
            silent,
            baseline: Mutex::new(Baseline {
                at: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Counts one completed request. Returns the requests per second of the
    /// sample taken by this increment, if one was due.
    pub fn increment(&self) -> Option<f64> {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;

        if count == 1 {
            *self.lock_baseline() = Baseline {
                at: Instant::now(),
                count: 0,
            };
            return None;
        }
        if count % self.step != 0 {
            return None;
        }

        let rps = {
            let mut baseline = self.lock_baseline();
            let now = Instant::now();
            let seconds = now.duration_since(baseline.at).as_secs_f64();
            let rps = count.saturating_sub(baseline.count) as f64 / seconds;
            *baseline = Baseline { at: now, count };
            rps
        };
        if !self.silent {
            info!(target: "Harness", "Completed {count:6} requests, {rps:9.2} rps");
        }
        Some(rps)
    }

    fn lock_baseline(&self) -> std::sync::MutexGuard<'_, Baseline> {
        self.baseline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

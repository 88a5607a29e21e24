//! Progress reporting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Pairs whose result reached the sink.
    pub processed: usize,
    /// Pairs submitted.
    pub total: usize,
    pub elapsed: Duration,
    /// Linear extrapolation from the rate so far (None before the first result).
    pub remaining: Option<Duration>,
}

impl Progress {
    pub fn new(processed: usize, total: usize, started: Instant) -> Self {
        let elapsed = started.elapsed();
        let remaining = (processed > 0).then(|| {
            let left = total.saturating_sub(processed) as f64;
            elapsed.mul_f64(left / processed as f64)
        });
        Self {
            processed,
            total,
            elapsed,
            remaining,
        }
    }

    /// Completed fraction in [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Lock-free count of computed pairs, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter {
    count: Arc<AtomicUsize>,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

pub(crate) trait ProgressReporter {
    fn every(&self) -> usize;
    fn report(&mut self, progress: &Progress);
}

pub(crate) struct NoProgress;

impl ProgressReporter for NoProgress {
    fn every(&self) -> usize {
        0
    }
    fn report(&mut self, _progress: &Progress) {}
}

pub(crate) struct FnProgress<F> {
    pub every: usize,
    pub f: F,
}

impl<F> ProgressReporter for FnProgress<F>
where
    F: FnMut(&Progress),
{
    fn every(&self) -> usize {
        self.every
    }
    fn report(&mut self, progress: &Progress) {
        (self.f)(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_across_threads() {
        let counter = ProgressCounter::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                let c = counter.clone();
                s.spawn(move || {
                    for _ in 0..250 {
                        c.increment();
                    }
                });
            }
        });
        assert_eq!(counter.get(), 1000);
    }

    #[test]
    fn test_progress_estimate() {
        let p = Progress::new(0, 10, Instant::now());
        assert_eq!(p.remaining, None);
        assert_eq!(p.fraction(), 0.);
        let p = Progress::new(5, 10, Instant::now());
        assert!(p.remaining.is_some());
        assert_eq!(p.fraction(), 0.5);
        assert_eq!(Progress::new(0, 0, Instant::now()).fraction(), 1.);
    }
}

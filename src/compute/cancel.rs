//! Cooperative cancellation.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{PathError, Result};

/// Shared stop flag. Cloning gives another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Workers notice it at their next check.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Checks a token every `interval` ticks of a search loop.
///
/// One probe belongs to one pair computation (not shared between threads).
#[derive(Debug)]
pub struct CancelProbe<'a> {
    token: Option<&'a CancellationToken>,
    interval: usize,
    ticks: Cell<usize>,
}

impl<'a> CancelProbe<'a> {
    pub fn new(token: Option<&'a CancellationToken>, interval: usize) -> Self {
        Self {
            token,
            interval: interval.max(1),
            ticks: Cell::new(0),
        }
    }

    /// A probe that never fires.
    pub fn never() -> Self {
        Self::new(None, 1)
    }

    /// Checks the token now.
    pub fn check(&self) -> Result<()> {
        match self.token {
            Some(token) if token.is_cancelled() => Err(PathError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Counts one loop iteration, checking the token every `interval` iterations.
    pub fn tick(&self) -> Result<()> {
        let n = self.ticks.get() + 1;
        self.ticks.set(n);
        if n % self.interval == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_probe_interval() {
        let token = CancellationToken::new();
        let probe = CancelProbe::new(Some(&token), 3);
        token.cancel();
        assert!(probe.tick().is_ok());
        assert!(probe.tick().is_ok());
        assert!(matches!(probe.tick(), Err(PathError::Cancelled)));
        assert!(matches!(probe.check(), Err(PathError::Cancelled)));
        assert!(CancelProbe::never().check().is_ok());
    }
}

//! Cooperative cancellation and progress reporting.
//!
//! The interpreter consults a caller-supplied cookie between operators and
//! before each costly operation (image decode, glyph render, scan-convert
//! step). Setting the abort flag makes the next check unwind cleanly with
//! [`Error::Abort`]. All fields are atomic so a controlling thread can flip
//! the flag while a render is in flight.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Render-control cookie shared between a caller and the interpreter.
#[derive(Debug, Default)]
pub struct Cookie {
    /// Set by the caller to request cancellation
    pub abort: AtomicBool,
    /// Operators processed so far (monotonically increasing)
    pub progress: AtomicUsize,
    /// Per-operator errors swallowed under the lenient policy
    pub errors: AtomicUsize,
    /// Soft failures where a substitute was used
    pub incomplete: AtomicUsize,
    /// Caller accepts incomplete output (progressive loading)
    pub incomplete_ok: AtomicBool,
}

impl Cookie {
    /// Create a fresh cookie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the render in flight.
    pub fn set_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Fail with [`Error::Abort`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.abort.load(Ordering::Relaxed) {
            Err(Error::Abort)
        } else {
            Ok(())
        }
    }

    /// Count one processed operator.
    pub fn tick(&self) {
        self.progress.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one swallowed error.
    pub fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one soft failure.
    pub fn count_incomplete(&self) {
        self.incomplete.fetch_add(1, Ordering::Relaxed);
    }

    /// Errors swallowed so far.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_then_aborts() {
        let cookie = Cookie::new();
        assert!(cookie.check().is_ok());
        cookie.set_abort();
        assert!(matches!(cookie.check(), Err(Error::Abort)));
    }

    #[test]
    fn test_counters() {
        let cookie = Cookie::new();
        cookie.tick();
        cookie.tick();
        cookie.count_error();
        assert_eq!(cookie.progress.load(Ordering::Relaxed), 2);
        assert_eq!(cookie.error_count(), 1);
    }
}

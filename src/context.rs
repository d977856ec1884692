//! Run context shared by every stage of a tracking run.
//!
//! The context carries the cancellation flag and the verbosity gate that the
//! legacy engine kept in process-wide globals. Clones share the same abort
//! flag, so any component (or a user-interrupt handler) can cancel the run
//! and every loop observes it at its next checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::util::{TrackError, TrackResult};

/// Shared cancellation and diagnostics state for one tracking run.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    abort: Arc<AtomicBool>,
    verbose: bool,
}

impl RunContext {
    /// Creates a fresh context with the abort flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh context with the given verbosity.
    pub fn with_verbose(verbose: bool) -> Self {
        Self {
            abort: Arc::new(AtomicBool::new(false)),
            verbose,
        }
    }

    /// Requests cancellation of the run.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Checked at every major loop boundary; turns cancellation into an error.
    pub fn checkpoint(&self) -> TrackResult<()> {
        if self.is_aborted() {
            Err(TrackError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Gates diagnostic output.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

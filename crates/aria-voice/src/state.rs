//! Per-instance pipeline state. Never process-wide.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// State shared between the controller, the accumulator loop, and turn tasks.
///
/// `processing` is the single-flight guard: a mutual-exclusion flag, not a
/// queue. `session` is bumped on every stop; in-flight work snapshots it at
/// turn start and discards results when the snapshot no longer matches.
pub struct PipelineShared {
    processing: AtomicBool,
    listening: AtomicBool,
    session: AtomicU64,
}

impl PipelineShared {
    pub fn new() -> Self {
        Self {
            processing: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            session: AtomicU64::new(0),
        }
    }

    /// Whether a conversation turn is currently active.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Try to take the single-flight guard. Returns false if a turn is active.
    pub(crate) fn try_begin_turn(&self) -> bool {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_turn(&self) {
        self.processing.store(false, Ordering::Release);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    pub(crate) fn set_listening(&self, on: bool) {
        self.listening.store(on, Ordering::Release);
    }

    /// Current session token. Work started under an older token is stale.
    pub fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    pub(crate) fn bump_session(&self) {
        self.session.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for PipelineShared {
    fn default() -> Self {
        Self::new()
    }
}

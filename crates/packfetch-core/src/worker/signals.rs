use std::sync::atomic::{AtomicBool, Ordering};

/// Why a run stopped without finishing or failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    Paused,
    Cancelled,
}

/// In-memory pause/stop flags shared between the controller and a run's workers.
///
/// The controller mirrors the persisted pause flag here so workers never touch the
/// store on the hot path.
#[derive(Debug, Default)]
pub struct JobSignals {
    pause: AtomicBool,
    stop: AtomicBool,
}

impl JobSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// The raw stop flag, for loops that only honour cancellation (extraction).
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    /// Stop wins over pause.
    pub fn suspend_reason(&self) -> Option<SuspendReason> {
        if self.is_stop_requested() {
            Some(SuspendReason::Cancelled)
        } else if self.is_pause_requested() {
            Some(SuspendReason::Paused)
        } else {
            None
        }
    }
}

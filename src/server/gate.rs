//! Stop/Go gate
//!
//! A pausable level gate every worker passes through before executing a
//! command, controlled from the administrative console.

use parking_lot::{Condvar, Mutex};

use super::state::CancelToken;

/// Global pause gate
///
/// A single shared `paused` flag plus a wait/notify pair. The gate is a
/// level, not an edge: a worker that wakes into an already-paused state
/// blocks again. No ordering is guaranteed across workers woken together.
pub struct PauseGate {
    paused: Mutex<bool>,
    go: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            go: Condvar::new(),
        }
    }

    /// Pause command execution for all workers
    pub fn stop(&self) {
        *self.paused.lock() = true;
    }

    /// Resume command execution, waking every blocked worker
    pub fn release(&self) {
        let mut paused = self.paused.lock();
        *paused = false;
        self.go.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Block while the gate is paused
    ///
    /// Re-checks the level after every wake. Also returns once the worker's
    /// cancellation flag is raised, so a paused worker can still be
    /// mass-disconnected.
    pub fn wait_until_released(&self, cancel: &CancelToken) {
        let mut paused = self.paused.lock();
        while *paused && !cancel.is_cancelled() {
            self.go.wait(&mut paused);
        }
    }

    /// Wake all waiters without changing the level
    ///
    /// Taking the mutex orders the wake after any in-flight level check, so
    /// a cancellation raised between a worker's check and its wait cannot be
    /// lost.
    pub fn wake_all(&self) {
        let _paused = self.paused.lock();
        self.go.notify_all();
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

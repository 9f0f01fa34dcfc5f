//! Server state
//!
//! The process-wide `ServerState`: admission flag, worker registry,
//! cancellation, and the idle wait the shutdown sequence blocks on.
//!
//! ## Concurrency
//!
//! - `registry` (admission flag + worker map) shares one mutex; removal is a
//!   keyed delete, and the active worker count is the map's size.
//! - `idle` is signalled whenever the map empties.
//! - Cancellation is cooperative: a flag the worker polls at its blocking
//!   points, paired with a socket shutdown that unblocks a parked read and a
//!   gate nudge that unblocks a paused wait.

use std::collections::HashMap;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::Result;

use super::gate::PauseGate;

/// Identity of one client worker
pub type WorkerId = u64;

/// Cooperative cancellation flag shared between a worker and its cancellers
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the worker observes it at its next poll
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Registry entry for a live worker
struct WorkerHandle {
    cancel: CancelToken,

    /// Clone of the worker's socket, kept only so a canceller can shut it
    /// down and unblock a parked read
    stream: TcpStream,
}

struct Registry {
    /// Gates new admissions; cleared only by the shutdown sequence
    accepting: bool,

    workers: HashMap<WorkerId, WorkerHandle>,
}

/// Hand-off from a successful registration to the worker thread
pub struct Registration {
    pub id: WorkerId,
    pub cancel: CancelToken,
}

/// Process-wide server state, constructed once at startup and passed by
/// reference to every component that needs it
pub struct ServerState {
    registry: Mutex<Registry>,
    idle: Condvar,
    gate: PauseGate,
    next_worker_id: AtomicU64,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                accepting: true,
                workers: HashMap::new(),
            }),
            idle: Condvar::new(),
            gate: PauseGate::new(),
            next_worker_id: AtomicU64::new(1),
        }
    }

    /// The stop/go gate workers consult before each command
    pub fn gate(&self) -> &PauseGate {
        &self.gate
    }

    pub fn is_accepting(&self) -> bool {
        self.registry.lock().accepting
    }

    /// Number of registered workers
    pub fn active_workers(&self) -> usize {
        self.registry.lock().workers.len()
    }

    // =========================================================================
    // Worker membership
    // =========================================================================

    /// Admit and register a new connection in one step
    ///
    /// Returns `Ok(None)` when admissions are closed; the caller drops the
    /// connection unregistered. Admission and registration share the registry
    /// lock so a mass-cancel cannot slip between them.
    pub fn register(&self, stream: &TcpStream) -> Result<Option<Registration>> {
        let stream = stream.try_clone()?;

        let mut registry = self.registry.lock();
        if !registry.accepting {
            return Ok(None);
        }
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        registry.workers.insert(
            id,
            WorkerHandle {
                cancel: cancel.clone(),
                stream,
            },
        );
        Ok(Some(Registration { id, cancel }))
    }

    /// Remove a worker from the registry
    ///
    /// Signals the idle condition when the last worker is gone.
    pub fn deregister(&self, id: WorkerId) {
        let mut registry = self.registry.lock();
        registry.workers.remove(&id);
        if registry.workers.is_empty() {
            self.idle.notify_all();
        }
    }

    // =========================================================================
    // Mass-disconnect & shutdown
    // =========================================================================

    /// Request cancellation of every current worker
    ///
    /// Admission is untouched: new connections are welcome immediately
    /// afterwards. Each worker's flag is raised, its socket shut down to
    /// unblock a parked read, and the gate nudged to unblock a paused wait.
    pub fn cancel_workers(&self) {
        let registry = self.registry.lock();
        for (id, handle) in &registry.workers {
            handle.cancel.cancel();
            if let Err(err) = handle.stream.shutdown(Shutdown::Both) {
                // The peer may already be gone.
                tracing::debug!(worker = *id, "socket shutdown failed: {err}");
            }
        }
        drop(registry);
        self.gate.wake_all();
    }

    /// Close admissions, then mass-disconnect current workers
    pub fn begin_shutdown(&self) {
        self.registry.lock().accepting = false;
        self.cancel_workers();
    }

    /// Block until the registry is empty
    ///
    /// The shutdown sequence calls this before tree teardown: no worker may
    /// still be mid-traversal once teardown begins.
    pub fn wait_idle(&self) {
        let mut registry = self.registry.lock();
        while !registry.workers.is_empty() {
            self.idle.wait(&mut registry);
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

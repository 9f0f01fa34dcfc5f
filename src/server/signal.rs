//! Signal monitor
//!
//! Exactly one dedicated thread receives the external interrupt
//! synchronously and runs the mass-disconnect; no other thread observes or
//! acts on the signal. SIGINT disconnects current clients without shutting
//! the server down.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::consts::SIGINT;
use signal_hook::iterator::backend::Handle;
use signal_hook::iterator::Signals;

use super::state::ServerState;

/// Handle to the running signal-monitor thread
pub struct SignalMonitor {
    handle: Handle,
    thread: JoinHandle<()>,
}

impl SignalMonitor {
    /// Stop the monitor and wait for its thread to exit
    pub fn shutdown(self) {
        self.handle.close();
        let _ = self.thread.join();
    }
}

/// Spawn the SIGINT monitor thread
pub fn spawn_monitor(state: Arc<ServerState>) -> io::Result<SignalMonitor> {
    let mut signals = Signals::new([SIGINT])?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("signal-monitor".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                if signal == SIGINT {
                    tracing::info!("SIGINT received, cancelling all clients");
                    state.cancel_workers();
                }
            }
        })?;

    Ok(SignalMonitor { handle, thread })
}

//! Server Module
//!
//! TCP front end and client-worker lifecycle management.
//!
//! ## Architecture
//! - Single acceptor thread; one detached worker thread per connection
//! - Admission + registration are one atomic step under the registry lock
//! - A stop/go gate pauses all command execution from the console
//! - A dedicated signal thread mass-disconnects workers on SIGINT
//! - Shutdown drains the registry before the store may be torn down

mod gate;
mod signal;
mod state;
mod worker;

pub use gate::PauseGate;
pub use signal::{spawn_monitor, SignalMonitor};
pub use state::{CancelToken, Registration, ServerState, WorkerId};

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::command::Interpreter;
use crate::config::Config;
use crate::error::Result;
use crate::tree::Tree;

/// The TCP front end: binds the listener and wires workers to the store
pub struct Server {
    config: Config,
    state: Arc<ServerState>,
    interpreter: Arc<Interpreter>,
}

impl Server {
    pub fn new(config: Config, tree: Arc<Tree>, state: Arc<ServerState>) -> Self {
        Self {
            config,
            state,
            interpreter: Arc::new(Interpreter::new(tree)),
        }
    }

    /// Bind the listener and spawn the acceptor thread
    pub fn start(&self) -> Result<ListenerHandle> {
        let listener = TcpListener::bind(&self.config.listen_addr)?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "listening");

        let state = self.state.clone();
        let interpreter = self.interpreter.clone();
        let thread = thread::Builder::new()
            .name("acceptor".to_string())
            .spawn(move || accept_loop(listener, state, interpreter))?;

        Ok(ListenerHandle { local_addr, thread })
    }
}

fn accept_loop(listener: TcpListener, state: Arc<ServerState>, interpreter: Arc<Interpreter>) {
    for stream in listener.incoming() {
        // Admission closes only at shutdown; stop listening then.
        if !state.is_accepting() {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("accept failed: {err}");
                continue;
            }
        };
        match state.register(&stream) {
            Ok(Some(registration)) => {
                if let Err(err) =
                    worker::spawn(stream, registration, state.clone(), interpreter.clone())
                {
                    tracing::error!("failed to spawn worker: {err}");
                }
            }
            // Not admitted: the connection closes here, unregistered.
            Ok(None) => {
                tracing::debug!("connection refused, admissions closed");
            }
            Err(err) => {
                tracing::warn!("failed to register connection: {err}");
            }
        }
    }
    tracing::debug!("acceptor stopped");
}

/// Handle to the running acceptor thread
pub struct ListenerHandle {
    local_addr: SocketAddr,
    thread: JoinHandle<()>,
}

impl ListenerHandle {
    /// The bound address (useful with a `:0` listen port)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the acceptor after admissions have been closed
    ///
    /// Blocking `accept` has no cancellation point, so a throwaway local
    /// connection nudges the loop into observing the closed admission flag.
    pub fn stop(self) {
        if TcpStream::connect(self.local_addr).is_ok() {
            let _ = self.thread.join();
        }
        // If the nudge fails the listener is unreachable anyway; the thread
        // exits with the process.
    }
}

//! Worker lifecycle
//!
//! One thread per client connection:
//! `Admitted -> Registered -> Serving -> Terminating -> Gone`.
//!
//! Admission/registration happen on the acceptor (see [`super::Server`]);
//! this module owns the serve loop and the guarantee that deregistration
//! happens exactly once on every exit path.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use crate::command::Interpreter;

use super::state::{CancelToken, Registration, ServerState, WorkerId};

/// Removes the worker from the registry when the serve loop exits
///
/// Drop-based so removal runs exactly once on every path out of the thread,
/// including cancellation and panic.
struct Deregister {
    state: Arc<ServerState>,
    id: WorkerId,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.state.deregister(self.id);
        tracing::debug!(worker = self.id, "worker gone");
    }
}

/// Spawn the serve thread for a registered connection
///
/// The thread is detached; the registry is the ground truth for liveness. A
/// failed spawn deregisters immediately so the registry cannot hold a
/// phantom worker.
pub fn spawn(
    stream: TcpStream,
    registration: Registration,
    state: Arc<ServerState>,
    interpreter: Arc<Interpreter>,
) -> io::Result<()> {
    let Registration { id, cancel } = registration;
    let thread_state = state.clone();
    let spawned = thread::Builder::new()
        .name(format!("worker-{id}"))
        .spawn(move || serve(stream, id, cancel, thread_state, interpreter));

    match spawned {
        Ok(_handle) => Ok(()),
        Err(err) => {
            state.deregister(id);
            Err(err)
        }
    }
}

/// The serve loop: read a line, pass the gate, interpret, reply
fn serve(
    stream: TcpStream,
    id: WorkerId,
    cancel: CancelToken,
    state: Arc<ServerState>,
    interpreter: Arc<Interpreter>,
) {
    let _deregister = Deregister {
        state: state.clone(),
        id,
    };

    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::debug!(worker = id, %peer, "connection established");

    let mut reader = match stream.try_clone() {
        Ok(read_half) => BufReader::new(read_half),
        Err(err) => {
            tracing::warn!(worker = id, %peer, "failed to split stream: {err}");
            return;
        }
    };
    let mut writer = BufWriter::new(stream);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            // End of stream: the client is done, or a canceller shut the
            // socket down.
            Ok(0) => {
                tracing::debug!(worker = id, %peer, "client disconnected");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(worker = id, %peer, "read ended: {err}");
                break;
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        // May block until the console releases the gate; a cancellation
        // raised meanwhile wakes it.
        state.gate().wait_until_released(&cancel);
        if cancel.is_cancelled() {
            break;
        }

        let reply = interpreter.execute(line.trim_end(), &cancel);

        let written = writer
            .write_all(reply.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(err) = written {
            tracing::debug!(worker = id, %peer, "write ended: {err}");
            break;
        }
    }
}

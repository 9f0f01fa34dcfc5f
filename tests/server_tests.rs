//! Server integration tests
//!
//! Tests verify:
//! - Round trips through real TCP connections and worker threads
//! - Stop/go gating of in-flight commands
//! - Mass-disconnect isolation (current clients close, new ones admitted)
//! - Admission gating and shutdown ordering

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cedarkv::server::{spawn_monitor, ListenerHandle, Server, ServerState};
use cedarkv::{Config, Tree};

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    tree: Arc<Tree>,
    state: Arc<ServerState>,
    addr: SocketAddr,
    listener: ListenerHandle,
}

fn start_server() -> TestServer {
    let config = Config::builder().listen_addr("127.0.0.1:0").build();
    let tree = Arc::new(Tree::new());
    let state = Arc::new(ServerState::new());
    let server = Server::new(config, tree.clone(), state.clone());
    let listener = server.start().unwrap();
    let addr = listener.local_addr();
    TestServer {
        tree,
        state,
        addr,
        listener,
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { reader, stream }
    }

    fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).unwrap();
        self.stream.write_all(b"\n").unwrap();
        self.stream.flush().unwrap();
    }

    /// Read one reply line; `Ok(None)` means the server closed the stream
    fn read_reply(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        match self.reader.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line.trim_end().to_string())),
        }
    }

    fn request(&mut self, line: &str) -> String {
        self.send(line);
        self.read_reply().unwrap().expect("server closed stream")
    }
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// A connected socket pair, for registering a synthetic worker
fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_round_trip_over_tcp() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.request("a x 1"), "added");
    assert_eq!(client.request("q x"), "1");
    assert_eq!(client.request("a x 1"), "already in database");
    assert_eq!(client.request("d x"), "removed");
    assert_eq!(client.request("q x"), "not found");
    assert_eq!(client.request("d y"), "not in database");
    assert_eq!(client.request("zz"), "ill-formed command");
}

#[test]
fn test_multiple_clients_share_the_store() {
    let server = start_server();
    let mut first = Client::connect(server.addr);
    let mut second = Client::connect(server.addr);

    assert_eq!(first.request("a shared 42"), "added");
    assert_eq!(second.request("q shared"), "42");
    assert_eq!(second.request("d shared"), "removed");
    assert_eq!(first.request("q shared"), "not found");
}

#[test]
fn test_registry_tracks_connections() {
    let server = start_server();

    let mut client = Client::connect(server.addr);
    assert_eq!(client.request("a x 1"), "added");
    assert_eq!(server.state.active_workers(), 1);

    drop(client);
    assert!(wait_until(
        || server.state.active_workers() == 0,
        Duration::from_secs(2)
    ));
}

// =============================================================================
// Stop/Go Tests
// =============================================================================

#[test]
fn test_stopped_gate_withholds_replies() {
    let server = start_server();
    let mut client = Client::connect(server.addr);
    assert_eq!(client.request("a warm 1"), "added");

    server.state.gate().stop();
    client.send("a x 1");

    // No reply may arrive while the gate is down.
    client
        .stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let err = client.read_reply().unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
        "unexpected error: {err}"
    );

    client.stream.set_read_timeout(None).unwrap();
    server.state.gate().release();
    assert_eq!(client.read_reply().unwrap(), Some("added".to_string()));
    assert_eq!(server.tree.get("x"), Some("1".to_string()));
}

#[test]
fn test_single_release_resumes_all_workers() {
    let server = start_server();
    let mut first = Client::connect(server.addr);
    let mut second = Client::connect(server.addr);
    assert_eq!(first.request("a warm1 1"), "added");
    assert_eq!(second.request("a warm2 1"), "added");

    server.state.gate().stop();
    first.send("a k1 v1");
    second.send("a k2 v2");

    // Both workers must be parked at the gate before the release.
    thread::sleep(Duration::from_millis(100));
    assert!(server.tree.get("k1").is_none());
    assert!(server.tree.get("k2").is_none());

    server.state.gate().release();
    assert_eq!(first.read_reply().unwrap(), Some("added".to_string()));
    assert_eq!(second.read_reply().unwrap(), Some("added".to_string()));
}

// =============================================================================
// Mass-Disconnect Tests
// =============================================================================

#[test]
fn test_mass_disconnect_leaves_admissions_open() {
    let server = start_server();
    let mut client = Client::connect(server.addr);
    assert_eq!(client.request("a x 1"), "added");

    server.state.cancel_workers();

    // The current connection closes...
    assert!(matches!(client.read_reply(), Ok(None) | Err(_)));
    assert!(wait_until(
        || server.state.active_workers() == 0,
        Duration::from_secs(2)
    ));

    // ...while a new one is admitted immediately and sees the same store.
    let mut fresh = Client::connect(server.addr);
    assert_eq!(fresh.request("q x"), "1");
    assert_eq!(fresh.request("a y 2"), "added");
}

#[test]
fn test_mass_disconnect_frees_a_gated_worker() {
    let server = start_server();
    let mut client = Client::connect(server.addr);
    assert_eq!(client.request("a warm 1"), "added");

    // Park the worker at the gate with a command in flight.
    server.state.gate().stop();
    client.send("a x 1");
    thread::sleep(Duration::from_millis(100));

    server.state.cancel_workers();
    assert!(wait_until(
        || server.state.active_workers() == 0,
        Duration::from_secs(2)
    ));

    // The gate is still down; the worker left without executing.
    assert!(server.state.gate().is_paused());
    assert!(server.tree.get("x").is_none());
}

#[test]
fn test_sigint_triggers_mass_disconnect() {
    let server = start_server();
    let monitor = spawn_monitor(server.state.clone()).unwrap();

    let mut client = Client::connect(server.addr);
    assert_eq!(client.request("a x 1"), "added");

    signal_hook::low_level::raise(signal_hook::consts::SIGINT).unwrap();

    assert!(matches!(client.read_reply(), Ok(None) | Err(_)));
    assert!(wait_until(
        || server.state.active_workers() == 0,
        Duration::from_secs(2)
    ));

    // The server itself survives the interrupt.
    let mut fresh = Client::connect(server.addr);
    assert_eq!(fresh.request("q x"), "1");

    monitor.shutdown();
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_closes_admissions() {
    let server = start_server();

    server.state.begin_shutdown();
    assert!(!server.state.is_accepting());

    // A late connection is dropped unregistered.
    let mut late = Client::connect(server.addr);
    assert!(matches!(late.read_reply(), Ok(None) | Err(_)));
    assert_eq!(server.state.active_workers(), 0);

    server.listener.stop();
}

#[test]
fn test_shutdown_drains_connected_workers() {
    let server = start_server();
    let mut client = Client::connect(server.addr);
    assert_eq!(client.request("a x 1"), "added");

    server.state.begin_shutdown();
    assert!(matches!(client.read_reply(), Ok(None) | Err(_)));

    server.state.wait_idle();
    assert_eq!(server.state.active_workers(), 0);

    // Only now may teardown run.
    server.tree.clear();
    assert!(server.tree.is_empty());
    server.listener.stop();
}

#[test]
fn test_teardown_blocks_on_a_slow_worker() {
    let state = Arc::new(ServerState::new());

    // Inject a worker that stays registered until we say otherwise.
    let (stream, _peer) = socket_pair();
    let registration = state.register(&stream).unwrap().unwrap();
    assert_eq!(state.active_workers(), 1);

    let (done_tx, done_rx) = mpsc::channel();
    let waiter_state = state.clone();
    thread::spawn(move || {
        waiter_state.wait_idle();
        done_tx.send(()).unwrap();
    });

    // The shutdown waiter must not proceed while the worker is registered.
    assert!(done_rx
        .recv_timeout(Duration::from_millis(200))
        .is_err());

    state.deregister(registration.id);
    assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
}

//! cedarkv Server Binary
//!
//! Starts the TCP server and runs the administrative console on stdin.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use cedarkv::config::DEFAULT_MAX_TOKEN_LEN;
use cedarkv::server::{spawn_monitor, Server, ServerState};
use cedarkv::{Config, Tree};

/// cedarkv Server
#[derive(Parser, Debug)]
#[command(name = "cedarkv-server")]
#[command(about = "Concurrent in-memory key-value store")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    listen: String,

    /// Maximum key/value token length in bytes
    #[arg(short = 't', long, default_value_t = DEFAULT_MAX_TOKEN_LEN)]
    max_token_len: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cedarkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("cedarkv Server v{}", cedarkv::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .listen_addr(&args.listen)
        .max_token_len(args.max_token_len)
        .build();

    let tree = Arc::new(Tree::with_token_limit(config.max_token_len));
    let state = Arc::new(ServerState::new());

    // The signal monitor comes up before the listener so no early connection
    // can observe an unmonitored SIGINT window.
    let monitor = match spawn_monitor(state.clone()) {
        Ok(monitor) => monitor,
        Err(err) => {
            tracing::error!("failed to start signal monitor: {err}");
            std::process::exit(1);
        }
    };

    let server = Server::new(config, tree.clone(), state.clone());
    let listener = match server.start() {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to start listener: {err}");
            std::process::exit(1);
        }
    };

    console_loop(&state, &tree);

    // Console EOF: close admissions, cancel current workers, and only once
    // the registry drains may the tree come down.
    state.begin_shutdown();
    state.wait_idle();
    monitor.shutdown();
    tree.clear();
    listener.stop();
    tracing::info!("exiting database");
}

/// Administrative console: `s` stop, `g` release, `p [file]` dump
fn console_loop(state: &ServerState, tree: &Tree) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::error!("console read failed: {err}");
                break;
            }
        };

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("s") => {
                tracing::info!("stopping all clients");
                state.gate().stop();
            }
            Some("g") => {
                tracing::info!("releasing all clients");
                state.gate().release();
            }
            Some("p") => dump_tree(tree, tokens.next()),
            Some(other) => {
                tracing::debug!("unknown console command: {other}");
            }
            None => {}
        }
    }
}

/// Dump the tree to the named file, or stdout when no name is given
fn dump_tree(tree: &Tree, filename: Option<&str>) {
    let result = match filename {
        Some(path) => {
            std::fs::File::create(path).and_then(|mut file| tree.dump(&mut file))
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            tree.dump(&mut out).and_then(|_| out.flush())
        }
    };
    if let Err(err) = result {
        tracing::error!("print failed: {err}");
    }
}

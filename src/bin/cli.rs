//! cedarkv CLI Client
//!
//! Interactive line-protocol client: forwards stdin lines to the server and
//! prints each reply.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;

use clap::Parser;

/// cedarkv CLI
#[derive(Parser, Debug)]
#[command(name = "cedarkv-cli")]
#[command(about = "Line-protocol client for cedarkv")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    server: String,
}

fn main() {
    let args = Args::parse();

    let stream = match TcpStream::connect(&args.server) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("failed to connect to {}: {err}", args.server);
            std::process::exit(1);
        }
    };

    let read_half = match stream.try_clone() {
        Ok(read_half) => read_half,
        Err(err) => {
            eprintln!("failed to split stream: {err}");
            std::process::exit(1);
        }
    };
    let mut replies = BufReader::new(read_half);
    let mut requests = BufWriter::new(stream);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };

        let sent = requests
            .write_all(line.as_bytes())
            .and_then(|_| requests.write_all(b"\n"))
            .and_then(|_| requests.flush());
        if let Err(err) = sent {
            eprintln!("send failed: {err}");
            std::process::exit(1);
        }

        let mut reply = String::new();
        match replies.read_line(&mut reply) {
            Ok(0) => {
                eprintln!("server closed the connection");
                std::process::exit(1);
            }
            Ok(_) => print!("{reply}"),
            Err(err) => {
                eprintln!("receive failed: {err}");
                std::process::exit(1);
            }
        }
    }
}

//! Command Interpreter
//!
//! Maps one line of client text to a tree operation and a reply string.
//!
//! ## Wire Protocol (one command per line)
//!
//! The first character selects the verb; tokens are whitespace-free and at
//! most the configured token limit in bytes:
//!
//! | Verb | Syntax            | Success reply    | Failure reply         |
//! |------|-------------------|------------------|-----------------------|
//! | q    | `q <key>`         | `<value>`        | `not found`           |
//! | a    | `a <key> <value>` | `added`          | `already in database` |
//! | d    | `d <key>`         | `removed`        | `not in database`     |
//! | f    | `f <filename>`    | `file processed` | `bad file name`       |
//!
//! Anything else (unknown verb, missing tokens, over-limit tokens, lines
//! shorter than two bytes) is `ill-formed command` and never touches the
//! tree. Interpreter errors never unwind past the serve loop; they are reply
//! strings.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use crate::error::CedarError;
use crate::server::CancelToken;
use crate::tree::Tree;

/// Reply strings of the wire protocol
pub mod reply {
    pub const ADDED: &str = "added";
    pub const ALREADY_IN_DB: &str = "already in database";
    pub const REMOVED: &str = "removed";
    pub const NOT_IN_DB: &str = "not in database";
    pub const NOT_FOUND: &str = "not found";
    pub const ILL_FORMED: &str = "ill-formed command";
    pub const BAD_FILE: &str = "bad file name";
    pub const FILE_PROCESSED: &str = "file processed";
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Look up a key
    Query { key: String },

    /// Add a key/value pair
    Add { key: String, value: String },

    /// Delete a key
    Delete { key: String },

    /// Execute each line of a file as a command, silently, in order
    Batch { path: String },
}

impl Command {
    /// Parse a single command line
    ///
    /// Returns `None` for anything ill-formed. Extra trailing tokens are
    /// ignored.
    pub fn parse(line: &str, max_token_len: usize) -> Option<Command> {
        if line.len() <= 1 {
            return None;
        }
        let mut chars = line.chars();
        let verb = chars.next()?;
        let rest = chars.as_str();

        let mut tokens = rest.split_whitespace();
        let mut next_token = || {
            tokens
                .next()
                .filter(|token| token.len() <= max_token_len)
                .map(str::to_string)
        };

        match verb {
            'q' => Some(Command::Query { key: next_token()? }),
            'a' => Some(Command::Add {
                key: next_token()?,
                value: next_token()?,
            }),
            'd' => Some(Command::Delete { key: next_token()? }),
            'f' => Some(Command::Batch { path: next_token()? }),
            _ => None,
        }
    }
}

/// Executes parsed commands against the tree
pub struct Interpreter {
    tree: Arc<Tree>,
}

impl Interpreter {
    pub fn new(tree: Arc<Tree>) -> Self {
        Self { tree }
    }

    /// Interpret one command line and produce the reply
    ///
    /// `cancel` is polled between batch-file lines so a mass-disconnect is
    /// honoured mid-file.
    pub fn execute(&self, line: &str, cancel: &CancelToken) -> String {
        let Some(command) = Command::parse(line, self.tree.token_limit()) else {
            return reply::ILL_FORMED.to_string();
        };

        match command {
            Command::Query { key } => self
                .tree
                .get(&key)
                .unwrap_or_else(|| reply::NOT_FOUND.to_string()),

            Command::Add { key, value } => match self.tree.insert(&key, &value) {
                Ok(()) => reply::ADDED.to_string(),
                Err(CedarError::DuplicateKey) => reply::ALREADY_IN_DB.to_string(),
                // Validation failures never partially mutate the tree.
                Err(_) => reply::ILL_FORMED.to_string(),
            },

            Command::Delete { key } => match self.tree.remove(&key) {
                Ok(()) => reply::REMOVED.to_string(),
                Err(_) => reply::NOT_IN_DB.to_string(),
            },

            Command::Batch { path } => self.run_batch(&path, cancel),
        }
    }

    /// Run every line of a file as a command, discarding the replies
    fn run_batch(&self, path: &str, cancel: &CancelToken) -> String {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                tracing::debug!(path, "batch open failed: {err}");
                return reply::BAD_FILE.to_string();
            }
        };

        for line in BufReader::new(file).lines() {
            // Reading a file is not a cancellation point; poll between lines.
            if cancel.is_cancelled() {
                break;
            }
            let Ok(line) = line else { break };
            let _ = self.execute(line.trim_end_matches('\r'), cancel);
        }
        reply::FILE_PROCESSED.to_string()
    }
}

//! Tree Module
//!
//! The in-memory store: a binary search tree with one reader/writer lock per
//! node.
//!
//! ## Concurrency Model: Lock Coupling
//!
//! There is no global store lock. Every traversal (lookup, insert, delete)
//! walks the tree hand-over-hand: the child's lock is acquired *before* the
//! parent's is released, so no step has a window where neither is held.
//! Traversals only ever move away from the root and never re-lock an
//! ancestor, which keeps the protocol deadlock-free.
//!
//! Lookups couple in read mode; insert and delete couple in write mode
//! because the last node touched needs exclusive access (attaching a new
//! child, or detaching a found node).
//!
//! Node-level operations are linearizable with respect to all other lock
//! holders, but the tree as a whole is not globally serializable: two inserts
//! on unrelated subtrees can interleave freely.

mod node;
mod store;

pub use node::{Dir, NodeBody, NodeRef, ReadGuard, WriteGuard};
pub use store::Tree;

//! Tree engine
//!
//! Lock-coupled lookup, insert, delete-with-successor-splicing, whole-tree
//! dump, and teardown.
//!
//! ## Locking
//!
//! - `get` couples in read mode and returns with no guard held.
//! - `insert`/`remove` couple in write mode; the search ends with the
//!   would-be parent (and the target, when present) write-locked.
//! - Guard release is RAII: every acquisition has a matching release on every
//!   exit path, including early returns.
//!
//! All traversal is iterative; depth is bounded by tree height but never by
//! the thread's stack.

use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

use crate::config::DEFAULT_MAX_TOKEN_LEN;
use crate::error::{CedarError, Result};

use super::node::{Dir, NodeBody, NodeRef, ReadGuard, WriteGuard};

/// Result of a write-mode lock-coupled search
///
/// `Vacant` carries the write-locked would-be parent and the side the key
/// belongs on; `Found` additionally carries the write-locked target.
enum WriteSearch {
    Found {
        parent: WriteGuard,
        dir: Dir,
        target: WriteGuard,
    },
    Vacant {
        parent: WriteGuard,
        dir: Dir,
    },
}

/// Frame of the iterative pre-order dump
///
/// `Exit` keeps a node read-locked until both of its subtrees have been
/// emitted, matching the traversal's snapshot discipline.
enum DumpFrame {
    Enter(Option<NodeRef>, usize),
    Exit(ReadGuard),
}

/// Frame of the iterative in-order walk
enum WalkFrame {
    Enter(NodeRef),
    Emit(ReadGuard),
}

/// The concurrent binary search tree
///
/// The root is a permanent sentinel with an empty key; it anchors traversal
/// and is never removed. All data hangs below it.
pub struct Tree {
    root: NodeRef,
    max_token_len: usize,
}

impl Tree {
    /// Create an empty tree with the default token limit
    pub fn new() -> Self {
        Self::with_token_limit(DEFAULT_MAX_TOKEN_LEN)
    }

    /// Create an empty tree with the given key/value length limit (bytes)
    pub fn with_token_limit(max_token_len: usize) -> Self {
        Self {
            root: NodeBody::sentinel(),
            max_token_len,
        }
    }

    /// The configured key/value length limit
    pub fn token_limit(&self) -> usize {
        self.max_token_len
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Look up a key, returning its value
    ///
    /// Read-mode lock coupling from the sentinel down; returns with no guard
    /// held.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut parent: ReadGuard = self.root.read_arc();
        loop {
            let dir = parent.side_for(key);
            let child = parent.child(dir)?.clone();
            let node = child.read_arc();
            if node.key == key {
                return Some(node.value.clone());
            }
            // Assignment drops the old parent guard after the child is held.
            parent = node;
        }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert a new key/value pair
    ///
    /// Token limits are enforced before any lock is taken. Fails with
    /// [`CedarError::DuplicateKey`] if the key exists (no mutation).
    pub fn insert(&self, key: &str, value: &str) -> Result<()> {
        self.validate_token(key)?;
        self.validate_token(value)?;

        match self.locate_write(key) {
            WriteSearch::Found { .. } => Err(CedarError::DuplicateKey),
            WriteSearch::Vacant { mut parent, dir } => {
                *parent.child_mut(dir) = Some(NodeBody::leaf(key, value));
                Ok(())
            }
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a key
    ///
    /// Fails with [`CedarError::KeyNotFound`] if absent. A node with two
    /// children is emptied in place via its in-order successor rather than
    /// unlinked.
    pub fn remove(&self, key: &str) -> Result<()> {
        let (mut parent, dir, mut target) = match self.locate_write(key) {
            WriteSearch::Vacant { .. } => return Err(CedarError::KeyNotFound),
            WriteSearch::Found {
                parent,
                dir,
                target,
            } => (parent, dir, target),
        };

        match (target.left.is_some(), target.right.clone()) {
            // No right child: the left child (possibly none) takes the slot.
            (_, None) => {
                *parent.child_mut(dir) = target.left.take();
            }
            // No left child: symmetric.
            (false, Some(_)) => {
                *parent.child_mut(dir) = target.right.take();
            }
            // Two children: the target stays in place, so the parent's slot
            // is untouched and its lock is not needed past this point.
            (true, Some(first_right)) => {
                drop(parent);
                Self::splice_successor(&mut target, first_right);
            }
        }
        // Guards drop here; a detached node frees with its last reference.
        Ok(())
    }

    /// Replace `target`'s content with its in-order successor's and unlink
    /// the successor node
    ///
    /// The successor is the left-most node of the right subtree. The hunt
    /// write-couples down the left-child chain holding the chain node *and*
    /// its chain parent; the chain parent's left slot is the one patched, so
    /// it must still be locked at patch time.
    fn splice_successor(target: &mut WriteGuard, first_right: NodeRef) {
        let mut succ = first_right.write_arc();
        // None: the chain parent is the target itself.
        let mut chain_parent: Option<WriteGuard> = None;
        while let Some(next) = succ.left.clone() {
            let next = next.write_arc();
            // The old chain parent unlocks once its grandchild is held.
            chain_parent = Some(mem::replace(&mut succ, next));
        }

        // The successor is strictly greater than everything in the target's
        // left subtree and strictly less than everything remaining in its own
        // former right subtree, so moving it preserves BST order.
        target.key = mem::take(&mut succ.key);
        target.value = mem::take(&mut succ.value);
        let orphan = succ.right.take();
        match chain_parent {
            Some(mut parent) => parent.left = orphan,
            None => target.right = orphan,
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Dump the tree pre-order to `out`
    ///
    /// One line per node, indented one space per level: `(root)` for the
    /// sentinel, `key value` for data nodes, `(null)` for empty child slots.
    /// Each node stays read-locked until both subtrees have been written.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut stack = vec![DumpFrame::Enter(Some(self.root.clone()), 0)];
        while let Some(frame) = stack.pop() {
            match frame {
                DumpFrame::Enter(None, depth) => {
                    writeln!(out, "{:depth$}(null)", "")?;
                }
                DumpFrame::Enter(Some(node), depth) => {
                    let guard = node.read_arc();
                    if guard.is_sentinel() {
                        writeln!(out, "{:depth$}(root)", "")?;
                    } else {
                        writeln!(out, "{:depth$}{} {}", "", guard.key, guard.value)?;
                    }
                    let left = guard.left.clone();
                    let right = guard.right.clone();
                    stack.push(DumpFrame::Exit(guard));
                    stack.push(DumpFrame::Enter(right, depth + 1));
                    stack.push(DumpFrame::Enter(left, depth + 1));
                }
                DumpFrame::Exit(guard) => drop(guard),
            }
        }
        Ok(())
    }

    /// Collect all `(key, value)` pairs in key order
    ///
    /// Diagnostic walk under per-node read locks; concurrent writers may
    /// interleave between nodes.
    pub fn in_order(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut stack = vec![WalkFrame::Enter(self.root.clone())];
        while let Some(frame) = stack.pop() {
            match frame {
                WalkFrame::Enter(node) => {
                    let guard = node.read_arc();
                    let left = guard.left.clone();
                    stack.push(WalkFrame::Emit(guard));
                    if let Some(left) = left {
                        stack.push(WalkFrame::Enter(left));
                    }
                }
                WalkFrame::Emit(guard) => {
                    if !guard.is_sentinel() {
                        pairs.push((guard.key.clone(), guard.value.clone()));
                    }
                    if let Some(right) = guard.right.clone() {
                        stack.push(WalkFrame::Enter(right));
                    }
                }
            }
        }
        pairs
    }

    /// Number of stored pairs
    pub fn len(&self) -> usize {
        self.in_order().len()
    }

    /// True when no data nodes exist
    pub fn is_empty(&self) -> bool {
        let root = self.root.read();
        root.left.is_none() && root.right.is_none()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Destroy every node below the sentinel
    ///
    /// Precondition: no worker may still be traversing; the shutdown
    /// sequence only calls this after the registry drains. Nodes are claimed
    /// by unwrapping their shared ownership rather than locking; a node that
    /// is still shared is an invariant violation and is left to its holder.
    pub fn clear(&self) {
        let mut pending: Vec<NodeRef> = Vec::new();
        {
            let mut root = self.root.write();
            pending.extend(root.left.take());
            pending.extend(root.right.take());
        }
        // Post-order by construction: a node is only dropped after its child
        // slots have been emptied, so no drop can recurse.
        while let Some(node) = pending.pop() {
            match Arc::try_unwrap(node) {
                Ok(cell) => {
                    let body = cell.into_inner();
                    pending.extend(body.left);
                    pending.extend(body.right);
                }
                Err(shared) => {
                    tracing::error!(
                        "node still shared during teardown; leaving it to its holder"
                    );
                    let mut guard = shared.write();
                    pending.extend(guard.left.take());
                    pending.extend(guard.right.take());
                }
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn validate_token(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(CedarError::EmptyToken);
        }
        if token.len() > self.max_token_len {
            return Err(CedarError::TokenTooLong {
                len: token.len(),
                max: self.max_token_len,
            });
        }
        Ok(())
    }

    /// Write-mode lock-coupled search from the sentinel
    fn locate_write(&self, key: &str) -> WriteSearch {
        let mut parent: WriteGuard = self.root.write_arc();
        loop {
            let dir = parent.side_for(key);
            let child = match parent.child(dir) {
                Some(child) => child.clone(),
                None => return WriteSearch::Vacant { parent, dir },
            };
            let node = child.write_arc();
            if node.key == key {
                return WriteSearch::Found {
                    parent,
                    dir,
                    target: node,
                };
            }
            // Hand-over-hand: the old parent unlocks after the child is held.
            parent = node;
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Tree {
    /// Iterative teardown so deep trees cannot overflow the stack on drop
    fn drop(&mut self) {
        self.clear();
    }
}

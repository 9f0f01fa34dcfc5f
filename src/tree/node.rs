//! Node definitions
//!
//! A single key/value record with two owned child slots and its own
//! reader/writer lock. The lock guards the key, the value, and both child
//! slots together.

use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

/// Shared handle to a node
///
/// Children are owned through this type; traversal clones the handle so a
/// child's guard stays valid after the parent's guard is dropped.
pub type NodeRef = Arc<RwLock<NodeBody>>;

/// Owned read guard over a node (valid independent of the parent's guard)
pub type ReadGuard = ArcRwLockReadGuard<RawRwLock, NodeBody>;

/// Owned write guard over a node
pub type WriteGuard = ArcRwLockWriteGuard<RawRwLock, NodeBody>;

/// Which child slot a traversal step follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Left,
    Right,
}

/// The lock-protected contents of a node
#[derive(Debug)]
pub struct NodeBody {
    /// Key; empty only on the root sentinel
    pub key: String,

    /// Stored value
    pub value: String,

    /// Left child (all keys strictly less than `key`)
    pub left: Option<NodeRef>,

    /// Right child (all keys strictly greater than `key`)
    pub right: Option<NodeRef>,
}

impl NodeBody {
    /// Allocate a new childless node
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> NodeRef {
        Arc::new(RwLock::new(NodeBody {
            key: key.into(),
            value: value.into(),
            left: None,
            right: None,
        }))
    }

    /// Allocate the permanent root sentinel
    ///
    /// The sentinel's key is empty; real keys are non-empty and so always
    /// compare greater, anchoring all data under the right slot.
    pub fn sentinel() -> NodeRef {
        Self::leaf("", "")
    }

    /// True only for the root sentinel
    pub fn is_sentinel(&self) -> bool {
        self.key.is_empty()
    }

    /// The child slot on the given side
    pub fn child(&self, dir: Dir) -> Option<&NodeRef> {
        match dir {
            Dir::Left => self.left.as_ref(),
            Dir::Right => self.right.as_ref(),
        }
    }

    /// Mutable access to the child slot on the given side
    pub fn child_mut(&mut self, dir: Dir) -> &mut Option<NodeRef> {
        match dir {
            Dir::Left => &mut self.left,
            Dir::Right => &mut self.right,
        }
    }

    /// The side of this node the given key belongs on
    ///
    /// Callers check key equality against the *child* after locking it; a
    /// node never compares equal to its own traversal key here.
    pub fn side_for(&self, key: &str) -> Dir {
        if key < self.key.as_str() {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

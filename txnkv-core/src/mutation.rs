use core::fmt;

use crate::{Key, Timestamp, Value};

/// The write a prewrite installs for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put(Value),
    Delete,
    /// Lock-only record: the key was locked but not written.
    Lock,
}

/// A buffered write shipped to the cluster in a prewrite request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub key: Key,
    pub op: Op,
    /// The key already carries a pessimistic lock of this transaction, so the prewrite
    /// converts that lock instead of checking for write conflicts again.
    pub pessimistic: bool,
}

impl Mutation {
    pub fn put(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            op: Op::Put(value.into()),
            pessimistic: false,
        }
    }

    pub fn delete(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            op: Op::Delete,
            pessimistic: false,
        }
    }

    pub fn lock(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            op: Op::Lock,
            pessimistic: false,
        }
    }

    pub fn with_pessimistic(mut self, pessimistic: bool) -> Self {
        self.pessimistic = pessimistic;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Put,
    Delete,
    Lock,
    Pessimistic,
}

impl From<&Op> for LockKind {
    fn from(op: &Op) -> Self {
        match op {
            Op::Put(_) => LockKind::Put,
            Op::Delete => LockKind::Delete,
            Op::Lock => LockKind::Lock,
        }
    }
}

/// A lock observed at the cluster, as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub key: Key,
    pub primary: Key,
    pub start_ts: Timestamp,
    pub kind: LockKind,
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} lock on {} (primary {}, start_ts {})",
            self.kind, self.key, self.primary, self.start_ts
        )
    }
}

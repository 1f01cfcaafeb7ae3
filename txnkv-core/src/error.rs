use thiserror::Error;

use crate::{Key, LockInfo, Timestamp};

/// Errors reported by a [`ClusterFacade`](crate::ClusterFacade).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Another transaction holds a lock the request cannot get past.
    #[error("key is locked: {0}")]
    KeyLocked(LockInfo),
    /// A write committed at or after the requester's snapshot.
    #[error("write conflict on {key}: start_ts {start_ts}, conflicting commit_ts {conflict_commit_ts}")]
    WriteConflict {
        key: Key,
        start_ts: Timestamp,
        conflict_commit_ts: Timestamp,
    },
    /// Commit found neither the lock nor a commit record of the transaction.
    #[error("lock of transaction {start_ts} on {key} not found")]
    LockNotFound { key: Key, start_ts: Timestamp },
    /// The transaction was rolled back, either by its owner or by a lock resolver.
    #[error("transaction {start_ts} was rolled back (key {key})")]
    RolledBack { key: Key, start_ts: Timestamp },
    /// A secondary key was asked to commit before its primary committed at `commit_ts`.
    #[error("primary {primary} of transaction {start_ts} has not committed at {commit_ts} (key {key})")]
    PrimaryNotCommitted {
        key: Key,
        primary: Key,
        start_ts: Timestamp,
        commit_ts: Timestamp,
    },
    /// Transport failure, timeout or unreachable region.
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        ClusterError::Unavailable(msg.into())
    }
}

use core::fmt;

use thiserror::Error;
use txnkv_core::{ClusterError, Key, Timestamp};

/// Which side of a split commit a participant plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

/// Progress of a commit that has started but not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Prewrite requests are in flight.
    Prewriting,
    /// Every lock of this participant is installed.
    Prewritten(Role),
    /// The primary key is committed; only secondaries remain.
    PrimaryCommitted,
}

/// Lifecycle of a [`Transaction`](crate::transaction::Transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committing(CommitPhase),
    Committed,
    RolledBack,
    Failed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack | TransactionState::Failed
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => f.write_str("active"),
            TransactionState::Committing(CommitPhase::Prewriting) => f.write_str("prewriting"),
            TransactionState::Committing(CommitPhase::Prewritten(Role::Primary)) => {
                f.write_str("prewritten (primary)")
            }
            TransactionState::Committing(CommitPhase::Prewritten(Role::Secondary)) => {
                f.write_str("prewritten (secondary)")
            }
            TransactionState::Committing(CommitPhase::PrimaryCommitted) => {
                f.write_str("primary committed")
            }
            TransactionState::Committed => f.write_str("committed"),
            TransactionState::RolledBack => f.write_str("rolled back"),
            TransactionState::Failed => f.write_str("failed"),
        }
    }
}

/// Outcome of a primary or secondary prewrite in the split commit protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrewriteResult {
    /// The primary key every participant's locks point at.
    pub key: Key,
    /// The start timestamp shared by every participant.
    pub start_ts: Timestamp,
}

/// Crate-local error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The operation is not allowed in the transaction's current state.
    #[error("cannot {operation} a transaction that is {state}")]
    InvalidState {
        operation: &'static str,
        state: TransactionState,
    },
    /// Another transaction wrote or locked the key first; the transaction is aborted.
    #[error("write conflict on {key} (start_ts {start_ts})")]
    WriteConflict {
        key: Key,
        start_ts: Timestamp,
        conflict_ts: Option<Timestamp>,
    },
    /// A lock held by another transaction did not clear within the backoff budget.
    #[error("key {key} is locked by transaction {holder_start_ts}")]
    LockContention {
        key: Key,
        holder_start_ts: Timestamp,
    },
    /// A split commit step was called out of order.
    #[error("{operation} is out of order for a transaction that is {state}")]
    ProtocolOrderViolation {
        operation: &'static str,
        state: TransactionState,
    },
    /// Transport failure or timeout talking to the cluster.
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
    /// The primary committed but committing secondaries failed. The transaction is
    /// committed; readers resolve the remaining locks through the primary.
    #[error("committed at {commit_ts} but secondary commit failed: {source}")]
    CommitAmbiguous {
        commit_ts: Timestamp,
        #[source]
        source: ClusterError,
    },
    /// Client configuration rejected before connecting.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

impl From<ClusterError> for Error {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::KeyLocked(lock) => Error::LockContention {
                key: lock.key,
                holder_start_ts: lock.start_ts,
            },
            ClusterError::WriteConflict {
                key,
                start_ts,
                conflict_commit_ts,
            } => Error::WriteConflict {
                key,
                start_ts,
                conflict_ts: Some(conflict_commit_ts),
            },
            ClusterError::LockNotFound { key, start_ts }
            | ClusterError::RolledBack { key, start_ts } => Error::WriteConflict {
                key,
                start_ts,
                conflict_ts: None,
            },
            ClusterError::PrimaryNotCommitted { .. } => Error::ProtocolOrderViolation {
                operation: "commit_secondary",
                state: TransactionState::Committing(CommitPhase::Prewritten(Role::Secondary)),
            },
            ClusterError::Unavailable(msg) => Error::Unavailable(msg),
        }
    }
}

impl Error {
    /// Maps a prewrite failure: a lock left in place by another transaction is a write
    /// conflict for the writer.
    pub(crate) fn from_prewrite(err: ClusterError, start_ts: Timestamp) -> Self {
        match err {
            ClusterError::KeyLocked(lock) => Error::WriteConflict {
                key: lock.key,
                start_ts,
                conflict_ts: Some(lock.start_ts),
            },
            other => other.into(),
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: TransactionState) -> Self {
        Error::InvalidState { operation, state }
    }

    /// Misuse rejections leave the transaction as it was; every other error ends it.
    pub(crate) fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidState { .. } | Error::ProtocolOrderViolation { .. }
        )
    }

    pub(crate) fn out_of_order(operation: &'static str, state: TransactionState) -> Self {
        Error::ProtocolOrderViolation { operation, state }
    }
}

//! Client-side transactions for a sharded, replicated key-value cluster.
//!
//! Transactions read with snapshot isolation and commit atomically across any number of keys
//! using Percolator-style two-phase commit. The cluster itself is reached through the
//! [`ClusterFacade`] trait; [`impls::mem::MemCluster`] is a complete in-process
//! implementation.
//!
//! ```
//! use futures_executor::block_on;
//! use txnkv::{impls::mem::MemCluster, TransactionClient};
//!
//! let client = TransactionClient::new(MemCluster::new());
//! block_on(async {
//!     let mut txn = client.begin().await?;
//!     txn.put("a", "1")?;
//!     txn.put("b", "2")?;
//!     let commit_ts = txn.commit().await?.expect("buffer was not empty");
//!
//!     let snapshot = client.snapshot().await?;
//!     assert!(snapshot.timestamp() > commit_ts);
//!     assert_eq!(snapshot.get("a").await?, Some(b"1".to_vec()));
//!     Ok::<_, txnkv::types::Error>(())
//! })
//! .unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backoff;
#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub mod blocking;
pub(crate) mod buffer;
pub mod client;
pub mod executor;
pub mod impls;
pub mod options;
pub mod snapshot;
pub mod transaction;
pub mod types;

pub use backoff::BackoffPolicy;
pub use client::{Connect, TransactionClient};
pub use options::{Config, TransactionMode, TransactionOptions};
pub use snapshot::Snapshot;
pub use transaction::Transaction;
pub use txnkv_core::{
    BoundKind, BoundRange, ClusterError, ClusterFacade, Key, KvPair, LockInfo, LockKind,
    Mutation, Op, Timestamp, Value,
};
pub use types::{Error, PrewriteResult, Result, TransactionState};

#[cfg(test)]
pub(crate) mod testing;

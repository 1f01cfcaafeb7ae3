//! An in-process cluster implementing the full Percolator protocol.
//!
//! [`MemCluster`] keeps every version in memory behind a single mutex. It resolves locks the
//! way a real cluster does (through the primary, with TTL expiry) and can inject transport
//! faults, which makes it suitable for exercising the transaction layer end to end.

mod fault;
mod store;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Instant,
};

pub use fault::{Fault, Operation};
use fault::FaultQueue;
use store::MvccStore;
use txnkv_core::{
    BoundRange, ClusterError, ClusterFacade, Key, KvPair, LockInfo, MaybeSendFuture, Mutation,
    Timestamp, Value,
};

use crate::{
    client::Connect,
    executor::{NoopTimer, Timer, TimerHandle},
    options::Config,
    types::{Error, Result},
};

struct Inner {
    store: Mutex<MvccStore>,
    oracle: AtomicU64,
    faults: Mutex<FaultQueue>,
    config: Config,
    timer: TimerHandle,
}

/// In-memory cluster. Clones share the same store.
#[derive(Clone)]
pub struct MemCluster {
    inner: Arc<Inner>,
}

impl Default for MemCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemCluster {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_timer(config, Arc::new(NoopTimer))
    }

    /// Uses `timer` to simulate [`Fault::Delay`].
    pub fn with_timer(config: Config, timer: TimerHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(MvccStore::new(config.lock_ttl)),
                oracle: AtomicU64::new(0),
                faults: Mutex::new(FaultQueue::default()),
                config,
                timer,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Arms a one-shot fault for the next call of `op`.
    pub fn inject(&self, op: Operation, fault: Fault) {
        if let Ok(mut faults) = self.inner.faults.lock() {
            faults.push(op, fault);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.inner.faults.lock() {
            faults.clear();
        }
    }

    /// Locks currently held in the store, in key order.
    pub fn locks(&self) -> Vec<LockInfo> {
        self.store().map(|store| store.locks()).unwrap_or_default()
    }

    /// Number of commit and rollback records kept for `key`.
    pub fn version_count(&self, key: impl Into<Key>) -> usize {
        let key = key.into();
        self.store()
            .map(|store| store.version_count(&key))
            .unwrap_or_default()
    }

    fn store(&self) -> Result<MutexGuard<'_, MvccStore>, ClusterError> {
        self.inner
            .store
            .lock()
            .map_err(|_| ClusterError::unavailable("store mutex poisoned"))
    }

    async fn admit(&self, op: Operation) -> Result<(), ClusterError> {
        let fault = self
            .inner
            .faults
            .lock()
            .map_err(|_| ClusterError::unavailable("fault queue poisoned"))?
            .take(op);
        match fault {
            None => Ok(()),
            Some(Fault::Unavailable) => {
                tracing::debug!(operation = ?op, "injected unavailable");
                Err(ClusterError::unavailable(format!("{op:?} rejected")))
            }
            Some(Fault::Delay(delay)) => {
                let timeout = self.inner.config.timeout;
                if delay > timeout {
                    self.inner.timer.sleep(timeout).await;
                    tracing::debug!(operation = ?op, ?timeout, "injected delay timed out");
                    Err(ClusterError::unavailable(format!(
                        "{op:?} timed out after {timeout:?}"
                    )))
                } else {
                    self.inner.timer.sleep(delay).await;
                    Ok(())
                }
            }
        }
    }
}

impl ClusterFacade for MemCluster {
    fn allocate_timestamp(
        &self,
    ) -> impl MaybeSendFuture<Output = Result<Timestamp, ClusterError>> + '_ {
        async move {
            self.admit(Operation::AllocateTimestamp).await?;
            let version = self.inner.oracle.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Timestamp::from_version(version))
        }
    }

    fn get(
        &self,
        ts: Timestamp,
        key: Key,
    ) -> impl MaybeSendFuture<Output = Result<Option<Value>, ClusterError>> + '_ {
        async move {
            self.admit(Operation::Get).await?;
            self.store()?.get(ts, &key, Instant::now())
        }
    }

    fn batch_get(
        &self,
        ts: Timestamp,
        keys: Vec<Key>,
    ) -> impl MaybeSendFuture<Output = Result<Vec<KvPair>, ClusterError>> + '_ {
        async move {
            self.admit(Operation::BatchGet).await?;
            self.store()?.batch_get(ts, keys, Instant::now())
        }
    }

    fn scan(
        &self,
        ts: Timestamp,
        range: BoundRange,
        limit: u32,
    ) -> impl MaybeSendFuture<Output = Result<Vec<KvPair>, ClusterError>> + '_ {
        async move {
            self.admit(Operation::Scan).await?;
            self.store()?.scan(ts, &range, limit, Instant::now())
        }
    }

    fn prewrite(
        &self,
        start_ts: Timestamp,
        primary: Key,
        mutations: Vec<Mutation>,
    ) -> impl MaybeSendFuture<Output = Result<(), ClusterError>> + '_ {
        async move {
            self.admit(Operation::Prewrite).await?;
            self.store()?
                .prewrite(start_ts, &primary, mutations, Instant::now())
        }
    }

    fn commit(
        &self,
        start_ts: Timestamp,
        commit_ts: Timestamp,
        keys: Vec<Key>,
        is_primary: bool,
    ) -> impl MaybeSendFuture<Output = Result<(), ClusterError>> + '_ {
        async move {
            let op = if is_primary {
                Operation::CommitPrimary
            } else {
                Operation::CommitSecondary
            };
            self.admit(op).await?;
            self.store()?.commit(start_ts, commit_ts, &keys, is_primary)
        }
    }

    fn acquire_pessimistic_lock(
        &self,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
        key: Key,
    ) -> impl MaybeSendFuture<Output = Result<Option<Value>, ClusterError>> + '_ {
        async move {
            self.admit(Operation::AcquirePessimisticLock).await?;
            self.store()?
                .acquire_pessimistic_lock(start_ts, for_update_ts, &key, Instant::now())
        }
    }

    fn rollback(
        &self,
        start_ts: Timestamp,
        keys: Vec<Key>,
    ) -> impl MaybeSendFuture<Output = Result<(), ClusterError>> + '_ {
        async move {
            self.admit(Operation::Rollback).await?;
            self.store()?.rollback(start_ts, &keys);
            Ok(())
        }
    }

    fn gc(
        &self,
        safepoint: Timestamp,
    ) -> impl MaybeSendFuture<Output = Result<bool, ClusterError>> + '_ {
        async move {
            self.admit(Operation::Gc).await?;
            if safepoint.version() > self.inner.oracle.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.store()?.gc(safepoint);
            Ok(true)
        }
    }
}

impl Connect for MemCluster {
    fn connect(
        endpoints: Vec<String>,
        config: Config,
    ) -> impl MaybeSendFuture<Output = Result<Self>> {
        async move {
            if endpoints.is_empty() {
                return Err(Error::Config("no endpoints given".into()));
            }
            config.validate()?;
            tracing::debug!(?endpoints, "connecting in-memory cluster");
            Ok(MemCluster::with_config(config))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_executor::block_on;

    use super::*;

    #[test]
    fn timestamps_are_strictly_increasing() {
        let cluster = MemCluster::new();
        block_on(async {
            let a = cluster.allocate_timestamp().await.unwrap();
            let b = cluster.allocate_timestamp().await.unwrap();
            assert!(b > a);
        });
    }

    #[test]
    fn injected_faults_fire_once() {
        let cluster =
            MemCluster::with_config(Config::default().with_timeout(Duration::from_millis(5)));
        cluster.inject(Operation::Get, Fault::Unavailable);
        cluster.inject(Operation::Get, Fault::Delay(Duration::from_millis(50)));
        cluster.inject(Operation::Scan, Fault::Delay(Duration::from_millis(1)));
        block_on(async {
            let ts = cluster.allocate_timestamp().await.unwrap();
            assert!(matches!(
                cluster.get(ts, "k".into()).await,
                Err(ClusterError::Unavailable(_))
            ));
            assert!(matches!(
                cluster.get(ts, "k".into()).await,
                Err(ClusterError::Unavailable(msg)) if msg.contains("timed out")
            ));
            assert_eq!(cluster.get(ts, "k".into()).await.unwrap(), None);
            assert!(cluster.scan(ts, BoundRange::all(), 10).await.unwrap().is_empty());
        });
    }

    #[test]
    fn connect_rejects_empty_endpoints() {
        let result = block_on(MemCluster::connect(Vec::new(), Config::default()));
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(block_on(MemCluster::connect(vec!["mem://".into()], Config::default())).is_ok());
    }

    #[test]
    fn gc_refuses_future_safepoint() {
        let cluster = MemCluster::new();
        block_on(async {
            assert!(!cluster.gc(Timestamp::from_version(100)).await.unwrap());
            let ts = cluster.allocate_timestamp().await.unwrap();
            assert!(cluster.gc(ts).await.unwrap());
        });
    }
}

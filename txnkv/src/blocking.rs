//! Synchronous wrappers over the async API.
//!
//! Every call is driven to completion on a multi-thread Tokio runtime shared by a client and
//! all transactions and snapshots it creates. These types must not be used from inside an
//! async context.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use txnkv_core::{BoundRange, ClusterFacade, Key, KvPair, Timestamp, Value};

use crate::{
    client::{self, Connect},
    executor::TokioTimer,
    options::{Config, TransactionOptions},
    snapshot,
    transaction,
    types::{Error, PrewriteResult, Result, TransactionState},
};

fn build_runtime() -> Result<Arc<Runtime>> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("txnkv-blocking")
        .build()
        .map(Arc::new)
        .map_err(|e| Error::Unavailable(format!("failed to start runtime: {e}")))
}

pub struct TransactionClient<C> {
    inner: client::TransactionClient<C>,
    runtime: Arc<Runtime>,
}

impl<C> TransactionClient<C>
where
    C: Connect,
{
    pub fn connect(endpoints: Vec<String>, config: Config) -> Result<Self> {
        let runtime = build_runtime()?;
        let inner = runtime.block_on(client::TransactionClient::connect(endpoints, config))?;
        Ok(Self::from_parts(inner, runtime))
    }
}

impl<C> TransactionClient<C>
where
    C: ClusterFacade,
{
    pub fn new(cluster: C) -> Result<Self> {
        Self::with_config(cluster, Config::default())
    }

    pub fn with_config(cluster: C, config: Config) -> Result<Self> {
        let runtime = build_runtime()?;
        Ok(Self::from_parts(
            client::TransactionClient::with_config(cluster, config),
            runtime,
        ))
    }

    fn from_parts(inner: client::TransactionClient<C>, runtime: Arc<Runtime>) -> Self {
        Self {
            inner: inner.with_timer(Arc::new(TokioTimer)),
            runtime,
        }
    }

    pub fn cluster(&self) -> &C {
        self.inner.cluster()
    }

    pub fn begin(&self) -> Result<Transaction<C>> {
        self.begin_with_options(TransactionOptions::new_optimistic())
    }

    pub fn begin_pessimistic(&self) -> Result<Transaction<C>> {
        self.begin_with_options(TransactionOptions::new_pessimistic())
    }

    pub fn begin_with_options(&self, options: TransactionOptions) -> Result<Transaction<C>> {
        let inner = self
            .runtime
            .block_on(self.inner.begin_with_options(options))?;
        Ok(Transaction {
            inner,
            runtime: Arc::clone(&self.runtime),
        })
    }

    pub fn snapshot(&self) -> Result<Snapshot<C>> {
        let inner = self.runtime.block_on(self.inner.snapshot())?;
        Ok(Snapshot {
            inner,
            runtime: Arc::clone(&self.runtime),
        })
    }

    pub fn snapshot_at(&self, timestamp: Timestamp) -> Snapshot<C> {
        Snapshot {
            inner: self.inner.snapshot_at(timestamp),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn current_timestamp(&self) -> Result<Timestamp> {
        self.runtime.block_on(self.inner.current_timestamp())
    }

    pub fn gc(&self, safepoint: Timestamp) -> Result<bool> {
        self.runtime.block_on(self.inner.gc(safepoint))
    }
}

pub struct Transaction<C> {
    inner: transaction::Transaction<C>,
    runtime: Arc<Runtime>,
}

impl<C> Transaction<C>
where
    C: ClusterFacade,
{
    pub fn start_timestamp(&self) -> Timestamp {
        self.inner.start_timestamp()
    }

    pub fn state(&self) -> TransactionState {
        self.inner.state()
    }

    pub fn get(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.runtime.block_on(self.inner.get(key))
    }

    pub fn get_for_update(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.runtime.block_on(self.inner.get_for_update(key))
    }

    pub fn batch_get(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<Vec<KvPair>> {
        self.runtime.block_on(self.inner.batch_get(keys))
    }

    pub fn batch_get_for_update(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<Vec<KvPair>> {
        self.runtime.block_on(self.inner.batch_get_for_update(keys))
    }

    pub fn scan(&mut self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        self.runtime.block_on(self.inner.scan(range, limit))
    }

    pub fn scan_keys(&mut self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        self.runtime.block_on(self.inner.scan_keys(range, limit))
    }

    pub fn lock_keys(&mut self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<()> {
        self.runtime.block_on(self.inner.lock_keys(keys))
    }

    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.inner.put(key, value)
    }

    pub fn batch_put(&mut self, pairs: impl IntoIterator<Item = impl Into<KvPair>>) -> Result<()> {
        self.inner.batch_put(pairs)
    }

    pub fn remove(&mut self, key: impl Into<Key>) -> Result<()> {
        self.inner.remove(key)
    }

    pub fn commit(&mut self) -> Result<Option<Timestamp>> {
        self.runtime.block_on(self.inner.commit())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.rollback())
    }

    pub fn prewrite_primary(&mut self, primary: Option<Key>) -> Result<PrewriteResult> {
        self.runtime.block_on(self.inner.prewrite_primary(primary))
    }

    pub fn prewrite_secondary(&mut self, primary: Key, start_ts: Timestamp) -> Result<()> {
        self.runtime
            .block_on(self.inner.prewrite_secondary(primary, start_ts))
    }

    pub fn commit_primary(&mut self) -> Result<Timestamp> {
        self.runtime.block_on(self.inner.commit_primary())
    }

    pub fn commit_secondary(&mut self, commit_ts: Timestamp) -> Result<()> {
        self.runtime.block_on(self.inner.commit_secondary(commit_ts))
    }
}

pub struct Snapshot<C> {
    inner: snapshot::Snapshot<C>,
    runtime: Arc<Runtime>,
}

impl<C> Snapshot<C>
where
    C: ClusterFacade,
{
    pub fn timestamp(&self) -> Timestamp {
        self.inner.timestamp()
    }

    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.runtime.block_on(self.inner.get(key))
    }

    pub fn batch_get(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        self.runtime.block_on(self.inner.batch_get(keys))
    }

    pub fn scan(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        self.runtime.block_on(self.inner.scan(range, limit))
    }

    pub fn scan_keys(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        self.runtime.block_on(self.inner.scan_keys(range, limit))
    }
}

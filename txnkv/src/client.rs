use std::sync::Arc;

use txnkv_core::{ClusterFacade, MaybeSendFuture, Timestamp};

use crate::{
    executor::{self, TimerHandle},
    options::{Config, TransactionOptions},
    snapshot::Snapshot,
    transaction::Transaction,
    types::{Error, Result},
};

/// A cluster facade that can be reached through a list of endpoints.
pub trait Connect: ClusterFacade + Sized {
    fn connect(
        endpoints: Vec<String>,
        config: Config,
    ) -> impl MaybeSendFuture<Output = Result<Self>>;
}

/// Entry point for transactional access to a cluster.
///
/// The client is cheap to clone and keeps no per-transaction state; any number of
/// transactions and snapshots may run concurrently over one client.
pub struct TransactionClient<C> {
    cluster: Arc<C>,
    config: Arc<Config>,
    timer: TimerHandle,
}

impl<C> Clone for TransactionClient<C> {
    fn clone(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            config: Arc::clone(&self.config),
            timer: Arc::clone(&self.timer),
        }
    }
}

impl<C> TransactionClient<C>
where
    C: Connect,
{
    /// Connects to the cluster behind `endpoints`.
    #[tracing::instrument(skip(config))]
    pub async fn connect(endpoints: Vec<String>, config: Config) -> Result<Self> {
        config.validate()?;
        if endpoints.is_empty() {
            return Err(Error::Config("at least one endpoint is required".into()));
        }
        let cluster = C::connect(endpoints, config.clone()).await?;
        tracing::info!(secure = config.is_secure(), "connected");
        Ok(Self::with_config(cluster, config))
    }
}

impl<C> TransactionClient<C>
where
    C: ClusterFacade,
{
    pub fn new(cluster: C) -> Self {
        Self::with_config(cluster, Config::default())
    }

    /// Lock waits sleep on [`TokioTimer`](crate::executor::TokioTimer) when the client is
    /// created inside a Tokio runtime (its time driver must be enabled), and block the
    /// calling thread through [`BlockingSleeper`](crate::executor::BlockingSleeper)
    /// otherwise. [`with_timer`](Self::with_timer) overrides the choice.
    pub fn with_config(cluster: C, config: Config) -> Self {
        Self {
            cluster: Arc::new(cluster),
            config: Arc::new(config),
            timer: executor::ambient_timer(),
        }
    }

    /// Replaces the timer used to wait out locks.
    pub fn with_timer(mut self, timer: TimerHandle) -> Self {
        self.timer = timer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Starts an optimistic transaction.
    pub async fn begin(&self) -> Result<Transaction<C>> {
        self.begin_with_options(TransactionOptions::new_optimistic())
            .await
    }

    pub async fn begin_pessimistic(&self) -> Result<Transaction<C>> {
        self.begin_with_options(TransactionOptions::new_pessimistic())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn begin_with_options(&self, options: TransactionOptions) -> Result<Transaction<C>> {
        let start_ts = self.cluster.allocate_timestamp().await?;
        tracing::debug!(start_ts = %start_ts, mode = ?options.mode, "transaction started");
        Ok(Transaction::new(
            self.snapshot_at(start_ts),
            options,
            self.config.commit_batch_size,
        ))
    }

    /// A read-only view at a freshly allocated timestamp.
    pub async fn snapshot(&self) -> Result<Snapshot<C>> {
        let ts = self.cluster.allocate_timestamp().await?;
        Ok(self.snapshot_at(ts))
    }

    /// A read-only view at `timestamp`.
    pub fn snapshot_at(&self, timestamp: Timestamp) -> Snapshot<C> {
        Snapshot::new(
            Arc::clone(&self.cluster),
            timestamp,
            self.config.read_lock_backoff,
            Arc::clone(&self.timer),
        )
    }

    pub async fn current_timestamp(&self) -> Result<Timestamp> {
        Ok(self.cluster.allocate_timestamp().await?)
    }

    /// Asks the cluster to discard versions no reader at or after `safepoint` needs.
    /// Returns whether the cluster accepted the safepoint.
    #[tracing::instrument(skip(self))]
    pub async fn gc(&self, safepoint: Timestamp) -> Result<bool> {
        let accepted = self.cluster.gc(safepoint).await?;
        tracing::info!(safepoint = %safepoint, accepted, "gc requested");
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use futures_executor::block_on;

    use super::*;
    use crate::impls::mem::MemCluster;

    #[test]
    fn connect_validates_config() {
        let config = Config {
            cert_path: Some("cert.pem".into()),
            ..Default::default()
        };
        let result = block_on(TransactionClient::<MemCluster>::connect(
            vec!["127.0.0.1:2379".into()],
            config,
        ));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = block_on(TransactionClient::<MemCluster>::connect(
            Vec::new(),
            Config::default(),
        ));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn timestamps_advance_across_transactions() {
        let client = TransactionClient::new(MemCluster::new());
        block_on(async {
            let first = client.begin().await.unwrap();
            let second = client.begin_pessimistic().await.unwrap();
            let now = client.current_timestamp().await.unwrap();
            assert!(first.start_timestamp() < second.start_timestamp());
            assert!(second.start_timestamp() < now);
            assert_eq!(client.snapshot_at(now).timestamp(), now);
        });
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn clients_created_in_a_runtime_wait_without_blocking_it() {
        use std::time::Duration;

        let client = TransactionClient::new(MemCluster::new());
        let mut holder = client.begin().await.unwrap();
        holder.put("k", "v").unwrap();
        holder.prewrite_primary(None).await.unwrap();

        let snapshot = client.snapshot().await.unwrap();
        let release = async {
            ::tokio::time::sleep(Duration::from_millis(5)).await;
            holder.rollback().await.unwrap();
        };
        let (read, ()) = ::tokio::join!(snapshot.get("k"), release);
        assert_eq!(read.unwrap(), None);
        assert!(client.cluster().locks().is_empty());
    }
}

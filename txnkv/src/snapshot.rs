use std::{future::Future, sync::Arc};

use txnkv_core::{BoundRange, ClusterError, ClusterFacade, Key, KvPair, Timestamp, Value};

use crate::{
    backoff::{BackoffPolicy, ExponentialBackoff},
    executor::{Timer, TimerHandle},
    types::Result,
};

/// Runs `op`, waiting out locks held by other transactions according to `policy`.
///
/// Once the budget is spent the last [`ClusterError::KeyLocked`] is returned to the caller,
/// which decides whether it is contention or a conflict.
pub(crate) async fn retry_on_lock<T, F, Fut>(
    policy: BackoffPolicy,
    timer: &dyn Timer,
    mut op: F,
) -> Result<T, ClusterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClusterError>>,
{
    let mut backoff = ExponentialBackoff::new(policy);
    loop {
        match op().await {
            Err(ClusterError::KeyLocked(lock)) if !backoff.exhausted() => {
                let delay = backoff.next_delay();
                tracing::debug!(
                    key = %lock.key,
                    holder_start_ts = %lock.start_ts,
                    attempt = backoff.attempts(),
                    ?delay,
                    "waiting for lock"
                );
                timer.sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// A read-only view of the cluster at a fixed timestamp.
///
/// Snapshots never buffer writes and never take locks. Reads that trip over a lock of an
/// unfinished transaction wait according to the client's read backoff, then fail with
/// [`Error::LockContention`](crate::types::Error::LockContention).
pub struct Snapshot<C> {
    cluster: Arc<C>,
    timestamp: Timestamp,
    backoff: BackoffPolicy,
    timer: TimerHandle,
}

impl<C> Snapshot<C>
where
    C: ClusterFacade,
{
    pub(crate) fn new(
        cluster: Arc<C>,
        timestamp: Timestamp,
        backoff: BackoffPolicy,
        timer: TimerHandle,
    ) -> Self {
        Self {
            cluster,
            timestamp,
            backoff,
            timer,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        let value = retry_on_lock(self.backoff, &*self.timer, || {
            self.cluster.get(self.timestamp, key.clone())
        })
        .await?;
        Ok(value)
    }

    /// Reads several keys; only keys holding a value appear in the result.
    pub async fn batch_get(
        &self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<Vec<KvPair>> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let pairs = retry_on_lock(self.backoff, &*self.timer, || {
            self.cluster.batch_get(self.timestamp, keys.clone())
        })
        .await?;
        Ok(pairs)
    }

    /// Returns up to `limit` pairs inside `range`, in ascending key order.
    pub async fn scan(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        let range = range.into();
        if limit == 0 || range.is_empty() {
            return Ok(Vec::new());
        }
        let pairs = retry_on_lock(self.backoff, &*self.timer, || {
            self.cluster.scan(self.timestamp, range.clone(), limit)
        })
        .await?;
        Ok(pairs)
    }

    pub async fn scan_keys(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        let pairs = self.scan(range, limit).await?;
        Ok(pairs.into_iter().map(KvPair::into_key).collect())
    }

    pub(crate) fn cluster(&self) -> &Arc<C> {
        &self.cluster
    }

    pub(crate) fn timer(&self) -> &dyn Timer {
        &*self.timer
    }
}

#[cfg(test)]
mod tests {
    use futures_executor::block_on;
    use rstest::rstest;
    use txnkv_core::Mutation;

    use super::*;
    use crate::{
        executor::NoopTimer,
        impls::mem::{Fault, MemCluster, Operation},
        testing::{cluster, seeded_cluster},
        types::Error,
    };

    fn snapshot_at(
        cluster: &MemCluster,
        ts: Timestamp,
        backoff: BackoffPolicy,
    ) -> Snapshot<MemCluster> {
        Snapshot::new(Arc::new(cluster.clone()), ts, backoff, Arc::new(NoopTimer))
    }

    #[rstest]
    fn zero_limit_and_empty_range_skip_the_cluster(seeded_cluster: MemCluster) {
        seeded_cluster.inject(Operation::Scan, Fault::Unavailable);
        let snapshot = snapshot_at(&seeded_cluster, Timestamp::MAX, BackoffPolicy::disabled());
        block_on(async {
            assert!(snapshot.scan("a".., 0).await.unwrap().is_empty());
            assert!(snapshot.scan("d".."a", 10).await.unwrap().is_empty());
            assert!(matches!(
                snapshot.scan(.., 10).await,
                Err(Error::Unavailable(_))
            ));
        });
    }

    #[rstest]
    fn lock_contention_after_backoff(cluster: MemCluster) {
        block_on(async {
            let start_ts = cluster.allocate_timestamp().await.unwrap();
            cluster
                .prewrite(start_ts, "k".into(), vec![Mutation::put("k", "v")])
                .await
                .unwrap();
            let read_ts = cluster.allocate_timestamp().await.unwrap();
            let snapshot = snapshot_at(&cluster, read_ts, BackoffPolicy::no_jitter(1, 1, 3));
            match snapshot.get("k").await {
                Err(Error::LockContention {
                    key,
                    holder_start_ts,
                }) => {
                    assert_eq!(key, Key::from("k"));
                    assert_eq!(holder_start_ts, start_ts);
                }
                other => panic!("unexpected {other:?}"),
            }

            // Reads below the lock's start timestamp are not blocked.
            let below = Timestamp::from_version(start_ts.version() - 1);
            let older = snapshot_at(&cluster, below, BackoffPolicy::disabled());
            assert_eq!(older.get("k").await.unwrap(), None);
        });
    }

    #[rstest]
    fn retry_sees_value_once_lock_clears(cluster: MemCluster) {
        block_on(async {
            let start_ts = cluster.allocate_timestamp().await.unwrap();
            let commit_ts = cluster.allocate_timestamp().await.unwrap();
            let read_ts = cluster.allocate_timestamp().await.unwrap();
            cluster
                .prewrite(start_ts, "k".into(), vec![Mutation::put("k", "v")])
                .await
                .unwrap();

            let mut attempts = 0;
            let value = retry_on_lock(BackoffPolicy::no_jitter(1, 1, 5), &NoopTimer, || {
                attempts += 1;
                let attempt = attempts;
                let cluster = cluster.clone();
                async move {
                    if attempt == 2 {
                        cluster
                            .commit(start_ts, commit_ts, vec!["k".into()], true)
                            .await?;
                    }
                    cluster.get(read_ts, "k".into()).await
                }
            })
            .await
            .unwrap();
            assert_eq!(value, Some(b"v".to_vec()));
            assert_eq!(attempts, 2);
        });
    }
}

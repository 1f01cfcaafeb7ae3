//! Read-write transactions and the two-phase commit that publishes them.
//!
//! A [`Transaction`] reads at its start timestamp and buffers writes locally. Committing runs
//! Percolator's protocol against the cluster:
//!
//! 1. prewrite every buffered key, installing locks that point at the primary key;
//! 2. commit the primary key at a fresh commit timestamp, which decides the transaction;
//! 3. commit the remaining (secondary) keys. Readers resolve any lock left behind through the
//!    primary, so a failure here never loses the commit.
//!
//! The same protocol is available in split form for transactions spread over several
//! participants: one participant prewrites and commits the primary while the others
//! prewrite under the shared primary and start timestamp and commit once the primary did.

use std::time::Instant;

use futures_util::future::join_all;
use txnkv_core::{BoundRange, ClusterError, ClusterFacade, Key, KvPair, Timestamp, Value};

use crate::{
    buffer::{BufferRead, WriteBuffer},
    options::{TransactionMode, TransactionOptions},
    snapshot::{retry_on_lock, Snapshot},
    types::{CommitPhase, Error, PrewriteResult, Result, Role, TransactionState},
};

/// A single-writer read-write transaction.
pub struct Transaction<C> {
    snapshot: Snapshot<C>,
    options: TransactionOptions,
    batch_size: usize,
    buffer: WriteBuffer,
    state: TransactionState,
    primary: Option<Key>,
    /// Timestamp the locks are written under. Equals the start timestamp except on a
    /// secondary participant of a split commit, which adopts the primary's.
    write_ts: Timestamp,
    commit_ts: Option<Timestamp>,
    /// The cluster may hold pessimistic or prewrite locks of this transaction.
    holds_locks: bool,
}

impl<C> Transaction<C>
where
    C: ClusterFacade,
{
    pub(crate) fn new(
        snapshot: Snapshot<C>,
        options: TransactionOptions,
        batch_size: usize,
    ) -> Self {
        let write_ts = snapshot.timestamp();
        Self {
            snapshot,
            options,
            batch_size: batch_size.max(1),
            buffer: WriteBuffer::default(),
            state: TransactionState::Active,
            primary: None,
            write_ts,
            commit_ts: None,
            holds_locks: false,
        }
    }

    pub fn start_timestamp(&self) -> Timestamp {
        self.snapshot.timestamp()
    }

    pub fn commit_timestamp(&self) -> Option<Timestamp> {
        self.commit_ts
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn mode(&self) -> TransactionMode {
        self.options.mode
    }

    /// Returns the value of `key`, preferring this transaction's own buffered writes.
    pub async fn get(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.check_active("get")?;
        let key = key.into();
        match self.buffer.get(&key) {
            BufferRead::Hit(value) => Ok(value),
            BufferRead::Miss => {
                let result = self.snapshot.get(key).await;
                self.settle(result, "get").await
            }
        }
    }

    /// Reads `key` with the intent to write it.
    ///
    /// Pessimistic transactions lock the key at the cluster and return its latest committed
    /// value; optimistic ones behave like [`get`](Self::get) and find conflicts at commit.
    pub async fn get_for_update(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.check_active("get_for_update")?;
        let key = key.into();
        if !self.options.is_pessimistic() {
            return self.get(key).await;
        }
        if self.buffer.is_locked(&key) {
            if let BufferRead::Hit(value) = self.buffer.get(&key) {
                return Ok(value);
            }
        }
        let locked = self.lock_key(key.clone()).await?;
        match self.buffer.get(&key) {
            BufferRead::Hit(value) => Ok(value),
            BufferRead::Miss => Ok(locked),
        }
    }

    /// Reads several keys; only keys holding a value appear in the result.
    pub async fn batch_get(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<Vec<KvPair>> {
        self.check_active("batch_get")?;
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for key in keys.into_iter().map(Into::<Key>::into) {
            match self.buffer.get(&key) {
                BufferRead::Hit(Some(value)) => found.push(KvPair(key, value)),
                BufferRead::Hit(None) => {}
                BufferRead::Miss => missing.push(key),
            }
        }
        let stored = self.snapshot.batch_get(missing).await;
        found.extend(self.settle(stored, "batch_get").await?);
        Ok(found)
    }

    /// [`get_for_update`](Self::get_for_update) for several keys, one at a time.
    pub async fn batch_get_for_update(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<Vec<KvPair>> {
        self.check_active("batch_get_for_update")?;
        if !self.options.is_pessimistic() {
            return self.batch_get(keys).await;
        }
        let mut found = Vec::new();
        for key in keys.into_iter().map(Into::<Key>::into) {
            if let Some(value) = self.get_for_update(key.clone()).await? {
                found.push(KvPair(key, value));
            }
        }
        Ok(found)
    }

    /// Returns up to `limit` pairs inside `range` in ascending key order, with this
    /// transaction's buffered puts and deletes applied.
    pub async fn scan(&mut self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        self.check_active("scan")?;
        let range = range.into();
        if limit == 0 || range.is_empty() {
            return Ok(Vec::new());
        }
        // Buffered deletes may hide up to that many stored pairs.
        let hidden = u32::try_from(self.buffer.deletes_in(&range)).unwrap_or(u32::MAX);
        let stored = self
            .snapshot
            .scan(range.clone(), limit.saturating_add(hidden))
            .await;
        let stored = self.settle(stored, "scan").await?;
        Ok(self.buffer.merge_scan(&range, stored, limit as usize))
    }

    pub async fn scan_keys(
        &mut self,
        range: impl Into<BoundRange>,
        limit: u32,
    ) -> Result<Vec<Key>> {
        let pairs = self.scan(range, limit).await?;
        Ok(pairs.into_iter().map(KvPair::into_key).collect())
    }

    /// Locks `keys` without reading them. A no-op for optimistic transactions.
    pub async fn lock_keys(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<()> {
        self.check_active("lock_keys")?;
        if !self.options.is_pessimistic() {
            return Ok(());
        }
        for key in keys.into_iter().map(Into::<Key>::into) {
            if !self.buffer.is_locked(&key) {
                self.lock_key(key).await?;
            }
        }
        Ok(())
    }

    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.check_active("put")?;
        self.buffer.put(key.into(), value.into());
        Ok(())
    }

    pub fn batch_put(&mut self, pairs: impl IntoIterator<Item = impl Into<KvPair>>) -> Result<()> {
        self.check_active("batch_put")?;
        for KvPair(key, value) in pairs.into_iter().map(Into::<KvPair>::into) {
            self.buffer.put(key, value);
        }
        Ok(())
    }

    pub fn remove(&mut self, key: impl Into<Key>) -> Result<()> {
        self.check_active("remove")?;
        self.buffer.delete(key.into());
        Ok(())
    }

    /// Commits the buffered writes and returns the commit timestamp, or `None` if there was
    /// nothing to commit.
    ///
    /// If committing secondaries fails after the primary committed, the transaction is
    /// committed regardless and [`Error::CommitAmbiguous`] reports the failure.
    #[tracing::instrument(skip_all, fields(start_ts = %self.start_timestamp()))]
    pub async fn commit(&mut self) -> Result<Option<Timestamp>> {
        self.check_active("commit")?;
        let Some(primary) = self.buffer.primary().cloned() else {
            self.state = TransactionState::Committed;
            tracing::debug!("nothing to commit");
            return Ok(None);
        };
        self.primary = Some(primary);
        self.prewrite(Role::Primary).await?;
        let commit_ts = self.commit_primary_key().await?;
        self.commit_secondary_keys(commit_ts).await?;
        tracing::info!(commit_ts = %commit_ts, keys = self.buffer.len(), "transaction committed");
        Ok(Some(commit_ts))
    }

    /// Aborts the transaction and releases every lock it holds at the cluster.
    ///
    /// A prewritten secondary participant cannot roll back on its own; rolling back the
    /// primary participant aborts every participant.
    #[tracing::instrument(skip_all, fields(start_ts = %self.start_timestamp()))]
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Active
            | TransactionState::Committing(CommitPhase::Prewriting)
            | TransactionState::Committing(CommitPhase::Prewritten(Role::Primary)) => {}
            // Its locks belong to the primary participant's transaction, which decides them.
            state @ TransactionState::Committing(CommitPhase::Prewritten(Role::Secondary)) => {
                return Err(Error::out_of_order("rollback", state))
            }
            state => return Err(Error::invalid_state("rollback", state)),
        }
        if self.holds_locks {
            if let Err(err) = self.release_locks().await {
                self.state = TransactionState::Failed;
                return Err(err.into());
            }
        }
        self.state = TransactionState::RolledBack;
        tracing::info!("transaction rolled back");
        Ok(())
    }

    /// Prewrites this participant's buffer as the primary participant of a split commit.
    ///
    /// `primary` picks the primary key among the buffered keys; by default the first key
    /// written becomes the primary.
    #[tracing::instrument(skip(self), fields(start_ts = %self.start_timestamp()))]
    pub async fn prewrite_primary(&mut self, primary: Option<Key>) -> Result<PrewriteResult> {
        self.check_prewritable("prewrite_primary")?;
        let key = match primary {
            Some(key) if self.buffer.contains(&key) => key,
            Some(key) => {
                let err =
                    Error::InvalidArgument(format!("primary key {key} is not in the write set"));
                return Err(self.fail(err, "prewrite primary").await);
            }
            None => match self.buffer.primary().cloned() {
                Some(key) => key,
                None => {
                    let err = Error::InvalidArgument(
                        "cannot choose a primary key for an empty write set".into(),
                    );
                    return Err(self.fail(err, "prewrite primary").await);
                }
            },
        };
        self.primary = Some(key.clone());
        self.prewrite(Role::Primary).await?;
        Ok(PrewriteResult {
            key,
            start_ts: self.write_ts,
        })
    }

    /// Prewrites this participant's buffer under a primary prewritten by another participant.
    /// The locks are written at `start_ts`, the primary participant's start timestamp.
    #[tracing::instrument(skip(self), fields(own_start_ts = %self.start_timestamp()))]
    pub async fn prewrite_secondary(&mut self, primary: Key, start_ts: Timestamp) -> Result<()> {
        self.check_prewritable("prewrite_secondary")?;
        if self.buffer.has_pessimistic_locks() {
            let err = Error::InvalidArgument(
                "a secondary participant cannot hold pessimistic locks under its own start_ts"
                    .into(),
            );
            return Err(self.fail(err, "prewrite secondary").await);
        }
        if self.buffer.contains(&primary) {
            let err = Error::InvalidArgument(format!(
                "primary key {primary} belongs to the primary participant's write set"
            ));
            return Err(self.fail(err, "prewrite secondary").await);
        }
        self.primary = Some(primary);
        self.write_ts = start_ts;
        if self.buffer.is_empty() {
            self.state = TransactionState::Committing(CommitPhase::Prewritten(Role::Secondary));
            return Ok(());
        }
        self.prewrite(Role::Secondary).await
    }

    /// Commits the primary key, deciding the outcome of every participant.
    #[tracing::instrument(skip_all, fields(start_ts = %self.write_ts))]
    pub async fn commit_primary(&mut self) -> Result<Timestamp> {
        match self.state {
            TransactionState::Committing(CommitPhase::Prewritten(Role::Primary)) => {}
            state if state.is_terminal() => {
                return Err(Error::invalid_state("commit_primary", state))
            }
            state => return Err(Error::out_of_order("commit_primary", state)),
        }
        self.commit_primary_key().await
    }

    /// Commits this participant's secondary keys at `commit_ts`, the timestamp the primary
    /// committed at.
    ///
    /// Fails with [`Error::ProtocolOrderViolation`], changing nothing, while the primary has
    /// not committed at `commit_ts`.
    #[tracing::instrument(skip(self), fields(start_ts = %self.write_ts))]
    pub async fn commit_secondary(&mut self, commit_ts: Timestamp) -> Result<()> {
        match self.state {
            TransactionState::Committing(CommitPhase::PrimaryCommitted)
            | TransactionState::Committing(CommitPhase::Prewritten(Role::Secondary)) => {}
            state if state.is_terminal() => {
                return Err(Error::invalid_state("commit_secondary", state))
            }
            state => return Err(Error::out_of_order("commit_secondary", state)),
        }
        if commit_ts <= self.write_ts {
            return Err(Error::out_of_order("commit_secondary", self.state));
        }
        if self.commit_ts.is_some_and(|own| own != commit_ts) {
            return Err(Error::out_of_order("commit_secondary", self.state));
        }
        self.commit_secondary_keys(commit_ts).await
    }

    fn check_active(&self, operation: &'static str) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            state => Err(Error::invalid_state(operation, state)),
        }
    }

    fn check_prewritable(&self, operation: &'static str) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            state if state.is_terminal() => Err(Error::invalid_state(operation, state)),
            state => Err(Error::out_of_order(operation, state)),
        }
    }

    /// Takes a pessimistic lock on `key` under a fresh for-update timestamp.
    async fn lock_key(&mut self, key: Key) -> Result<Option<Value>> {
        let start_ts = self.start_timestamp();
        let result = async {
            let cluster = self.snapshot.cluster();
            let for_update_ts = cluster.allocate_timestamp().await?;
            retry_on_lock(self.options.lock_backoff, self.snapshot.timer(), || {
                cluster.acquire_pessimistic_lock(start_ts, for_update_ts, key.clone())
            })
            .await
        }
        .await;
        match result {
            Ok(value) => {
                tracing::debug!(key = %key, "pessimistic lock acquired");
                self.holds_locks = true;
                self.buffer.lock(key, value.clone());
                Ok(value)
            }
            Err(err) => Err(self.fail(err.into(), "lock").await),
        }
    }

    async fn prewrite(&mut self, role: Role) -> Result<()> {
        let Some(primary) = self.primary.clone() else {
            return Err(Error::out_of_order("prewrite", self.state));
        };
        self.state = TransactionState::Committing(CommitPhase::Prewriting);
        self.holds_locks = true;
        let started = Instant::now();
        let write_ts = self.write_ts;
        let mutations = self.buffer.mutations();
        let results = {
            let cluster = &**self.snapshot.cluster();
            let timer = self.snapshot.timer();
            let policy = self.options.lock_backoff;
            let primary = &primary;
            join_all(mutations.chunks(self.batch_size).map(move |batch| {
                retry_on_lock(policy, timer, move || {
                    cluster.prewrite(write_ts, primary.clone(), batch.to_vec())
                })
            }))
            .await
        };
        if let Some(err) = results.into_iter().find_map(|result| result.err()) {
            let err = Error::from_prewrite(err, write_ts);
            return Err(self.fail(err, "prewrite").await);
        }
        tracing::debug!(
            primary = %primary,
            keys = mutations.len(),
            elapsed = ?started.elapsed(),
            "prewrite finished"
        );
        self.state = TransactionState::Committing(CommitPhase::Prewritten(role));
        Ok(())
    }

    async fn commit_primary_key(&mut self) -> Result<Timestamp> {
        let Some(primary) = self.primary.clone() else {
            return Err(Error::out_of_order("commit_primary", self.state));
        };
        let started = Instant::now();
        let cluster = self.snapshot.cluster().clone();
        let allocated = cluster.allocate_timestamp().await;
        let commit_ts = match allocated {
            Ok(ts) if ts > self.write_ts => ts,
            Ok(ts) => {
                let err = Error::InvalidArgument(format!(
                    "allocated commit_ts {ts} does not exceed start_ts {}",
                    self.write_ts
                ));
                return Err(self.fail(err, "commit primary").await);
            }
            Err(err) => return Err(self.fail(err.into(), "commit primary").await),
        };
        let committed = cluster
            .commit(self.write_ts, commit_ts, vec![primary.clone()], true)
            .await;
        match committed {
            Ok(()) => {}
            Err(ClusterError::Unavailable(msg)) => {
                // The primary may or may not have committed; its lock decides.
                self.state = TransactionState::Failed;
                tracing::warn!(
                    primary = %primary,
                    commit_ts = %commit_ts,
                    error = %msg,
                    "primary commit outcome unknown"
                );
                return Err(Error::Unavailable(msg));
            }
            Err(err) => return Err(self.fail(err.into(), "commit primary").await),
        }
        self.commit_ts = Some(commit_ts);
        self.state = TransactionState::Committing(CommitPhase::PrimaryCommitted);
        tracing::debug!(
            primary = %primary,
            commit_ts = %commit_ts,
            elapsed = ?started.elapsed(),
            "primary committed"
        );
        Ok(commit_ts)
    }

    async fn commit_secondary_keys(&mut self, commit_ts: Timestamp) -> Result<()> {
        let started = Instant::now();
        let primary = self.primary.clone();
        let keys: Vec<Key> = self
            .buffer
            .keys()
            .into_iter()
            .filter(|key| Some(key) != primary.as_ref())
            .collect();
        let results = {
            let cluster = &**self.snapshot.cluster();
            let write_ts = self.write_ts;
            join_all(
                keys.chunks(self.batch_size)
                    .map(move |batch| cluster.commit(write_ts, commit_ts, batch.to_vec(), false)),
            )
            .await
        };
        let mut failure = None;
        for err in results.into_iter().filter_map(|result| result.err()) {
            if matches!(err, ClusterError::PrimaryNotCommitted { .. }) {
                tracing::debug!(commit_ts = %commit_ts, "secondary commit refused: primary undecided");
                return Err(Error::out_of_order("commit_secondary", self.state));
            }
            failure.get_or_insert(err);
        }
        let primary_committed =
            self.state == TransactionState::Committing(CommitPhase::PrimaryCommitted);
        match failure {
            None => {}
            Some(source) if primary_committed => {
                self.state = TransactionState::Committed;
                self.commit_ts = Some(commit_ts);
                tracing::warn!(
                    commit_ts = %commit_ts,
                    error = %source,
                    "secondary commit failed; remaining locks resolve through the primary"
                );
                return Err(Error::CommitAmbiguous { commit_ts, source });
            }
            Some(err @ ClusterError::RolledBack { .. }) => {
                return Err(self.fail(err.into(), "commit secondary").await);
            }
            Some(err) => {
                // Whether the primary committed is unknown here; readers settle it.
                self.state = TransactionState::Failed;
                tracing::warn!(
                    start_ts = %self.write_ts,
                    commit_ts = %commit_ts,
                    error = %err,
                    "secondary participant commit outcome unknown"
                );
                return Err(err.into());
            }
        }
        self.state = TransactionState::Committed;
        self.commit_ts = Some(commit_ts);
        self.holds_locks = false;
        tracing::debug!(
            commit_ts = %commit_ts,
            keys = keys.len(),
            elapsed = ?started.elapsed(),
            "secondaries committed"
        );
        Ok(())
    }

    /// Passes `result` through, ending the transaction if it carries an error.
    async fn settle<T>(&mut self, result: Result<T>, phase: &'static str) -> Result<T> {
        match result {
            Err(err) if !err.is_rejection() => Err(self.fail(err, phase).await),
            other => other,
        }
    }

    /// Marks the transaction failed and rolls back whatever it locked. Returns `err`.
    async fn fail(&mut self, err: Error, phase: &'static str) -> Error {
        self.state = TransactionState::Failed;
        tracing::warn!(start_ts = %self.write_ts, phase, error = %err, "transaction failed");
        if self.holds_locks {
            if let Err(rollback_err) = self.release_locks().await {
                tracing::warn!(
                    start_ts = %self.write_ts,
                    error = %rollback_err,
                    "rollback after failure did not complete; locks expire after their ttl"
                );
            }
        }
        err
    }

    async fn release_locks(&mut self) -> Result<(), ClusterError> {
        let keys = self.buffer.keys();
        self.snapshot
            .cluster()
            .rollback(self.write_ts, keys)
            .await?;
        self.holds_locks = false;
        Ok(())
    }
}

impl<C> Drop for Transaction<C> {
    fn drop(&mut self) {
        if self.holds_locks && self.state != TransactionState::RolledBack {
            tracing::warn!(
                start_ts = %self.write_ts,
                state = %self.state,
                "transaction dropped while holding locks; they expire after their ttl"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_executor::block_on;
    use rstest::rstest;

    use super::*;
    use crate::{
        client::TransactionClient,
        impls::mem::{Fault, MemCluster, Operation},
        testing::client,
    };

    #[rstest]
    fn reads_see_own_writes(client: TransactionClient<MemCluster>) {
        block_on(async {
            let mut txn = client.begin().await.unwrap();
            txn.put("a", "1").unwrap();
            txn.remove("b").unwrap();
            assert_eq!(txn.get("a").await.unwrap(), Some(b"1".to_vec()));
            assert_eq!(txn.get("b").await.unwrap(), None);
            let pairs = txn.batch_get(["a", "b", "c"]).await.unwrap();
            assert_eq!(pairs, vec![KvPair::new("a", "1")]);
            txn.rollback().await.unwrap();
        });
    }

    #[rstest]
    fn failed_read_releases_pessimistic_locks(client: TransactionClient<MemCluster>) {
        block_on(async {
            let mut txn = client.begin_pessimistic().await.unwrap();
            txn.get_for_update("k").await.unwrap();
            assert_eq!(client.cluster().locks().len(), 1);

            client.cluster().inject(Operation::Scan, Fault::Unavailable);
            assert!(matches!(
                txn.scan(.., 10).await,
                Err(Error::Unavailable(_))
            ));
            assert_eq!(txn.state(), TransactionState::Failed);
            assert!(client.cluster().locks().is_empty());
            assert!(matches!(txn.get("k").await, Err(Error::InvalidState { .. })));
        });
    }

    #[rstest]
    fn empty_commit_runs_no_protocol(client: TransactionClient<MemCluster>) {
        client.cluster().inject(Operation::Prewrite, Fault::Unavailable);
        block_on(async {
            let mut txn = client.begin().await.unwrap();
            assert_eq!(txn.commit().await.unwrap(), None);
            assert_eq!(txn.state(), TransactionState::Committed);
        });
    }

    #[rstest]
    fn operations_after_commit_are_rejected(client: TransactionClient<MemCluster>) {
        block_on(async {
            let mut txn = client.begin().await.unwrap();
            txn.put("k", "v").unwrap();
            let commit_ts = txn.commit().await.unwrap().unwrap();
            assert!(commit_ts > txn.start_timestamp());

            assert!(matches!(
                txn.put("k", "w"),
                Err(Error::InvalidState {
                    operation: "put",
                    state: TransactionState::Committed
                })
            ));
            assert!(matches!(txn.get("k").await, Err(Error::InvalidState { .. })));
            assert!(matches!(txn.commit().await, Err(Error::InvalidState { .. })));
            assert!(matches!(txn.rollback().await, Err(Error::InvalidState { .. })));
        });
    }

    #[rstest]
    fn prewrite_conflict_fails_and_releases_locks(client: TransactionClient<MemCluster>) {
        block_on(async {
            let mut first = client.begin().await.unwrap();
            let mut second = client.begin().await.unwrap();
            first.put("k", "1").unwrap();
            second.put("k", "2").unwrap();
            second.put("other", "2").unwrap();
            first.commit().await.unwrap();

            match second.commit().await {
                Err(Error::WriteConflict { key, .. }) => assert_eq!(key, Key::from("k")),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(second.state(), TransactionState::Failed);
            assert!(client.cluster().locks().is_empty());
        });
    }

    #[rstest]
    fn unknown_primary_outcome_keeps_locks(client: TransactionClient<MemCluster>) {
        client.cluster().inject(Operation::CommitPrimary, Fault::Unavailable);
        block_on(async {
            let mut txn = client.begin().await.unwrap();
            txn.put("a", "1").unwrap();
            txn.put("b", "2").unwrap();
            assert!(matches!(txn.commit().await, Err(Error::Unavailable(_))));
            assert_eq!(txn.state(), TransactionState::Failed);
            assert_eq!(client.cluster().locks().len(), 2);
        });
    }

    #[rstest]
    fn split_commit_rejects_bad_primary(client: TransactionClient<MemCluster>) {
        block_on(async {
            let mut empty = client.begin().await.unwrap();
            assert!(matches!(
                empty.prewrite_primary(None).await,
                Err(Error::InvalidArgument(_))
            ));
            assert_eq!(empty.state(), TransactionState::Failed);

            let mut stray = client.begin().await.unwrap();
            stray.put("a", "1").unwrap();
            assert!(matches!(
                stray.prewrite_primary(Some("zz".into())).await,
                Err(Error::InvalidArgument(_))
            ));
            assert_eq!(stray.state(), TransactionState::Failed);

            let mut txn = client.begin().await.unwrap();
            txn.put("a", "1").unwrap();
            let result = txn.prewrite_primary(Some("a".into())).await.unwrap();
            assert_eq!(result.key, Key::from("a"));
            assert_eq!(result.start_ts, txn.start_timestamp());
            assert!(matches!(
                txn.prewrite_primary(None).await,
                Err(Error::ProtocolOrderViolation { .. })
            ));
            txn.rollback().await.unwrap();
            assert!(client.cluster().locks().is_empty());
        });
    }
}

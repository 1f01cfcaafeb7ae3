use crate::{
    BoundRange, ClusterError, Key, KvPair, MaybeSend, MaybeSendFuture, MaybeSync, Mutation,
    Timestamp, Value,
};

/// The narrow surface the transaction layer needs from a cluster.
///
/// Implementations own routing, transport, retries on transient failures and leader
/// failover. Every call is addressed by timestamp; the facade keeps no per-transaction state.
/// Requests that cannot be served in time fail with [`ClusterError::Unavailable`].
pub trait ClusterFacade: MaybeSend + MaybeSync + 'static {
    /// Allocates a fresh timestamp, strictly greater than any handed out before.
    fn allocate_timestamp(
        &self,
    ) -> impl MaybeSendFuture<Output = Result<Timestamp, ClusterError>> + '_;

    /// Reads the newest value committed at or before `ts`.
    ///
    /// Fails with [`ClusterError::KeyLocked`] if an unresolved lock older than `ts` guards
    /// the key.
    fn get(
        &self,
        ts: Timestamp,
        key: Key,
    ) -> impl MaybeSendFuture<Output = Result<Option<Value>, ClusterError>> + '_;

    /// Reads several keys at `ts`; absent keys are omitted from the result.
    fn batch_get(
        &self,
        ts: Timestamp,
        keys: Vec<Key>,
    ) -> impl MaybeSendFuture<Output = Result<Vec<KvPair>, ClusterError>> + '_;

    /// Returns up to `limit` pairs of `range` visible at `ts`, in ascending key order.
    fn scan(
        &self,
        ts: Timestamp,
        range: BoundRange,
        limit: u32,
    ) -> impl MaybeSendFuture<Output = Result<Vec<KvPair>, ClusterError>> + '_;

    /// Installs locks for `mutations`, each pointing at `primary`.
    ///
    /// Validation covers the whole batch: either every lock is installed or none is.
    fn prewrite(
        &self,
        start_ts: Timestamp,
        primary: Key,
        mutations: Vec<Mutation>,
    ) -> impl MaybeSendFuture<Output = Result<(), ClusterError>> + '_;

    /// Replaces the locks of transaction `start_ts` on `keys` with commit records at
    /// `commit_ts`. Committing the primary decides the fate of the whole transaction.
    fn commit(
        &self,
        start_ts: Timestamp,
        commit_ts: Timestamp,
        keys: Vec<Key>,
        is_primary: bool,
    ) -> impl MaybeSendFuture<Output = Result<(), ClusterError>> + '_;

    /// Takes a pessimistic lock on `key` for transaction `start_ts` and returns the newest
    /// committed value. Fails with [`ClusterError::WriteConflict`] if a write committed
    /// after `for_update_ts`.
    fn acquire_pessimistic_lock(
        &self,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
        key: Key,
    ) -> impl MaybeSendFuture<Output = Result<Option<Value>, ClusterError>> + '_;

    /// Releases every lock transaction `start_ts` holds on `keys` and leaves rollback
    /// records behind so late prewrites cannot resurrect them.
    fn rollback(
        &self,
        start_ts: Timestamp,
        keys: Vec<Key>,
    ) -> impl MaybeSendFuture<Output = Result<(), ClusterError>> + '_;

    /// Discards versions no reader at or after `safepoint` can observe. Returns whether the
    /// cluster accepted the safepoint.
    fn gc(
        &self,
        safepoint: Timestamp,
    ) -> impl MaybeSendFuture<Output = Result<bool, ClusterError>> + '_;
}

use std::{
    collections::{BTreeMap, BTreeSet},
    time::{Duration, Instant},
};

use txnkv_core::{
    BoundRange, ClusterError, Key, KvPair, LockInfo, LockKind, Mutation, Op, Timestamp, Value,
};

#[derive(Debug, Clone)]
struct LockRecord {
    primary: Key,
    start_ts: Timestamp,
    kind: LockKind,
    deadline: Instant,
}

impl LockRecord {
    fn info(&self, key: &Key) -> LockInfo {
        LockInfo {
            key: key.clone(),
            primary: self.primary.clone(),
            start_ts: self.start_ts,
            kind: self.kind,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Put,
    Delete,
    Lock,
    Rollback,
}

#[derive(Debug, Clone, Copy)]
struct WriteRecord {
    start_ts: Timestamp,
    kind: WriteKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnStatus {
    Committed(Timestamp),
    RolledBack,
    Locked,
}

/// Multi-version store with Percolator's three column families.
///
/// * `data`: value written by the transaction started at a timestamp.
/// * `locks`: at most one lock per key.
/// * `writes`: commit records keyed by commit timestamp; rollback records are keyed by the
///   start timestamp of the rolled back transaction.
#[derive(Debug)]
pub(crate) struct MvccStore {
    data: BTreeMap<Key, BTreeMap<Timestamp, Value>>,
    locks: BTreeMap<Key, LockRecord>,
    writes: BTreeMap<Key, BTreeMap<Timestamp, WriteRecord>>,
    lock_ttl: Duration,
    safepoint: Timestamp,
}

impl MvccStore {
    pub(crate) fn new(lock_ttl: Duration) -> Self {
        Self {
            data: BTreeMap::new(),
            locks: BTreeMap::new(),
            writes: BTreeMap::new(),
            lock_ttl,
            safepoint: Timestamp::ZERO,
        }
    }

    pub(crate) fn get(
        &mut self,
        ts: Timestamp,
        key: &Key,
        now: Instant,
    ) -> Result<Option<Value>, ClusterError> {
        self.check_read_lock(ts, key, now)?;
        Ok(self.committed_value(key, ts))
    }

    pub(crate) fn batch_get(
        &mut self,
        ts: Timestamp,
        keys: Vec<Key>,
        now: Instant,
    ) -> Result<Vec<KvPair>, ClusterError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(ts, &key, now)? {
                out.push(KvPair(key, value));
            }
        }
        Ok(out)
    }

    pub(crate) fn scan(
        &mut self,
        ts: Timestamp,
        range: &BoundRange,
        limit: u32,
        now: Instant,
    ) -> Result<Vec<KvPair>, ClusterError> {
        if limit == 0 || range.is_empty() {
            return Ok(Vec::new());
        }
        let candidates: BTreeSet<Key> = self
            .writes
            .range(range.clone())
            .map(|(key, _)| key.clone())
            .chain(self.locks.range(range.clone()).map(|(key, _)| key.clone()))
            .collect();
        let mut out = Vec::new();
        for key in candidates {
            if let Some(value) = self.get(ts, &key, now)? {
                out.push(KvPair(key, value));
                if out.len() >= limit as usize {
                    break;
                }
            }
        }
        Ok(out)
    }

    pub(crate) fn prewrite(
        &mut self,
        start_ts: Timestamp,
        primary: &Key,
        mutations: Vec<Mutation>,
        now: Instant,
    ) -> Result<(), ClusterError> {
        let mut pending = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            if self.check_prewrite(start_ts, &mutation, now)? {
                pending.push(mutation);
            }
        }
        let deadline = now + self.lock_ttl;
        for Mutation { key, op, .. } in pending {
            let kind = LockKind::from(&op);
            if let Op::Put(value) = op {
                self.data
                    .entry(key.clone())
                    .or_default()
                    .insert(start_ts, value);
            }
            self.locks.insert(
                key,
                LockRecord {
                    primary: primary.clone(),
                    start_ts,
                    kind,
                    deadline,
                },
            );
        }
        Ok(())
    }

    /// Returns whether the mutation still needs a lock; `false` for a repeated prewrite.
    fn check_prewrite(
        &mut self,
        start_ts: Timestamp,
        mutation: &Mutation,
        now: Instant,
    ) -> Result<bool, ClusterError> {
        let key = &mutation.key;
        self.clear_foreign_lock(start_ts, key, now)?;
        if let Some(lock) = self.locks.get(key) {
            // Only our own lock survives `clear_foreign_lock`.
            return Ok(lock.kind == LockKind::Pessimistic);
        }
        if self.write_by(key, start_ts).is_some() {
            return Err(ClusterError::RolledBack {
                key: key.clone(),
                start_ts,
            });
        }
        if mutation.pessimistic {
            return Err(ClusterError::LockNotFound {
                key: key.clone(),
                start_ts,
            });
        }
        if let Some(commit_ts) = self.newest_write_since(key, start_ts) {
            return Err(ClusterError::WriteConflict {
                key: key.clone(),
                start_ts,
                conflict_commit_ts: commit_ts,
            });
        }
        Ok(true)
    }

    pub(crate) fn commit(
        &mut self,
        start_ts: Timestamp,
        commit_ts: Timestamp,
        keys: &[Key],
        is_primary: bool,
    ) -> Result<(), ClusterError> {
        let mut pending = Vec::with_capacity(keys.len());
        for key in keys {
            match self.locks.get(key) {
                Some(lock) if lock.start_ts == start_ts && lock.kind != LockKind::Pessimistic => {
                    if !is_primary {
                        self.check_primary_committed(key, &lock.primary, start_ts, commit_ts)?;
                    }
                    pending.push(key);
                }
                _ => match self.write_by(key, start_ts) {
                    Some((_, record)) if record.kind == WriteKind::Rollback => {
                        return Err(ClusterError::RolledBack {
                            key: key.clone(),
                            start_ts,
                        })
                    }
                    Some(_) => {}
                    None => {
                        return Err(ClusterError::LockNotFound {
                            key: key.clone(),
                            start_ts,
                        })
                    }
                },
            }
        }
        for key in pending {
            self.commit_key(key, start_ts, commit_ts);
        }
        Ok(())
    }

    /// Secondaries follow their primary: it must carry a commit record at `commit_ts`.
    fn check_primary_committed(
        &self,
        key: &Key,
        primary: &Key,
        start_ts: Timestamp,
        commit_ts: Timestamp,
    ) -> Result<(), ClusterError> {
        match self.write_by(primary, start_ts) {
            Some((_, record)) if record.kind == WriteKind::Rollback => Err(ClusterError::RolledBack {
                key: key.clone(),
                start_ts,
            }),
            Some((committed_at, _)) if committed_at == commit_ts => Ok(()),
            _ => Err(ClusterError::PrimaryNotCommitted {
                key: key.clone(),
                primary: primary.clone(),
                start_ts,
                commit_ts,
            }),
        }
    }

    pub(crate) fn acquire_pessimistic_lock(
        &mut self,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
        key: &Key,
        now: Instant,
    ) -> Result<Option<Value>, ClusterError> {
        self.clear_foreign_lock(start_ts, key, now)?;
        if let Some(lock) = self.locks.get_mut(key) {
            lock.deadline = now + self.lock_ttl;
            return Ok(self.committed_value(key, Timestamp::MAX));
        }
        if self.write_by(key, start_ts).is_some() {
            return Err(ClusterError::RolledBack {
                key: key.clone(),
                start_ts,
            });
        }
        if let Some(commit_ts) = self.newest_write_since(key, for_update_ts) {
            return Err(ClusterError::WriteConflict {
                key: key.clone(),
                start_ts,
                conflict_commit_ts: commit_ts,
            });
        }
        self.locks.insert(
            key.clone(),
            LockRecord {
                primary: key.clone(),
                start_ts,
                kind: LockKind::Pessimistic,
                deadline: now + self.lock_ttl,
            },
        );
        Ok(self.committed_value(key, Timestamp::MAX))
    }

    pub(crate) fn rollback(&mut self, start_ts: Timestamp, keys: &[Key]) {
        for key in keys {
            self.rollback_key(key, start_ts);
        }
    }

    /// Drops every version a reader at or after `safepoint` cannot observe.
    pub(crate) fn gc(&mut self, safepoint: Timestamp) {
        if safepoint <= self.safepoint {
            return;
        }
        self.safepoint = safepoint;
        for (key, versions) in self.writes.iter_mut() {
            let visible = versions
                .range(..=safepoint)
                .rev()
                .find(|(_, w)| matches!(w.kind, WriteKind::Put | WriteKind::Delete))
                .map(|(commit_ts, w)| (*commit_ts, w.kind));
            versions.retain(|commit_ts, w| match visible {
                _ if *commit_ts > safepoint => true,
                Some((keep, WriteKind::Put)) => *commit_ts >= keep && w.kind != WriteKind::Rollback,
                Some((keep, _)) => *commit_ts > keep && w.kind != WriteKind::Rollback,
                None => w.kind != WriteKind::Rollback,
            });
            let lock_ts = self.locks.get(key).map(|lock| lock.start_ts);
            if let Some(values) = self.data.get_mut(key) {
                values.retain(|start_ts, _| {
                    Some(*start_ts) == lock_ts || versions.values().any(|w| w.start_ts == *start_ts)
                });
            }
        }
        self.writes.retain(|_, versions| !versions.is_empty());
        self.data.retain(|_, values| !values.is_empty());
    }

    pub(crate) fn locks(&self) -> Vec<LockInfo> {
        self.locks.iter().map(|(key, lock)| lock.info(key)).collect()
    }

    pub(crate) fn version_count(&self, key: &Key) -> usize {
        self.writes.get(key).map_or(0, BTreeMap::len)
    }

    /// Makes a read at `ts` wait on or resolve a lock older than `ts`. Pessimistic locks
    /// never block readers.
    fn check_read_lock(
        &mut self,
        ts: Timestamp,
        key: &Key,
        now: Instant,
    ) -> Result<(), ClusterError> {
        let Some(lock) = self.locks.get(key).cloned() else {
            return Ok(());
        };
        if lock.kind == LockKind::Pessimistic || lock.start_ts > ts {
            return Ok(());
        }
        self.resolve(key, &lock, now)
    }

    /// Clears a lock of another transaction on `key` if its owner has finished, otherwise
    /// reports it. Leaves our own lock in place.
    fn clear_foreign_lock(
        &mut self,
        start_ts: Timestamp,
        key: &Key,
        now: Instant,
    ) -> Result<(), ClusterError> {
        match self.locks.get(key).cloned() {
            Some(lock) if lock.start_ts != start_ts => self.resolve(key, &lock, now),
            _ => Ok(()),
        }
    }

    fn resolve(&mut self, key: &Key, lock: &LockRecord, now: Instant) -> Result<(), ClusterError> {
        if lock.kind == LockKind::Pessimistic {
            if lock.expired(now) {
                tracing::debug!(key = %key, start_ts = %lock.start_ts, "dropping expired pessimistic lock");
                self.rollback_key(key, lock.start_ts);
                return Ok(());
            }
            return Err(ClusterError::KeyLocked(lock.info(key)));
        }
        match self.txn_status(&lock.primary, lock.start_ts, lock.expired(now), now) {
            TxnStatus::Committed(commit_ts) => {
                tracing::debug!(key = %key, start_ts = %lock.start_ts, commit_ts = %commit_ts, "resolved lock as committed");
                self.commit_key(key, lock.start_ts, commit_ts);
                Ok(())
            }
            TxnStatus::RolledBack => {
                tracing::debug!(key = %key, start_ts = %lock.start_ts, "resolved lock as rolled back");
                self.rollback_key(key, lock.start_ts);
                Ok(())
            }
            TxnStatus::Locked => Err(ClusterError::KeyLocked(lock.info(key))),
        }
    }

    /// Decides the fate of transaction `start_ts` from its primary key. A primary whose lock
    /// expired, or which was never locked while the caller's lock expired, is rolled back.
    fn txn_status(
        &mut self,
        primary: &Key,
        start_ts: Timestamp,
        caller_expired: bool,
        now: Instant,
    ) -> TxnStatus {
        if let Some((commit_ts, record)) = self.write_by(primary, start_ts) {
            return match record.kind {
                WriteKind::Rollback => TxnStatus::RolledBack,
                _ => TxnStatus::Committed(commit_ts),
            };
        }
        let expired = match self.locks.get(primary) {
            Some(lock) if lock.start_ts == start_ts => lock.expired(now),
            _ => caller_expired,
        };
        if expired {
            tracing::debug!(primary = %primary, start_ts = %start_ts, "rolling back abandoned primary");
            self.rollback_key(primary, start_ts);
            TxnStatus::RolledBack
        } else {
            TxnStatus::Locked
        }
    }

    fn commit_key(&mut self, key: &Key, start_ts: Timestamp, commit_ts: Timestamp) {
        let Some(lock) = self.locks.get(key) else {
            return;
        };
        if lock.start_ts != start_ts {
            return;
        }
        let kind = match lock.kind {
            LockKind::Put => WriteKind::Put,
            LockKind::Delete => WriteKind::Delete,
            LockKind::Lock | LockKind::Pessimistic => WriteKind::Lock,
        };
        self.locks.remove(key);
        self.writes
            .entry(key.clone())
            .or_default()
            .insert(commit_ts, WriteRecord { start_ts, kind });
    }

    fn rollback_key(&mut self, key: &Key, start_ts: Timestamp) {
        if self.write_by(key, start_ts).is_some() {
            return;
        }
        if self
            .locks
            .get(key)
            .is_some_and(|lock| lock.start_ts == start_ts)
        {
            self.locks.remove(key);
        }
        if let Some(values) = self.data.get_mut(key) {
            values.remove(&start_ts);
        }
        self.writes.entry(key.clone()).or_default().insert(
            start_ts,
            WriteRecord {
                start_ts,
                kind: WriteKind::Rollback,
            },
        );
    }

    /// The commit or rollback record left by transaction `start_ts` on `key`.
    fn write_by(&self, key: &Key, start_ts: Timestamp) -> Option<(Timestamp, WriteRecord)> {
        self.writes.get(key).and_then(|versions| {
            versions
                .range(start_ts..)
                .find(|(_, w)| w.start_ts == start_ts)
                .map(|(commit_ts, w)| (*commit_ts, *w))
        })
    }

    /// Commit timestamp of the newest non-rollback write at or after `ts`.
    fn newest_write_since(&self, key: &Key, ts: Timestamp) -> Option<Timestamp> {
        self.writes.get(key).and_then(|versions| {
            versions
                .range(ts..)
                .rev()
                .find(|(_, w)| w.kind != WriteKind::Rollback)
                .map(|(commit_ts, _)| *commit_ts)
        })
    }

    fn committed_value(&self, key: &Key, ts: Timestamp) -> Option<Value> {
        let versions = self.writes.get(key)?;
        let (_, record) = versions
            .range(..=ts)
            .rev()
            .find(|(_, w)| matches!(w.kind, WriteKind::Put | WriteKind::Delete))?;
        match record.kind {
            WriteKind::Put => self.data.get(key)?.get(&record.start_ts).cloned(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(v: u64) -> Timestamp {
        Timestamp::from_version(v)
    }

    fn store() -> MvccStore {
        MvccStore::new(Duration::from_secs(60))
    }

    fn committed(store: &mut MvccStore, start: u64, commit: u64, key: &str, value: &str) {
        let now = Instant::now();
        store
            .prewrite(ts(start), &key.into(), vec![Mutation::put(key, value)], now)
            .unwrap();
        store.commit(ts(start), ts(commit), &[key.into()], true).unwrap();
    }

    #[test]
    fn reads_see_versions_by_commit_ts() {
        let mut store = store();
        let now = Instant::now();
        committed(&mut store, 1, 2, "k", "v1");
        committed(&mut store, 3, 4, "k", "v2");

        assert_eq!(store.get(ts(1), &"k".into(), now).unwrap(), None);
        assert_eq!(store.get(ts(2), &"k".into(), now).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(ts(3), &"k".into(), now).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(ts(9), &"k".into(), now).unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn prewrite_detects_newer_commit() {
        let mut store = store();
        committed(&mut store, 3, 5, "k", "v");
        let err = store
            .prewrite(ts(4), &"k".into(), vec![Mutation::put("k", "x")], Instant::now())
            .unwrap_err();
        assert_eq!(
            err,
            ClusterError::WriteConflict {
                key: "k".into(),
                start_ts: ts(4),
                conflict_commit_ts: ts(5),
            }
        );
    }

    #[test]
    fn failed_prewrite_installs_nothing() {
        let mut store = store();
        committed(&mut store, 3, 5, "b", "v");
        let result = store.prewrite(
            ts(4),
            &"a".into(),
            vec![Mutation::put("a", "x"), Mutation::put("b", "y")],
            Instant::now(),
        );
        assert!(result.is_err());
        assert!(store.locks().is_empty());
    }

    #[test]
    fn secondary_lock_resolves_through_committed_primary() {
        let mut store = store();
        let now = Instant::now();
        store
            .prewrite(
                ts(10),
                &"p".into(),
                vec![Mutation::put("p", "1"), Mutation::put("s", "2")],
                now,
            )
            .unwrap();
        store.commit(ts(10), ts(11), &["p".into()], true).unwrap();

        assert_eq!(store.get(ts(12), &"s".into(), now).unwrap(), Some(b"2".to_vec()));
        assert!(store.locks().is_empty());
    }

    #[test]
    fn live_lock_blocks_and_expired_lock_rolls_back() {
        let mut store = MvccStore::new(Duration::from_millis(10));
        let now = Instant::now();
        store
            .prewrite(ts(10), &"p".into(), vec![Mutation::put("p", "1")], now)
            .unwrap();
        assert!(matches!(
            store.get(ts(12), &"p".into(), now),
            Err(ClusterError::KeyLocked(_))
        ));

        let later = now + Duration::from_millis(20);
        assert_eq!(store.get(ts(12), &"p".into(), later).unwrap(), None);
        assert_eq!(
            store.commit(ts(10), ts(13), &["p".into()], true),
            Err(ClusterError::RolledBack {
                key: "p".into(),
                start_ts: ts(10),
            })
        );
    }

    #[test]
    fn pessimistic_lock_conflicts_on_commit_after_for_update_ts() {
        let mut store = store();
        let now = Instant::now();
        committed(&mut store, 1, 5, "k", "v");
        assert!(matches!(
            store.acquire_pessimistic_lock(ts(3), ts(4), &"k".into(), now),
            Err(ClusterError::WriteConflict { .. })
        ));
        assert_eq!(
            store
                .acquire_pessimistic_lock(ts(3), ts(6), &"k".into(), now)
                .unwrap(),
            Some(b"v".to_vec())
        );
        // Readers are not blocked by a pessimistic lock.
        assert_eq!(store.get(ts(7), &"k".into(), now).unwrap(), Some(b"v".to_vec()));
        store
            .prewrite(
                ts(3),
                &"k".into(),
                vec![Mutation::put("k", "w").with_pessimistic(true)],
                now,
            )
            .unwrap();
        store.commit(ts(3), ts(8), &["k".into()], true).unwrap();
        assert_eq!(store.get(ts(9), &"k".into(), now).unwrap(), Some(b"w".to_vec()));
    }

    #[test]
    fn gc_keeps_newest_visible_version() {
        let mut store = store();
        committed(&mut store, 1, 2, "k", "v1");
        committed(&mut store, 3, 4, "k", "v2");
        committed(&mut store, 5, 6, "k", "v3");
        store.gc(ts(5));

        assert_eq!(store.version_count(&"k".into()), 2);
        let now = Instant::now();
        assert_eq!(store.get(ts(5), &"k".into(), now).unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.get(ts(7), &"k".into(), now).unwrap(), Some(b"v3".to_vec()));
    }

    #[test]
    fn secondary_commit_waits_for_primary() {
        let mut store = store();
        let now = Instant::now();
        store
            .prewrite(
                ts(10),
                &"p".into(),
                vec![Mutation::put("p", "1"), Mutation::put("s", "2")],
                now,
            )
            .unwrap();

        let err = store
            .commit(ts(10), ts(12), &["s".into()], false)
            .unwrap_err();
        assert!(matches!(err, ClusterError::PrimaryNotCommitted { .. }));
        assert_eq!(store.locks().len(), 2);
        assert_eq!(store.version_count(&"s".into()), 0);

        store.commit(ts(10), ts(12), &["p".into()], true).unwrap();
        // A commit timestamp the primary did not commit at is refused as well.
        assert!(matches!(
            store.commit(ts(10), ts(13), &["s".into()], false),
            Err(ClusterError::PrimaryNotCommitted { .. })
        ));
        store.commit(ts(10), ts(12), &["s".into()], false).unwrap();
        assert_eq!(store.get(ts(12), &"s".into(), now).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn secondary_commit_of_rolled_back_primary_fails() {
        let mut store = store();
        let now = Instant::now();
        store
            .prewrite(
                ts(10),
                &"p".into(),
                vec![Mutation::put("p", "1"), Mutation::put("s", "2")],
                now,
            )
            .unwrap();
        store.rollback(ts(10), &["p".into()]);
        assert!(matches!(
            store.commit(ts(10), ts(12), &["s".into()], false),
            Err(ClusterError::RolledBack { .. })
        ));
        assert_eq!(store.version_count(&"s".into()), 0);
    }
}

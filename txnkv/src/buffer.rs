use std::collections::BTreeMap;

use txnkv_core::{BoundRange, Key, KvPair, Mutation, Op, Value};

/// A buffered change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BufferEntry {
    Put(Value),
    Delete,
    /// Pessimistically locked and not written; caches the value read under the lock.
    Locked(Option<Value>),
}

#[derive(Debug, Clone)]
struct Slot {
    entry: BufferEntry,
    /// The cluster holds a pessimistic lock of this transaction on the key.
    pessimistic: bool,
}

/// Result of looking a key up in the buffer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BufferRead {
    /// The buffer decides the value; the cluster is not consulted.
    Hit(Option<Value>),
    Miss,
}

/// Local write set of a transaction, ordered by key.
#[derive(Debug, Default)]
pub(crate) struct WriteBuffer {
    entries: BTreeMap<Key, Slot>,
    primary: Option<Key>,
}

impl WriteBuffer {
    pub(crate) fn get(&self, key: &Key) -> BufferRead {
        match self.entries.get(key).map(|slot| &slot.entry) {
            Some(BufferEntry::Put(value)) => BufferRead::Hit(Some(value.clone())),
            Some(BufferEntry::Delete) => BufferRead::Hit(None),
            Some(BufferEntry::Locked(cached)) => BufferRead::Hit(cached.clone()),
            None => BufferRead::Miss,
        }
    }

    pub(crate) fn put(&mut self, key: Key, value: Value) {
        self.write(key, BufferEntry::Put(value));
    }

    pub(crate) fn delete(&mut self, key: Key) {
        self.write(key, BufferEntry::Delete);
    }

    fn write(&mut self, key: Key, entry: BufferEntry) {
        self.primary.get_or_insert_with(|| key.clone());
        self.entries
            .entry(key)
            .and_modify(|slot| slot.entry = entry.clone())
            .or_insert(Slot {
                entry,
                pessimistic: false,
            });
    }

    /// Records a pessimistic lock. An existing mutation on the key is kept.
    pub(crate) fn lock(&mut self, key: Key, cached: Option<Value>) {
        self.primary.get_or_insert_with(|| key.clone());
        self.entries
            .entry(key)
            .and_modify(|slot| slot.pessimistic = true)
            .or_insert(Slot {
                entry: BufferEntry::Locked(cached),
                pessimistic: true,
            });
    }

    pub(crate) fn is_locked(&self, key: &Key) -> bool {
        self.entries.get(key).is_some_and(|slot| slot.pessimistic)
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn primary(&self) -> Option<&Key> {
        self.primary.as_ref()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn has_pessimistic_locks(&self) -> bool {
        self.entries.values().any(|slot| slot.pessimistic)
    }

    pub(crate) fn keys(&self) -> Vec<Key> {
        self.entries.keys().cloned().collect()
    }

    /// Every buffered key as a prewrite mutation; lock-only entries become [`Op::Lock`].
    pub(crate) fn mutations(&self) -> Vec<Mutation> {
        self.entries
            .iter()
            .map(|(key, slot)| Mutation {
                key: key.clone(),
                op: match &slot.entry {
                    BufferEntry::Put(value) => Op::Put(value.clone()),
                    BufferEntry::Delete => Op::Delete,
                    BufferEntry::Locked(_) => Op::Lock,
                },
                pessimistic: slot.pessimistic,
            })
            .collect()
    }

    /// Buffered entries inside `range`, in key order.
    pub(crate) fn range<'a>(
        &'a self,
        range: &BoundRange,
    ) -> impl Iterator<Item = (&'a Key, &'a BufferEntry)> + 'a {
        let entries = if range.is_empty() {
            None
        } else {
            Some(self.entries.range(range.clone()))
        };
        entries
            .into_iter()
            .flatten()
            .map(|(key, slot)| (key, &slot.entry))
    }

    pub(crate) fn deletes_in(&self, range: &BoundRange) -> usize {
        self.range(range)
            .filter(|(_, entry)| matches!(entry, BufferEntry::Delete))
            .count()
    }

    /// Overlays the buffer on `stored`, pairs read from the cluster in key order. Buffered
    /// puts inside `range` appear, buffered deletes hide stored keys, lock-only entries leave
    /// the stored value untouched.
    pub(crate) fn merge_scan(
        &self,
        range: &BoundRange,
        stored: Vec<KvPair>,
        limit: usize,
    ) -> Vec<KvPair> {
        let mut merged: BTreeMap<Key, Value> = stored.into_iter().map(Into::into).collect();
        for (key, entry) in self.range(range) {
            match entry {
                BufferEntry::Put(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                BufferEntry::Delete => {
                    merged.remove(key);
                }
                BufferEntry::Locked(_) => {}
            }
        }
        merged
            .into_iter()
            .take(limit)
            .map(|(key, value)| KvPair(key, value))
            .collect()
    }
}

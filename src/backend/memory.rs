//! In-memory reference engine: one ordered map per collection, every key
//! holding its committed version chain. Commits take the single write
//! guard, so sequence numbers order exactly like visibility.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{Backend, Capabilities, CollectionStats, WriteBatch};
use crate::error::{Result, StoreError};
use crate::model::{Collection, Key, SeqNo, COLLECTION_MAIN};

/// Committed versions of one key, oldest first. `None` is a tombstone.
type VersionChain = Vec<(SeqNo, Option<Vec<u8>>)>;

#[derive(Default)]
struct Shelf {
    entries: BTreeMap<Key, VersionChain>,
}

impl Shelf {
    fn latest(&self, key: Key) -> Option<&(SeqNo, Option<Vec<u8>>)> {
        self.entries.get(&key).and_then(|chain| chain.last())
    }

    /// Sequence of the last commit touching `key`; zero if none ever did.
    fn last_modified(&self, key: Key) -> SeqNo {
        self.latest(key).map(|(seq, _)| *seq).unwrap_or(0)
    }
}

pub struct MemoryBackend {
    shelves: RwLock<HashMap<Collection, Shelf>>,
    seq: AtomicU64,
    next_collection: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut shelves = HashMap::new();
        shelves.insert(COLLECTION_MAIN, Shelf::default());
        Self {
            shelves: RwLock::new(shelves),
            seq: AtomicU64::new(0),
            next_collection: AtomicU64::new(COLLECTION_MAIN + 1),
        }
    }

    fn append(shelves: &mut HashMap<Collection, Shelf>, batch: WriteBatch, seq: SeqNo) {
        for entry in batch.entries {
            let shelf = shelves.entry(entry.collection).or_default();
            shelf.entries.entry(entry.key).or_default().push((seq, entry.value));
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities { transactions: true, named_collections: true, snapshots: true }
    }

    fn get(&self, collection: Collection, key: Key) -> Result<Option<Vec<u8>>> {
        let shelves = self.shelves.read();
        let value = shelves
            .get(&collection)
            .and_then(|shelf| shelf.latest(key))
            .and_then(|(_, value)| value.clone());
        Ok(value)
    }

    fn apply(&self, batch: WriteBatch, _flush: bool) -> Result<SeqNo> {
        let mut shelves = self.shelves.write();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(seq, entries = batch.len(), "batch applied");
        Self::append(&mut shelves, batch, seq);
        Ok(seq)
    }

    fn range(&self, collection: Collection, min_key: Key, limit: u32) -> Result<Vec<Key>> {
        let shelves = self.shelves.read();
        let mut keys = Vec::new();
        if let Some(shelf) = shelves.get(&collection) {
            for (key, chain) in shelf.entries.range(min_key..) {
                if keys.len() == limit as usize {
                    break;
                }
                if chain.last().is_some_and(|(_, value)| value.is_some()) {
                    keys.push(*key);
                }
            }
        }
        Ok(keys)
    }

    fn measure(&self, collection: Collection) -> Result<CollectionStats> {
        let shelves = self.shelves.read();
        let mut stats = CollectionStats::default();
        if let Some(shelf) = shelves.get(&collection) {
            for chain in shelf.entries.values() {
                if let Some((_, Some(value))) = chain.last() {
                    stats.keys += 1;
                    stats.bytes += value.len() as u64;
                }
            }
        }
        Ok(stats)
    }

    fn collection_create(&self) -> Result<Collection> {
        let handle = self.next_collection.fetch_add(1, Ordering::Relaxed);
        self.shelves.write().insert(handle, Shelf::default());
        debug!(collection = handle, "collection created");
        Ok(handle)
    }

    fn collection_drop(&self, collection: Collection) -> Result<()> {
        if collection == COLLECTION_MAIN {
            return Err(StoreError::ArgsWrong("the main collection is perpetual"));
        }
        self.shelves.write().remove(&collection);
        debug!(collection, "collection dropped");
        Ok(())
    }

    fn collection_clear(&self, collection: Collection) -> Result<()> {
        // Tombstone every live key under one sequence so open snapshots
        // keep reading their own versions.
        let mut shelves = self.shelves.write();
        let Some(shelf) = shelves.get_mut(&collection) else {
            return Ok(());
        };
        let live: Vec<Key> = shelf
            .entries
            .iter()
            .filter(|(_, chain)| chain.last().is_some_and(|(_, value)| value.is_some()))
            .map(|(key, _)| *key)
            .collect();
        if live.is_empty() {
            return Ok(());
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        for key in live {
            shelf.entries.entry(key).or_default().push((seq, None));
        }
        debug!(collection, seq, "collection cleared");
        Ok(())
    }

    fn snapshot_seq(&self) -> Result<SeqNo> {
        // The read guard keeps a mid-flight commit from being half-visible.
        let _shelves = self.shelves.read();
        Ok(self.seq.load(Ordering::Relaxed))
    }

    fn get_at(&self, collection: Collection, key: Key, seq: SeqNo) -> Result<Option<Vec<u8>>> {
        let shelves = self.shelves.read();
        let value = shelves.get(&collection).and_then(|shelf| {
            shelf.entries.get(&key).and_then(|chain| {
                chain
                    .iter()
                    .rev()
                    .find(|(version, _)| *version <= seq)
                    .and_then(|(_, value)| value.clone())
            })
        });
        Ok(value)
    }

    fn commit(
        &self,
        batch: WriteBatch,
        watches: &[(Collection, Key)],
        snapshot: SeqNo,
        _flush: bool,
    ) -> Result<SeqNo> {
        let mut shelves = self.shelves.write();
        for (collection, key) in watches {
            let modified = shelves
                .get(collection)
                .map(|shelf| shelf.last_modified(*key))
                .unwrap_or(0);
            if modified > snapshot {
                debug!(collection, key, modified, snapshot, "commit conflict");
                return Err(StoreError::Conflict);
            }
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(seq, entries = batch.len(), watches = watches.len(), "commit applied");
        Self::append(&mut shelves, batch, seq);
        Ok(seq)
    }
}

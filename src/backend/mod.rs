//! The narrow capability surface the data plane consumes from a storage
//! engine. Engines advertise optional features through [`Capabilities`];
//! verbs gated on a missing capability fail with `UNSUPPORTED` instead of
//! being emulated.

use crate::error::{Result, StoreError};
use crate::model::{Collection, Key, SeqNo};

mod memory;

pub use memory::MemoryBackend;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub transactions: bool,
    pub named_collections: bool,
    pub snapshots: bool,
}

/// One staged mutation; a `None` payload is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub collection: Collection,
    pub key: Key,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub entries: Vec<BatchEntry>,
}

impl WriteBatch {
    pub fn with_capacity(n: usize) -> Self {
        Self { entries: Vec::with_capacity(n) }
    }

    pub fn put(&mut self, collection: Collection, key: Key, value: Vec<u8>) {
        self.entries.push(BatchEntry { collection, key, value: Some(value) });
    }

    pub fn delete(&mut self, collection: Collection, key: Key) {
        self.entries.push(BatchEntry { collection, key, value: None });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub bytes: u64,
    pub keys: u64,
    pub approximate: bool,
}

pub trait Backend: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Latest committed value.
    fn get(&self, collection: Collection, key: Key) -> Result<Option<Vec<u8>>>;

    fn put(&self, collection: Collection, key: Key, value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.put(collection, key, value.to_vec());
        self.apply(batch, false).map(|_| ())
    }

    fn delete(&self, collection: Collection, key: Key) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.delete(collection, key);
        self.apply(batch, false).map(|_| ())
    }

    /// Apply every entry with atomic visibility and return the commit
    /// sequence number. `flush` requests durability before returning where
    /// the engine is persistent.
    fn apply(&self, batch: WriteBatch, flush: bool) -> Result<SeqNo>;

    /// Up to `limit` keys `>= min_key`, ascending.
    fn range(&self, collection: Collection, min_key: Key, limit: u32) -> Result<Vec<Key>>;

    fn measure(&self, collection: Collection) -> Result<CollectionStats>;

    /// Allocate a fresh namespace handle.
    fn collection_create(&self) -> Result<Collection> {
        Err(StoreError::Unsupported("named collections"))
    }

    /// Drop a namespace and everything in it.
    fn collection_drop(&self, _collection: Collection) -> Result<()> {
        Err(StoreError::Unsupported("named collections"))
    }

    /// Remove all keys in a namespace, atomically if the engine can.
    fn collection_clear(&self, collection: Collection) -> Result<()>;

    /// Current snapshot sequence number for transactional reads.
    fn snapshot_seq(&self) -> Result<SeqNo> {
        Err(StoreError::Unsupported("snapshots"))
    }

    /// Value as of `seq`.
    fn get_at(&self, _collection: Collection, _key: Key, _seq: SeqNo) -> Result<Option<Vec<u8>>> {
        Err(StoreError::Unsupported("snapshots"))
    }

    /// Optimistic commit: apply `batch` iff none of `watches` changed after
    /// `snapshot`, returning the new sequence number, else `CONFLICT`.
    fn commit(
        &self,
        _batch: WriteBatch,
        _watches: &[(Collection, Key)],
        _snapshot: SeqNo,
        _flush: bool,
    ) -> Result<SeqNo> {
        Err(StoreError::Unsupported("transactions"))
    }
}

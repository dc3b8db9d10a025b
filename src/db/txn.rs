//! Transaction handles: snapshot-isolated reads, buffered writes, and
//! optimistic sequenced commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Backend, WriteBatch};
use crate::error::{Result, StoreError};
use crate::model::{Collection, Key, Options, SeqNo};
use crate::validate;

pub type TxnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Open,
    Committed,
    Aborted,
}

/// An in-flight transaction. The handle is single-threaded by contract;
/// dropping it without commit aborts.
pub struct Transaction {
    id: TxnId,
    backend: Arc<dyn Backend>,
    snapshot: SeqNo,
    watched: HashSet<(Collection, Key)>,
    writes: HashMap<(Collection, Key), Option<Vec<u8>>>,
    state: TxnState,
    dont_watch: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("state", &self.state)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn begin(backend: Arc<dyn Backend>, id: TxnId, options: Options) -> Result<Self> {
        validate::validate_txn_begin(options)?;
        if !backend.capabilities().transactions {
            return Err(StoreError::Unsupported("transactions"));
        }
        let snapshot = backend.snapshot_seq()?;
        debug!(txn = id, snapshot, "transaction started");
        Ok(Self {
            id,
            backend,
            snapshot,
            watched: HashSet::new(),
            writes: HashMap::new(),
            state: TxnState::Open,
            dont_watch: options.contains(Options::TXN_DONT_WATCH),
        })
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn snapshot_seq(&self) -> SeqNo {
        self.snapshot
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == TxnState::Open {
            Ok(())
        } else {
            Err(StoreError::ArgsWrong("transaction is no longer open"))
        }
    }

    /// Read through the staged overlay, then as of the snapshot. Snapshot
    /// reads land in the watched set unless watching is off for the
    /// transaction or for this call.
    pub(crate) fn get(&mut self, collection: Collection, key: Key, watch: bool) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        if let Some(staged) = self.writes.get(&(collection, key)) {
            return Ok(staged.clone());
        }
        if watch && !self.dont_watch {
            self.watched.insert((collection, key));
        }
        self.backend.get_at(collection, key, self.snapshot)
    }

    /// Buffer a write; `None` stages a tombstone. Last-stated intent wins.
    pub(crate) fn stage(&mut self, collection: Collection, key: Key, value: Option<Vec<u8>>) -> Result<()> {
        self.ensure_open()?;
        self.writes.insert((collection, key), value);
        Ok(())
    }

    pub(crate) fn watch(&mut self, collection: Collection, key: Key) {
        if !self.dont_watch {
            self.watched.insert((collection, key));
        }
    }

    /// Staged keys of `collection` at or above `min_key`, sorted, with a
    /// tombstone flag. Used to overlay scans.
    pub(crate) fn staged_range(&self, collection: Collection, min_key: Key) -> Vec<(Key, bool)> {
        let mut staged: Vec<(Key, bool)> = self
            .writes
            .iter()
            .filter(|((c, k), _)| *c == collection && *k >= min_key)
            .map(|((_, k), value)| (*k, value.is_none()))
            .collect();
        staged.sort_unstable();
        staged
    }

    /// Atomic commit. Success returns a sequence number greater than the
    /// snapshot; a lost race returns `CONFLICT` and leaves the transaction
    /// open for `reset`.
    pub fn commit(&mut self, options: Options) -> Result<SeqNo> {
        validate::validate_txn_commit(options)?;
        self.ensure_open()?;

        let mut batch = WriteBatch::with_capacity(self.writes.len());
        for ((collection, key), value) in &self.writes {
            batch.entries.push(crate::backend::BatchEntry {
                collection: *collection,
                key: *key,
                value: value.clone(),
            });
        }
        let watches: Vec<(Collection, Key)> = self.watched.iter().copied().collect();
        let flush = options.contains(Options::WRITE_FLUSH);

        match self.backend.commit(batch, &watches, self.snapshot, flush) {
            Ok(seq) => {
                self.state = TxnState::Committed;
                self.writes.clear();
                self.watched.clear();
                debug!(txn = self.id, seq, "transaction committed");
                Ok(seq)
            }
            Err(StoreError::Conflict) => {
                warn!(txn = self.id, snapshot = self.snapshot, "commit lost the race");
                Err(StoreError::Conflict)
            }
            Err(other) => Err(other),
        }
    }

    /// Forget staged state and re-snapshot, keeping the handle.
    pub fn reset(&mut self) -> Result<()> {
        self.writes.clear();
        self.watched.clear();
        self.snapshot = self.backend.snapshot_seq()?;
        self.state = TxnState::Open;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxnState::Open && !self.writes.is_empty() {
            debug!(txn = self.id, staged = self.writes.len(), "open transaction dropped, discarding writes");
        }
        self.state = TxnState::Aborted;
    }
}

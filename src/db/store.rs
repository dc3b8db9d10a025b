use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::arena::Arena;
use crate::backend::{Backend, Capabilities, CollectionStats, MemoryBackend};
use crate::config::Config;
use crate::db::blobs::{self, KeysView, ReadView};
use crate::db::txn::Transaction;
use crate::error::{Result, StoreError};
use crate::model::{Collection, Key, Options, COLLECTION_MAIN};
use crate::ranges::{ContentsArg, PlacesArg, SamplesArg, ScansArg, Strided};

/// An open store: one backend, a name registry, and the batched data plane.
///
/// The store itself is shared freely across threads; arenas and transaction
/// handles are single-threaded by contract.
pub struct Store {
    backend: Arc<dyn Backend>,
    config: Config,
    names: RwLock<HashMap<String, Collection>>,
    next_txn: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("config", &self.config).finish()
    }
}

impl Store {
    /// Open a store from a JSON configuration document. An empty document
    /// selects the in-memory reference engine with defaults.
    pub fn open(config_json: &str) -> Result<Self> {
        let config = Config::parse(config_json)?;
        let backend: Arc<dyn Backend> = match config.engine() {
            "memory" => Arc::new(MemoryBackend::new()),
            _ => return Err(StoreError::Unsupported("unknown storage engine")),
        };
        let directory = config.resolve_directory();
        info!(engine = config.engine(), ?directory, "store opened");
        Ok(Self {
            backend,
            config,
            names: RwLock::new(HashMap::new()),
            next_txn: AtomicU64::new(1),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Transactions ===

    pub fn txn_begin(&self, options: Options) -> Result<Transaction> {
        let id = self.next_txn.fetch_add(1, Ordering::Relaxed);
        Transaction::begin(self.backend.clone(), id, options)
    }

    // === Data plane ===

    pub fn write(
        &self,
        txn: Option<&mut Transaction>,
        places: &PlacesArg,
        contents: &ContentsArg,
        options: Options,
    ) -> Result<()> {
        blobs::write(self.backend.as_ref(), txn, places, contents, options)
    }

    pub fn read<'a>(
        &self,
        txn: Option<&mut Transaction>,
        places: &PlacesArg,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<ReadView<'a>> {
        blobs::read(self.backend.as_ref(), txn, places, options, arena)
    }

    pub fn scan<'a>(
        &self,
        txn: Option<&mut Transaction>,
        scans: &ScansArg,
        options: Options,
        arena: &'a mut Arena,
    ) -> Result<KeysView<'a>> {
        blobs::scan(self.backend.as_ref(), txn, scans, options, arena)
    }

    pub fn sample<'a>(
        &self,
        samples: &SamplesArg,
        options: Options,
        seed: Option<u64>,
        arena: &'a mut Arena,
    ) -> Result<KeysView<'a>> {
        blobs::sample(self.backend.as_ref(), samples, options, seed, arena)
    }

    pub fn measure(&self, collections: &[Collection]) -> Result<Vec<CollectionStats>> {
        blobs::measure(self.backend.as_ref(), collections)
    }

    // === Single-key conveniences ===

    /// Write or delete one value with the same semantics as a one-element
    /// batch.
    pub fn write_one(
        &self,
        txn: Option<&mut Transaction>,
        collection: Collection,
        key: Key,
        value: Option<&[u8]>,
    ) -> Result<()> {
        let keys = [key];
        let places = PlacesArg::new(
            Strided::broadcast(&collection, 1),
            Strided::from_slice(&keys),
            1,
        );
        match value {
            Some(value) => {
                let ptrs = [value.as_ptr()];
                let lens = [value.len() as u32];
                let contents = ContentsArg::from_parts(&ptrs, &lens);
                self.write(txn, &places, &contents, Options::NONE)
            }
            None => self.write(txn, &places, &ContentsArg::deletions(1), Options::NONE),
        }
    }

    /// Read one value; `None` for a missing key.
    pub fn read_one(
        &self,
        txn: Option<&mut Transaction>,
        collection: Collection,
        key: Key,
    ) -> Result<Option<Vec<u8>>> {
        self.value(txn, collection, key, true)
    }

    /// Transaction-aware point lookup shared with the graph layer.
    pub(crate) fn value(
        &self,
        txn: Option<&mut Transaction>,
        collection: Collection,
        key: Key,
        watch: bool,
    ) -> Result<Option<Vec<u8>>> {
        match txn {
            Some(txn) => txn.get(collection, key, watch),
            None => self.backend.get(collection, key),
        }
    }

    // === Collections registry ===

    /// Create-or-open a named collection; the empty name is the main
    /// collection every store has.
    pub fn collection_open(&self, name: &str) -> Result<Collection> {
        if name.is_empty() {
            return Ok(COLLECTION_MAIN);
        }
        if !self.capabilities().named_collections {
            return Err(StoreError::Unsupported("named collections"));
        }
        if let Some(handle) = self.names.read().get(name) {
            return Ok(*handle);
        }
        let mut names = self.names.write();
        if let Some(handle) = names.get(name) {
            return Ok(*handle);
        }
        let handle = self.backend.collection_create()?;
        names.insert(name.to_string(), handle);
        debug!(name, collection = handle, "collection opened");
        Ok(handle)
    }

    /// Drop a named collection and every key in it.
    pub fn collection_remove(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StoreError::ArgsWrong("the main collection is perpetual"));
        }
        let mut names = self.names.write();
        let handle = names
            .get(name)
            .copied()
            .ok_or(StoreError::ArgsWrong("unknown collection name"))?;
        self.backend.collection_drop(handle)?;
        names.remove(name);
        debug!(name, collection = handle, "collection removed");
        Ok(())
    }

    /// Named collections, sorted by name. The main collection is unnamed
    /// and not listed.
    pub fn collection_list(&self) -> Vec<(String, Collection)> {
        let mut list: Vec<(String, Collection)> = self
            .names
            .read()
            .iter()
            .map(|(name, handle)| (name.clone(), *handle))
            .collect();
        list.sort();
        list
    }

    /// Remove all keys in a collection, atomically where the backend can.
    pub fn clear(&self, collection: Collection) -> Result<()> {
        self.backend.collection_clear(collection)
    }

    // === Diagnostics ===

    /// Engine control queries. Only diagnostics are recognized.
    pub fn database_control(&self, query: &str) -> Result<String> {
        match query {
            "version" => Ok(self.config.version.clone()),
            _ => Err(StoreError::Unsupported("unknown control query")),
        }
    }
}

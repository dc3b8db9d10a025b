//! UStore: an embeddable, transactional, multi-modal key-value store.
//!
//! One batched, columnar data plane carries opaque blobs and a property
//! graph over a pluggable ordered backend. Calls take structure-of-arrays
//! views of their inputs, optionally under a snapshot-isolated transaction,
//! and pack their outputs into a caller-owned arena.

pub mod arena;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod ffi;
pub mod graph;
pub mod model;
pub mod ranges;
pub mod validate;

pub use crate::arena::Arena;
pub use crate::backend::{Backend, Capabilities, CollectionStats, MemoryBackend, WriteBatch};
pub use crate::config::Config;
pub use crate::db::{KeysView, ReadView, Store, Transaction, TxnId, TxnState};
pub use crate::error::{Result, StoreError};
pub use crate::graph::{EdgeList, GraphConfig, GraphIndex};
pub use crate::model::{
    Collection, Edge, Key, Options, Role, SeqNo, COLLECTION_MAIN, DEFAULT_EDGE_ID, KEY_UNKNOWN,
    VAL_LEN_MISSING,
};
pub use crate::ranges::{
    ContentsArg, EdgesArg, Place, PlacesArg, SampleSpec, SamplesArg, ScanSpec, ScansArg, Strided,
};

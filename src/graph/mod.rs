//! Property-graph index over one ordered collection. Each vertex key maps
//! to its encoded adjacency record; every mutation is a read-modify-write
//! of both endpoint records inside the current (possibly implicit)
//! transaction, so the graph inherits the store's conflict rules.

pub mod adjacency;

use tracing::debug;

use crate::db::{Store, Transaction};
use crate::error::{Result, StoreError};
use crate::model::{Collection, Edge, Key, Options, Role};
use crate::ranges::EdgesArg;

use adjacency::{AdjacencyEntry, AdjacencyList};

#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    pub directed: bool,
    pub multi: bool,
    pub allow_self_loops: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { directed: false, multi: false, allow_self_loops: true }
    }
}

/// Incident edges of one vertex, as three aligned key columns.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EdgeList {
    pub sources: Vec<Key>,
    pub targets: Vec<Key>,
    pub ids: Vec<Key>,
}

impl EdgeList {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, i: usize) -> Edge {
        Edge { source: self.sources[i], target: self.targets[i], id: self.ids[i] }
    }
}

#[derive(Clone, Copy)]
enum MutateOp {
    Upsert,
    Remove,
}

pub struct GraphIndex<'s> {
    store: &'s Store,
    collection: Collection,
    config: GraphConfig,
}

impl<'s> GraphIndex<'s> {
    pub fn new(store: &'s Store, collection: Collection, config: GraphConfig) -> Self {
        Self { store, collection, config }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn config(&self) -> GraphConfig {
        self.config
    }

    /// Insert or update edges, atomically in bulk. Without a caller
    /// transaction an implicit one is opened and committed; a lost race
    /// surfaces as `CONFLICT`.
    pub fn upsert_edges(&self, txn: Option<&mut Transaction>, edges: &EdgesArg) -> Result<()> {
        self.mutate(txn, edges, MutateOp::Upsert)
    }

    /// Remove edges. A missing adjacency record is not an error; the
    /// default edge id removes every edge between the pair.
    pub fn remove_edges(&self, txn: Option<&mut Transaction>, edges: &EdgesArg) -> Result<()> {
        self.mutate(txn, edges, MutateOp::Remove)
    }

    fn mutate(&self, txn: Option<&mut Transaction>, edges: &EdgesArg, op: MutateOp) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        if !self.config.allow_self_loops {
            for i in 0..edges.len() {
                let edge = edges.get(i);
                if edge.source == edge.target {
                    return Err(StoreError::ArgsWrong("self-loops are disabled for this graph"));
                }
            }
        }
        match txn {
            Some(txn) => self.apply_edges(txn, edges, op),
            None => {
                let mut implicit = self.store.txn_begin(Options::NONE)?;
                self.apply_edges(&mut implicit, edges, op)?;
                let seq = implicit.commit(Options::NONE)?;
                debug!(collection = self.collection, edges = edges.len(), seq, "graph batch committed");
                Ok(())
            }
        }
    }

    fn apply_edges(&self, txn: &mut Transaction, edges: &EdgesArg, op: MutateOp) -> Result<()> {
        for i in 0..edges.len() {
            let edge = edges.get(i);
            if edge.source == edge.target {
                // One record carrying both roles.
                self.update_record(txn, edge.source, edge.target, Role::ANY, edge.id, op)?;
                continue;
            }
            let (source_role, target_role) = if self.config.directed {
                (Role::SOURCE, Role::TARGET)
            } else {
                (Role::ANY, Role::ANY)
            };
            self.update_record(txn, edge.source, edge.target, source_role, edge.id, op)?;
            self.update_record(txn, edge.target, edge.source, target_role, edge.id, op)?;
        }
        Ok(())
    }

    fn update_record(
        &self,
        txn: &mut Transaction,
        vertex: Key,
        peer: Key,
        role: Role,
        edge_id: Key,
        op: MutateOp,
    ) -> Result<()> {
        let current = txn.get(self.collection, vertex, true)?;
        match op {
            MutateOp::Upsert => {
                let mut entries = match &current {
                    Some(bytes) => adjacency::decode(bytes)?,
                    None => AdjacencyList::new(),
                };
                let changed =
                    adjacency::upsert(&mut entries, AdjacencyEntry { peer, edge_id, role }, self.config.multi);
                if changed || current.is_none() {
                    txn.stage(self.collection, vertex, Some(adjacency::encode(&entries)))?;
                }
            }
            MutateOp::Remove => {
                let Some(bytes) = &current else {
                    return Ok(());
                };
                let mut entries = adjacency::decode(bytes)?;
                if adjacency::remove(&mut entries, peer, role, edge_id) {
                    // The vertex outlives its last edge.
                    txn.stage(self.collection, vertex, Some(adjacency::encode(&entries)))?;
                }
            }
        }
        Ok(())
    }

    fn record(&self, txn: Option<&mut Transaction>, vertex: Key) -> Result<Option<AdjacencyList>> {
        match self.store.value(txn, self.collection, vertex, true)? {
            Some(bytes) => Ok(Some(adjacency::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Incident edges of `vertex`, filtered by role, in encoded order.
    /// Directed records keep their stored orientation.
    pub fn edges(&self, txn: Option<&mut Transaction>, vertex: Key, role: Role) -> Result<EdgeList> {
        let mut list = EdgeList::default();
        let Some(entries) = self.record(txn, vertex)? else {
            return Ok(list);
        };
        for entry in entries.iter().filter(|e| e.role.overlaps(role)) {
            let (source, target) = if entry.role == Role::TARGET {
                (entry.peer, vertex)
            } else {
                (vertex, entry.peer)
            };
            list.sources.push(source);
            list.targets.push(target);
            list.ids.push(entry.edge_id);
        }
        Ok(list)
    }

    /// Incident edges with the peer always placed in `targets`, swapping
    /// endpoint fields in the returned copy only.
    pub fn neighbors(&self, txn: Option<&mut Transaction>, vertex: Key) -> Result<EdgeList> {
        let mut list = EdgeList::default();
        let Some(entries) = self.record(txn, vertex)? else {
            return Ok(list);
        };
        for entry in entries.iter() {
            list.sources.push(vertex);
            list.targets.push(entry.peer);
            list.ids.push(entry.edge_id);
        }
        Ok(list)
    }

    /// Count of incident edges by role, from one decode, without
    /// materializing the neighbor list.
    pub fn degree(&self, txn: Option<&mut Transaction>, vertex: Key, role: Role) -> Result<u32> {
        let Some(entries) = self.record(txn, vertex)? else {
            return Ok(0);
        };
        Ok(entries.iter().filter(|e| e.role.overlaps(role)).count() as u32)
    }

    /// Batched degrees. A single role broadcasts over every vertex.
    pub fn degrees(
        &self,
        mut txn: Option<&mut Transaction>,
        vertices: &[Key],
        roles: &[Role],
    ) -> Result<Vec<u32>> {
        if roles.len() != vertices.len() && roles.len() != 1 {
            return Err(StoreError::ArgsWrong("one role per vertex, or one role for all"));
        }
        let mut degrees = Vec::with_capacity(vertices.len());
        for (i, vertex) in vertices.iter().enumerate() {
            let role = if roles.len() == 1 { roles[0] } else { roles[i] };
            degrees.push(self.degree(txn.as_deref_mut(), *vertex, role)?);
        }
        Ok(degrees)
    }

    /// Presence bitmap over the input, one bit per vertex, packed LSB
    /// first into bytes.
    pub fn contains(&self, mut txn: Option<&mut Transaction>, vertices: &[Key]) -> Result<Vec<u8>> {
        let mut bits = vec![0u8; vertices.len().div_ceil(8)];
        for (i, vertex) in vertices.iter().enumerate() {
            let present = self
                .store
                .value(txn.as_deref_mut(), self.collection, *vertex, true)?
                .is_some();
            if present {
                bits[i / 8] |= 1 << (i % 8);
            }
        }
        Ok(bits)
    }

    pub fn contains_one(&self, txn: Option<&mut Transaction>, vertex: Key) -> Result<bool> {
        Ok(self.contains(txn, &[vertex])?[0] & 1 == 1)
    }
}

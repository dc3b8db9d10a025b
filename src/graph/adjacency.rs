//! Per-vertex adjacency encoding: a `u32` count prefix followed by
//! fixed-size records `(peer i64, edge_id i64, role u8)`, little-endian,
//! kept sorted by `(peer, edge_id, role)`. Merging is decode + sorted
//! insert + re-encode; stored records are never edited in place.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::error::{Result, StoreError};
use crate::model::{Key, Role, DEFAULT_EDGE_ID};

pub(crate) const RECORD_LEN: usize = 17;
const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacencyEntry {
    pub peer: Key,
    pub edge_id: Key,
    pub role: Role,
}

pub type AdjacencyList = SmallVec<[AdjacencyEntry; 4]>;

fn order(a: &AdjacencyEntry, b: &AdjacencyEntry) -> Ordering {
    (a.peer, a.edge_id, a.role.bits()).cmp(&(b.peer, b.edge_id, b.role.bits()))
}

pub fn decode(bytes: &[u8]) -> Result<AdjacencyList> {
    if bytes.len() < HEADER_LEN {
        return Err(StoreError::Corruption("adjacency record shorter than its header"));
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if bytes.len() != HEADER_LEN + count * RECORD_LEN {
        return Err(StoreError::Corruption("adjacency length prefix mismatch"));
    }
    let mut entries = AdjacencyList::with_capacity(count);
    for record in bytes[HEADER_LEN..].chunks_exact(RECORD_LEN) {
        let mut peer = [0u8; 8];
        peer.copy_from_slice(&record[0..8]);
        let mut edge_id = [0u8; 8];
        edge_id.copy_from_slice(&record[8..16]);
        let role = Role::from_bits(record[16])
            .ok_or(StoreError::Corruption("invalid adjacency role byte"))?;
        entries.push(AdjacencyEntry {
            peer: Key::from_le_bytes(peer),
            edge_id: Key::from_le_bytes(edge_id),
            role,
        });
    }
    Ok(entries)
}

pub fn encode(entries: &[AdjacencyEntry]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + entries.len() * RECORD_LEN);
    bytes.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        bytes.extend_from_slice(&entry.peer.to_le_bytes());
        bytes.extend_from_slice(&entry.edge_id.to_le_bytes());
        bytes.push(entry.role.bits());
    }
    bytes
}

/// Merge one entry. In multi mode the full triple is the identity and
/// duplicates are dropped; otherwise `(peer, role)` is the identity and the
/// newest edge id wins. Returns whether the list changed.
pub fn upsert(entries: &mut AdjacencyList, entry: AdjacencyEntry, multi: bool) -> bool {
    if multi {
        match entries.binary_search_by(|e| order(e, &entry)) {
            Ok(_) => false,
            Err(pos) => {
                entries.insert(pos, entry);
                true
            }
        }
    } else {
        if let Some(pos) = entries
            .iter()
            .position(|e| e.peer == entry.peer && e.role == entry.role)
        {
            if entries[pos].edge_id == entry.edge_id {
                return false;
            }
            entries.remove(pos);
        }
        let pos = match entries.binary_search_by(|e| order(e, &entry)) {
            Ok(pos) | Err(pos) => pos,
        };
        entries.insert(pos, entry);
        true
    }
}

/// Remove matching entries. The default edge id matches every edge between
/// the pair in that role; a concrete id removes only that triple. Returns
/// whether the list changed.
pub fn remove(entries: &mut AdjacencyList, peer: Key, role: Role, edge_id: Key) -> bool {
    let before = entries.len();
    if edge_id == DEFAULT_EDGE_ID {
        entries.retain(|e| !(e.peer == peer && e.role == role));
    } else {
        let probe = AdjacencyEntry { peer, edge_id, role };
        if let Ok(pos) = entries.binary_search_by(|e| order(e, &probe)) {
            entries.remove(pos);
        }
    }
    entries.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn entry(peer: Key, edge_id: Key, role: Role) -> AdjacencyEntry {
        AdjacencyEntry { peer, edge_id, role }
    }

    #[test]
    fn codec_round_trip() {
        let entries: AdjacencyList = smallvec![
            entry(-5, 1, Role::TARGET),
            entry(2, 100, Role::SOURCE),
            entry(2, 101, Role::SOURCE),
            entry(9, DEFAULT_EDGE_ID, Role::ANY),
        ];
        let bytes = encode(&entries);
        assert_eq!(bytes.len(), 4 + entries.len() * RECORD_LEN);
        assert_eq!(decode(&bytes).unwrap(), entries);

        let empty = encode(&[]);
        assert!(decode(&empty).unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_bad_payloads() {
        assert_eq!(decode(&[1, 2]).unwrap_err().kind(), "CORRUPTION");

        let mut truncated = encode(&[entry(1, 1, Role::SOURCE)]);
        truncated.pop();
        assert_eq!(decode(&truncated).unwrap_err().kind(), "CORRUPTION");

        let mut bad_role = encode(&[entry(1, 1, Role::SOURCE)]);
        let last = bad_role.len() - 1;
        bad_role[last] = 0x40;
        assert_eq!(decode(&bad_role).unwrap_err().kind(), "CORRUPTION");
    }

    #[test]
    fn upsert_keeps_sorted_order() {
        let mut entries = AdjacencyList::new();
        assert!(upsert(&mut entries, entry(5, 1, Role::SOURCE), true));
        assert!(upsert(&mut entries, entry(2, 9, Role::SOURCE), true));
        assert!(upsert(&mut entries, entry(2, 3, Role::SOURCE), true));
        let peers: Vec<(Key, Key)> = entries.iter().map(|e| (e.peer, e.edge_id)).collect();
        assert_eq!(peers, vec![(2, 3), (2, 9), (5, 1)]);
    }

    #[test]
    fn upsert_multi_keeps_duplicates_apart() {
        let mut entries = AdjacencyList::new();
        assert!(upsert(&mut entries, entry(2, 10, Role::SOURCE), true));
        assert!(upsert(&mut entries, entry(2, 11, Role::SOURCE), true));
        assert!(!upsert(&mut entries, entry(2, 10, Role::SOURCE), true));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn upsert_single_updates_edge_id() {
        let mut entries = AdjacencyList::new();
        assert!(upsert(&mut entries, entry(2, 10, Role::SOURCE), false));
        assert!(upsert(&mut entries, entry(2, 11, Role::SOURCE), false));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].edge_id, 11);
        assert!(!upsert(&mut entries, entry(2, 11, Role::SOURCE), false));
    }

    #[test]
    fn remove_by_default_id_sweeps_the_pair() {
        let mut entries = AdjacencyList::new();
        upsert(&mut entries, entry(2, 10, Role::SOURCE), true);
        upsert(&mut entries, entry(2, 11, Role::SOURCE), true);
        upsert(&mut entries, entry(3, 12, Role::SOURCE), true);

        assert!(remove(&mut entries, 2, Role::SOURCE, DEFAULT_EDGE_ID));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].peer, 3);

        assert!(!remove(&mut entries, 2, Role::SOURCE, DEFAULT_EDGE_ID));
    }

    #[test]
    fn remove_specific_triple_only() {
        let mut entries = AdjacencyList::new();
        upsert(&mut entries, entry(2, 10, Role::SOURCE), true);
        upsert(&mut entries, entry(2, 11, Role::SOURCE), true);

        assert!(remove(&mut entries, 2, Role::SOURCE, 10));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].edge_id, 11);
    }
}

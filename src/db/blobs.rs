//! The batched blob data plane: SoA columns in, arena-packed columns out.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::arena::Arena;
use crate::backend::{Backend, CollectionStats, WriteBatch};
use crate::db::txn::Transaction;
use crate::error::{Result, StoreError};
use crate::model::{Collection, Key, Options, VAL_LEN_MISSING};
use crate::ranges::{ContentsArg, PlacesArg, SamplesArg, ScansArg};
use crate::validate;

/// Read output: one `u32` per requested place (`VAL_LEN_MISSING` marks an
/// absent key) and the found values concatenated in index order.
pub struct ReadView<'a> {
    pub lengths: &'a [u32],
    pub bytes: &'a [u8],
}

impl<'a> ReadView<'a> {
    /// Value at index `i`: `None` for a missing key.
    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        let len = *self.lengths.get(i)?;
        if len == VAL_LEN_MISSING {
            return None;
        }
        let offset: usize = self.lengths[..i]
            .iter()
            .filter(|l| **l != VAL_LEN_MISSING)
            .map(|l| *l as usize)
            .sum();
        Some(&self.bytes[offset..offset + len as usize])
    }
}

/// Scan/sample output: one count per request and the found keys
/// concatenated in request order.
pub struct KeysView<'a> {
    pub counts: &'a [u32],
    pub keys: &'a [Key],
}

impl<'a> KeysView<'a> {
    pub fn get(&self, i: usize) -> &'a [Key] {
        let offset: usize = self.counts[..i].iter().map(|c| *c as usize).sum();
        &self.keys[offset..offset + self.counts[i] as usize]
    }
}

fn maybe_reset(arena: &mut Arena, options: Options) {
    if !options.contains(Options::DONT_DISCARD_MEMORY) {
        arena.reset();
    }
}

pub(crate) fn write(
    backend: &dyn Backend,
    txn: Option<&mut Transaction>,
    places: &PlacesArg,
    contents: &ContentsArg,
    options: Options,
) -> Result<()> {
    validate::validate_write(places, contents, options)?;
    for i in 0..places.len() {
        if let Some(value) = contents.get(i) {
            if value.len() >= VAL_LEN_MISSING as usize {
                return Err(StoreError::ArgsWrong("value exceeds the addressable length"));
            }
        }
    }
    match txn {
        Some(txn) => {
            for i in 0..places.len() {
                let place = places.get(i);
                txn.stage(place.collection, place.key, contents.get(i).map(|v| v.to_vec()))?;
            }
            Ok(())
        }
        None => {
            let flush = options.contains(Options::WRITE_FLUSH);
            if places.len() == 1 && !flush {
                let place = places.get(0);
                return match contents.get(0) {
                    Some(value) => backend.put(place.collection, place.key, value),
                    None => backend.delete(place.collection, place.key),
                };
            }
            let mut batch = WriteBatch::with_capacity(places.len());
            for i in 0..places.len() {
                let place = places.get(i);
                match contents.get(i) {
                    Some(value) => batch.put(place.collection, place.key, value.to_vec()),
                    None => batch.delete(place.collection, place.key),
                }
            }
            backend.apply(batch, flush).map(|_| ())
        }
    }
}

pub(crate) fn read<'a>(
    backend: &dyn Backend,
    mut txn: Option<&mut Transaction>,
    places: &PlacesArg,
    options: Options,
    arena: &'a mut Arena,
) -> Result<ReadView<'a>> {
    validate::validate_read(places, options)?;
    maybe_reset(arena, options);

    let n = places.len();
    let watch = !options.contains(Options::TXN_DONT_WATCH);
    let mut values: Vec<Option<Vec<u8>>> = Vec::with_capacity(n);
    for i in 0..n {
        let place = places.get(i);
        let value = match txn.as_mut() {
            Some(txn) => txn.get(place.collection, place.key, watch)?,
            None => backend.get(place.collection, place.key)?,
        };
        values.push(value);
    }

    let lens_off = arena.reserve_aligned(4 * n, 4)?;
    let bytes_off = arena.len();
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(value) => {
                arena.put_u32(lens_off + 4 * i, value.len() as u32);
                arena.push_bytes(value)?;
            }
            None => arena.put_u32(lens_off + 4 * i, VAL_LEN_MISSING),
        }
    }

    let arena: &'a Arena = arena;
    Ok(ReadView {
        lengths: arena.u32s(lens_off, n),
        bytes: arena.slice(bytes_off, arena.len() - bytes_off),
    })
}

/// Merge a backend key run with a transaction's staged overlay, ascending,
/// bounded by `limit`.
fn merge_overlay(base: Vec<Key>, staged: Vec<(Key, bool)>, limit: u32) -> Vec<Key> {
    let mut out = Vec::with_capacity(limit as usize);
    let mut b = base.into_iter().peekable();
    let mut s = staged.into_iter().peekable();
    while out.len() < limit as usize {
        match (b.peek().copied(), s.peek().copied()) {
            (Some(bk), Some((sk, tomb))) => {
                if sk < bk {
                    s.next();
                    if !tomb {
                        out.push(sk);
                    }
                } else if sk == bk {
                    b.next();
                    s.next();
                    if !tomb {
                        out.push(sk);
                    }
                } else {
                    b.next();
                    out.push(bk);
                }
            }
            (Some(bk), None) => {
                b.next();
                out.push(bk);
            }
            (None, Some((sk, tomb))) => {
                s.next();
                if !tomb {
                    out.push(sk);
                }
            }
            (None, None) => break,
        }
    }
    out
}

pub(crate) fn scan<'a>(
    backend: &dyn Backend,
    mut txn: Option<&mut Transaction>,
    scans: &ScansArg,
    options: Options,
    arena: &'a mut Arena,
) -> Result<KeysView<'a>> {
    validate::validate_scan(scans, options)?;
    maybe_reset(arena, options);

    let n = scans.len();
    let watch = !options.contains(Options::TXN_DONT_WATCH);
    let mut per_scan: Vec<Vec<Key>> = Vec::with_capacity(n);
    for i in 0..n {
        let spec = scans.get(i);
        let keys = match txn.as_mut() {
            Some(txn) => {
                let staged = txn.staged_range(spec.collection, spec.min_key);
                // Staged tombstones may swallow backend keys; over-fetch by
                // the overlay size so the merged run can still fill `limit`.
                let fetch = spec.limit.saturating_add(staged.len() as u32);
                let base = backend.range(spec.collection, spec.min_key, fetch)?;
                let merged = merge_overlay(base, staged, spec.limit);
                if watch {
                    for key in &merged {
                        txn.watch(spec.collection, *key);
                    }
                }
                merged
            }
            None => backend.range(spec.collection, spec.min_key, spec.limit)?,
        };
        per_scan.push(keys);
    }

    pack_keys(per_scan, arena)
}

pub(crate) fn sample<'a>(
    backend: &dyn Backend,
    samples: &SamplesArg,
    options: Options,
    seed: Option<u64>,
    arena: &'a mut Arena,
) -> Result<KeysView<'a>> {
    validate::validate_sample(samples, options)?;
    maybe_reset(arena, options);

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::seed_from_u64(rand::random()),
    };

    let n = samples.len();
    let mut per_sample: Vec<Vec<Key>> = Vec::with_capacity(n);
    for i in 0..n {
        let spec = samples.get(i);
        // Uniform within a bounded scan window, not the whole key space.
        let window = spec.limit.saturating_mul(16).max(1024);
        let candidates = backend.range(spec.collection, Key::MIN, window)?;
        let mut picked: Vec<Key> = candidates
            .choose_multiple(&mut rng, spec.limit as usize)
            .copied()
            .collect();
        picked.sort_unstable();
        per_sample.push(picked);
    }

    pack_keys(per_sample, arena)
}

fn pack_keys<'a>(per_request: Vec<Vec<Key>>, arena: &'a mut Arena) -> Result<KeysView<'a>> {
    let n = per_request.len();
    let total: usize = per_request.iter().map(Vec::len).sum();
    let counts_off = arena.reserve_aligned(4 * n, 4)?;
    let keys_off = arena.reserve_aligned(8 * total, 8)?;
    let mut cursor = keys_off;
    for (i, keys) in per_request.iter().enumerate() {
        arena.put_u32(counts_off + 4 * i, keys.len() as u32);
        for key in keys {
            arena.put_key(cursor, *key);
            cursor += 8;
        }
    }
    let arena: &'a Arena = arena;
    Ok(KeysView {
        counts: arena.u32s(counts_off, n),
        keys: arena.keys(keys_off, total),
    })
}

pub(crate) fn measure(backend: &dyn Backend, collections: &[Collection]) -> Result<Vec<CollectionStats>> {
    collections.iter().map(|c| backend.measure(*c)).collect()
}

//! Multi-threaded commit histories replayed against a reference map: the
//! store's final contents must equal a serial execution in sequence order.

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ustore::{
    Arena, Key, Options, Result, ScansArg, SeqNo, Store, StoreError, Strided, COLLECTION_MAIN,
};

const NUM_THREADS: usize = 4;
const TXNS_PER_THREAD: usize = 60;
const OPS_PER_TXN: usize = 4;
const KEY_SPACE: Key = 48;

#[derive(Debug, Clone, Copy)]
enum Op {
    Insert(Key, u64),
    Remove(Key),
}

fn all_keys(store: &Store) -> Result<Vec<Key>> {
    let mut keys = Vec::new();
    let mut cursor = Key::MIN;
    let mut arena = Arena::new();
    loop {
        let min_keys = [cursor];
        let limits = [128u32];
        let scans = ScansArg {
            collections: Strided::broadcast(&COLLECTION_MAIN, 1),
            min_keys: Strided::from_slice(&min_keys),
            limits: Strided::from_slice(&limits),
            count: 1,
        };
        let view = store.scan(None, &scans, Options::NONE, &mut arena)?;
        let page = view.get(0);
        let exhausted = page.len() < 128;
        keys.extend_from_slice(page);
        match page.last() {
            Some(last) if !exhausted => cursor = *last + 1,
            _ => break,
        }
    }
    Ok(keys)
}

#[test]
fn committed_histories_replay_into_identical_contents() -> Result<()> {
    let store = Arc::new(Store::open("")?);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let mut handles = Vec::new();
    for thread_id in 0..NUM_THREADS {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<Vec<(SeqNo, Vec<Op>)>> {
            let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE ^ thread_id as u64);
            let mut committed = Vec::new();
            let mut txn = store.txn_begin(Options::NONE)?;
            barrier.wait();

            for _ in 0..TXNS_PER_THREAD {
                txn.reset()?;
                let mut ops = Vec::with_capacity(OPS_PER_TXN);
                for _ in 0..OPS_PER_TXN {
                    let key = rng.gen_range(1..=KEY_SPACE);
                    // Reads watch keys, so racing commits genuinely lose.
                    if rng.gen_bool(0.5) {
                        store.read_one(Some(&mut txn), COLLECTION_MAIN, key)?;
                    }
                    if rng.gen_bool(0.7) {
                        let value: u64 = rng.gen();
                        store.write_one(
                            Some(&mut txn),
                            COLLECTION_MAIN,
                            key,
                            Some(&value.to_le_bytes()),
                        )?;
                        ops.push(Op::Insert(key, value));
                    } else {
                        store.write_one(Some(&mut txn), COLLECTION_MAIN, key, None)?;
                        ops.push(Op::Remove(key));
                    }
                }
                match txn.commit(Options::NONE) {
                    Ok(seq) => committed.push((seq, ops)),
                    Err(StoreError::Conflict) => {}
                    Err(other) => return Err(other),
                }
            }
            Ok(committed)
        }));
    }

    let mut history: Vec<(SeqNo, Vec<Op>)> = Vec::new();
    for handle in handles {
        history.extend(handle.join().unwrap()?);
    }
    assert!(!history.is_empty(), "every transaction conflicted");

    // Committed sequences are unique and totally ordered; program order
    // inside each transaction is preserved by the per-txn op list.
    history.sort_by_key(|(seq, _)| *seq);
    for pair in history.windows(2) {
        assert!(pair[0].0 < pair[1].0, "duplicate commit sequence");
    }

    let mut reference: HashMap<Key, u64> = HashMap::new();
    for (_, ops) in &history {
        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    reference.insert(*key, *value);
                }
                Op::Remove(key) => {
                    reference.remove(key);
                }
            }
        }
    }

    let keys = all_keys(&store)?;
    let mut expected: Vec<Key> = reference.keys().copied().collect();
    expected.sort_unstable();
    assert_eq!(keys, expected, "live key sets diverged");

    for key in keys {
        let stored = store.read_one(None, COLLECTION_MAIN, key)?.expect("scanned key missing");
        let expected = reference[&key].to_le_bytes().to_vec();
        assert_eq!(stored, expected, "value diverged for key {key}");
    }
    Ok(())
}

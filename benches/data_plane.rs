use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ustore::{Arena, ContentsArg, Key, Options, PlacesArg, Store, Strided, COLLECTION_MAIN};

const BATCH: usize = 256;
const KEY_SPACE: Key = 65_536;

struct Harness {
    store: Store,
    keys: Vec<Key>,
    values: Vec<Vec<u8>>,
    arena: Arena,
}

impl Harness {
    fn new() -> Self {
        let store = Store::open("").expect("store");
        let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
        let keys: Vec<Key> = (0..BATCH).map(|_| rng.gen_range(0..KEY_SPACE)).collect();
        let values: Vec<Vec<u8>> = keys.iter().map(|_| vec![0xAB; 64]).collect();
        let harness = Self { store, keys, values, arena: Arena::new() };
        harness.write_batch();
        harness
    }

    fn write_batch(&self) {
        let ptrs: Vec<*const u8> = self.values.iter().map(|v| v.as_ptr()).collect();
        let lens: Vec<u32> = self.values.iter().map(|v| v.len() as u32).collect();
        let places = PlacesArg::from_keys(&COLLECTION_MAIN, &self.keys);
        let contents = ContentsArg::from_parts(&ptrs, &lens);
        self.store
            .write(None, &places, &contents, Options::NONE)
            .expect("write batch");
    }

    fn read_batch(&mut self) -> usize {
        let places = PlacesArg::from_keys(&COLLECTION_MAIN, &self.keys);
        let view = self
            .store
            .read(None, &places, Options::NONE, &mut self.arena)
            .expect("read batch");
        view.bytes.len()
    }

    fn scan_page(&mut self) -> usize {
        let min_keys = [Key::MIN];
        let limits = [BATCH as u32];
        let scans = ustore::ScansArg {
            collections: Strided::broadcast(&COLLECTION_MAIN, 1),
            min_keys: Strided::from_slice(&min_keys),
            limits: Strided::from_slice(&limits),
            count: 1,
        };
        let view = self
            .store
            .scan(None, &scans, Options::NONE, &mut self.arena)
            .expect("scan page");
        view.keys.len()
    }
}

fn data_plane(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_plane");
    group.sample_size(40);
    let mut harness = Harness::new();

    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("write_batch", |b| {
        b.iter(|| black_box(harness.write_batch()));
    });

    group.bench_function("read_batch", |b| {
        b.iter(|| black_box(harness.read_batch()));
    });

    group.bench_function("scan_page", |b| {
        b.iter(|| black_box(harness.scan_page()));
    });

    group.finish();
}

criterion_group!(benches, data_plane);
criterion_main!(benches);

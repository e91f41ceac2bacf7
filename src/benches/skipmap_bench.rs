use std::sync::Arc;

use bencher::{benchmark_group, benchmark_main, Bencher};

use stonetable::cmp::BoxedCmp;
use stonetable::key_types::LookupKey;
use stonetable::{DefaultCmp, MemTable, SkipMap, ValueType};

fn standard_cmp() -> BoxedCmp {
    Arc::new(Box::new(DefaultCmp))
}

fn bench_skipmap_insert(b: &mut Bencher) {
    let map = SkipMap::new(standard_cmp());
    let mut i = 0u64;
    b.iter(|| {
        map.insert(i.to_be_bytes().to_vec());
        i += 1;
    });
}

fn bench_skipmap_contains(b: &mut Bencher) {
    let map = SkipMap::new(standard_cmp());
    for i in 0u64..10_000 {
        map.insert(i.to_be_bytes().to_vec());
    }
    let mut i = 0u64;
    b.iter(|| {
        bencher::black_box(map.contains(&(i % 10_000).to_be_bytes()));
        i += 1;
    });
}

fn bench_memtable_get(b: &mut Bencher) {
    let mut mt = MemTable::new(standard_cmp());
    for i in 0u64..10_000 {
        mt.add(i + 1, ValueType::TypeValue, &i.to_be_bytes(), b"value");
    }
    let mut i = 0u64;
    b.iter(|| {
        let key = LookupKey::new(&(i % 10_000).to_be_bytes(), 20_000);
        bencher::black_box(mt.get(&key).unwrap());
        i += 1;
    });
}

benchmark_group!(
    benches,
    bench_skipmap_insert,
    bench_skipmap_contains,
    bench_memtable_get
);
benchmark_main!(benches);

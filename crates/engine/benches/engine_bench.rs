use criterion::{criterion_group, criterion_main, Criterion};
use rand::RngCore;

use engine::{Engine, IndexType, Options};

fn bench_options(dir: &std::path::Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        data_file_size: 64 * 1024 * 1024,
        sync_writes: false,
        bytes_per_sync: 0,
        index_type: IndexType::BTree,
        mmap_at_startup: false,
        data_file_merge_ratio: 0.5,
    }
}

fn bench_put(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(bench_options(dir.path())).unwrap();

    let mut rng = rand::thread_rng();
    let mut value = vec![0u8; 256];
    rng.fill_bytes(&mut value);

    let mut i = 0u64;
    c.bench_function("put-256b", |b| {
        b.iter(|| {
            engine.put(&i.to_be_bytes(), &value).unwrap();
            i += 1;
        })
    });
}

fn bench_get(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(bench_options(dir.path())).unwrap();

    let mut rng = rand::thread_rng();
    let mut value = vec![0u8; 256];
    rng.fill_bytes(&mut value);
    for i in 0u64..10_000 {
        engine.put(&i.to_be_bytes(), &value).unwrap();
    }

    let mut i = 0u64;
    c.bench_function("get-256b", |b| {
        b.iter(|| {
            let key = (i % 10_000).to_be_bytes();
            engine.get(&key).unwrap();
            i += 1;
        })
    });
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);

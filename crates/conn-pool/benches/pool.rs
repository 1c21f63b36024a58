//! Benchmarks for pool checkout and check-in.

#![allow(missing_docs, clippy::unwrap_used)]

use std::hint::black_box;
use std::thread;

use connpool::Pool;
use criterion::{Criterion, criterion_group, criterion_main};

fn factory() -> Result<Vec<u8>, std::io::Error> {
    Ok(vec![0; 64])
}

fn bench_uncontended(c: &mut Criterion) {
    let pool = Pool::new(8, factory).unwrap();

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let conn = pool.acquire().unwrap();
            black_box(conn.len());
            pool.release(conn).unwrap();
        });
    });

    c.bench_function("try_acquire_drop", |b| {
        b.iter(|| {
            let conn = pool.try_acquire().unwrap();
            black_box(conn.is_some());
        });
    });
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");
    for threads in [2_usize, 4, 8] {
        let pool = Pool::new(2, factory).unwrap();
        group.bench_function(format!("{threads}_threads_2_connections"), |b| {
            b.iter(|| {
                thread::scope(|scope| {
                    for _ in 0..threads {
                        scope.spawn(|| {
                            for _ in 0..64 {
                                let conn = pool.acquire().unwrap();
                                black_box(conn.len());
                            }
                        });
                    }
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);

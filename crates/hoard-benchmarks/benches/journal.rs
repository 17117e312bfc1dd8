//! Journal performance benchmarks
//!
//! Measures committing transactions of chunk locations and replaying large
//! journals, which bounds cache startup time.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hoard_benchmarks::{create_test_chunks, criterion_config};
use hoard_cache::journal::Journal;
use hoard_cache::{BlockId, CasLocation};
use camino::Utf8PathBuf;
use tempfile::tempdir;

fn fill_journal(journal: &Journal, entries: usize) {
    let mut transaction = journal.begin();
    transaction.block_created(BlockId::new(1));
    for (i, (_, hash)) in create_test_chunks(entries, 8).iter().enumerate() {
        transaction.chunk_location(CasLocation::new(BlockId::new(1), i as u32 * 8), hash.cas_addr());
    }
    journal.commit(transaction).unwrap();
}

/// Benchmark committing transactions of different sizes
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_commit");

    for entries in [1, 64, 4096].iter() {
        group.throughput(Throughput::Elements(*entries as u64));

        let temp_dir = tempdir().unwrap();
        let journal = Journal::new(Utf8PathBuf::from_path_buf(temp_dir.path().join("cas.jrn")).unwrap());
        journal.create().unwrap();

        group.bench_with_input(BenchmarkId::new("entries", entries), entries, |b, &entries| {
            b.iter(|| fill_journal(&journal, entries));
        });
    }

    group.finish();
}

/// Benchmark replaying journals of different lengths
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_replay");
    group.measurement_time(std::time::Duration::from_secs(10));

    for entries in [1_000, 100_000, 1_000_000].iter() {
        group.throughput(Throughput::Elements(*entries as u64));

        let temp_dir = tempdir().unwrap();
        let journal = Journal::new(Utf8PathBuf::from_path_buf(temp_dir.path().join("cas.jrn")).unwrap());
        journal.create().unwrap();
        fill_journal(&journal, *entries);

        group.bench_with_input(BenchmarkId::new("entries", entries), &journal, |b, journal| {
            b.iter(|| {
                let mut applied = 0usize;
                journal.replay(|_| applied += 1).unwrap();
                black_box(applied)
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_commit, bench_replay
}
criterion_main!(benches);

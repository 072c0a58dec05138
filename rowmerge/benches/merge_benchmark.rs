use criterion::{criterion_group, criterion_main, Criterion};
use rowmerge::codec;
use rowmerge::storage::{RowStore, StoreConfig};
use rowmerge::{
    merge, MergeConfig, MergeMode, MergeOperator, RowValue, RowValueMergeOperator,
};
use std::hint::black_box;

const NOW: u32 = 1_700_000_000;

/// A row with `columns` 32-byte values and a tombstone every tenth column.
fn wide_row(columns: usize, timestamp: i64) -> RowValue {
    let mut builder = RowValue::builder();
    for i in 0..columns {
        let name = format!("column_{i:05}");
        if i % 10 == 0 {
            builder = builder.tombstone(name, timestamp, NOW);
        } else {
            builder = builder.value(name, timestamp, vec![i as u8; 32]);
        }
    }
    builder.build()
}

/// `count` overlapping fragments of a 100-column row, as writers would
/// append them.
fn fragments(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|f| {
            let mut builder = RowValue::builder();
            for i in (f % 4..100).step_by(4) {
                builder = builder.value(format!("column_{i:05}"), f as i64, vec![f as u8; 32]);
            }
            codec::encode_to_vec(&builder.build()).unwrap()
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let row = wide_row(100, 1);

    c.bench_function("encode_100_columns", |b| {
        let mut out = Vec::with_capacity(row.size());
        b.iter(|| {
            out.clear();
            codec::encode(black_box(&row), &mut out).unwrap();
            black_box(out.len());
        })
    });
}

fn bench_decode(c: &mut Criterion) {
    let encoded = codec::encode_to_vec(&wide_row(100, 1)).unwrap();

    c.bench_function("decode_100_columns", |b| {
        b.iter(|| {
            black_box(codec::decode(black_box(encoded.as_slice())).unwrap());
        })
    });
}

fn bench_merge_rows(c: &mut Criterion) {
    let rows: Vec<RowValue> = (0..8).map(|f| wide_row(100, f)).collect();

    c.bench_function("merge_8x100_full", |b| {
        b.iter(|| {
            black_box(merge(black_box(rows.clone()), MergeMode::Full));
        })
    });
}

fn bench_full_merge(c: &mut Criterion) {
    let op = RowValueMergeOperator::new(MergeConfig::default());
    let base = codec::encode_to_vec(&wide_row(100, 0)).unwrap();
    let operands = fragments(16);
    let operands: Vec<&[u8]> = operands.iter().map(Vec::as_slice).collect();

    c.bench_function("full_merge_16_operands", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            op.full_merge(Some(black_box(base.as_slice())), black_box(operands.as_slice()), &mut out)
                .unwrap();
        })
    });
}

fn bench_partial_merge(c: &mut Criterion) {
    let op = RowValueMergeOperator::new(MergeConfig::default());
    let operands = fragments(16);
    let operands: Vec<&[u8]> = operands.iter().map(Vec::as_slice).collect();

    c.bench_function("partial_merge_16_operands", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            op.partial_merge(black_box(operands.as_slice()), &mut out).unwrap();
        })
    });
}

fn bench_store_write_columns(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RowStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
    let payload = vec![42u8; 64];

    c.bench_function("store_write_columns_64B", |b| {
        let mut timestamp = 0i64;
        b.iter(|| {
            store
                .write_columns(b"bench", black_box(timestamp), [("c", payload.as_slice())])
                .unwrap();
            timestamp += 1;
        })
    });
}

fn bench_store_get_row(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RowStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();

    // 1000 pending fragments over a flushed base
    store.put_row(b"bench", &wide_row(100, 0)).unwrap();
    store.flush().unwrap();
    for ts in 1..=1000i64 {
        let name = format!("column_{:05}", ts % 100);
        store
            .write_columns(b"bench", ts, [(name, vec![ts as u8; 32])])
            .unwrap();
    }

    c.bench_function("store_get_row_1000_fragments", |b| {
        b.iter(|| {
            black_box(store.get_row(black_box(&b"bench"[..])).unwrap());
        })
    });
}

criterion_group!(
    codec_benches,
    bench_encode,
    bench_decode,
);

criterion_group!(
    merge_benches,
    bench_merge_rows,
    bench_full_merge,
    bench_partial_merge,
);

criterion_group!(
    store_benches,
    bench_store_write_columns,
    bench_store_get_row,
);

criterion_main!(codec_benches, merge_benches, store_benches);

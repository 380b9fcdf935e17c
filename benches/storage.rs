//! Snapshot store benchmark: persist a cycle and query a time series.

use chrono::{Duration, Utc};
use conntrack_monitor::aggregate::{all_groupings, Dimension};
use conntrack_monitor::parser::parse_command_output;
use conntrack_monitor::storage::SnapshotStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

fn make_table(n: usize) -> String {
    (0..n)
        .map(|i| {
            format!(
                "ipv4 2 tcp 6 300 ESTABLISHED src=10.0.0.{} dst=192.168.0.{} sport={} dport=443 bytes={} src=192.168.0.{} dst=10.0.0.{} sport=443 dport={} bytes={} [ASSURED] mark=0 use=1\n",
                i % 250,
                i % 10,
                30000 + i,
                i * 3,
                i % 10,
                i % 250,
                30000 + i,
                i
            )
        })
        .collect()
}

fn bench_save_snapshot(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::open(&dir.path().join("bench.db")).unwrap();
    let records = parse_command_output(&make_table(500));
    let groupings = all_groupings(&records);

    c.bench_function("storage_save_snapshot_500", |b| {
        b.iter(|| black_box(store.save_snapshot(&records, Some(&groupings))).unwrap())
    });
}

fn bench_time_series(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::open(&dir.path().join("bench.db")).unwrap();
    let records = parse_command_output(&make_table(200));
    let groupings = all_groupings(&records);
    let start = Utc::now() - Duration::hours(2);
    for i in 0..120 {
        store
            .save_snapshot_at(start + Duration::minutes(i), &records, Some(&groupings))
            .unwrap();
    }
    let end = Utc::now();

    c.bench_function("storage_time_series_dst_ip", |b| {
        b.iter(|| {
            black_box(store.time_series(Dimension::DstIp, Some("192.168.0.1"), start, end, 5)).unwrap()
        })
    });
    c.bench_function("storage_latest_snapshot", |b| {
        b.iter(|| black_box(store.latest_metrics_snapshot()).unwrap())
    });
}

criterion_group!(benches, bench_save_snapshot, bench_time_series);
criterion_main!(benches);

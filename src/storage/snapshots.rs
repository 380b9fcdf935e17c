//! SQLite-backed time-series store: raw connection rows plus pre-aggregated metric rows,
//! both stamped with the collection cycle's timestamp (UTC, milliseconds).

use crate::aggregate::{AggregateBucket, Dimension, Groupings};
use crate::error::{StoreError, StoreResult};
use crate::parser::ConnectionRecord;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS connection_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        protocol TEXT,
        state TEXT,
        src TEXT,
        dst TEXT,
        sport TEXT,
        dport TEXT,
        flags TEXT,
        mark TEXT,
        use_count TEXT,
        bytes_sent INTEGER NOT NULL DEFAULT 0,
        bytes_recv INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_conn_timestamp ON connection_snapshots(ts);
    CREATE TABLE IF NOT EXISTS metric_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        metric_type TEXT NOT NULL,
        metric_key TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 0,
        bytes_sent INTEGER NOT NULL DEFAULT 0,
        bytes_recv INTEGER NOT NULL DEFAULT 0,
        total_bytes INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_metric_timestamp ON metric_snapshots(ts);
    CREATE INDEX IF NOT EXISTS idx_metric_type_key ON metric_snapshots(metric_type, metric_key);
"#;

const INSERT_CONNECTION: &str = "INSERT INTO connection_snapshots \
    (ts, protocol, state, src, dst, sport, dport, flags, mark, use_count, bytes_sent, bytes_recv) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const INSERT_METRIC: &str = "INSERT INTO metric_snapshots \
    (ts, metric_type, metric_key, count, bytes_sent, bytes_recv, total_bytes) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Above this many rows per cycle, progress is logged.
const PROGRESS_THRESHOLD: usize = 50_000;
const LARGE_CYCLE: usize = 100_000;

fn batch_size(total: usize) -> usize {
    if total > LARGE_CYCLE {
        500
    } else {
        1000
    }
}

fn to_sql_int(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn from_sql_int(v: i64) -> u64 {
    v.max(0) as u64
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Start of the bucket containing `ts_ms`: the minute within the hour truncated to a
/// multiple of the interval. Intervals of an hour or more give hourly buckets.
pub fn bucket_start(ts_ms: i64, interval_minutes: u32) -> i64 {
    let interval = i64::from(interval_minutes.max(1));
    let hour = ts_ms.div_euclid(HOUR_MS) * HOUR_MS;
    let minute = (ts_ms - hour) / MINUTE_MS;
    hour + (minute / interval) * interval * MINUTE_MS
}

/// One persisted aggregate bucket at one observation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metric_type: Dimension,
    pub metric_key: String,
    pub count: u64,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub total_bytes: u64,
}

/// Summed metric rows falling into one interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBucket {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

/// Every metric sharing the most recent (or a given) timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: Groupings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub timestamp: DateTime<Utc>,
    pub connections: usize,
    pub metrics: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub connections: u64,
    pub metrics: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub connections: u64,
    pub metrics: u64,
}

pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open or create DB at path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        // journal_mode answers with a row, so it cannot go through execute_batch
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Persist one collection cycle stamped with the current time.
    pub fn save_snapshot(
        &self,
        records: &[ConnectionRecord],
        metrics: Option<&Groupings>,
    ) -> StoreResult<SaveReport> {
        self.save_snapshot_at(Utc::now(), records, metrics)
    }

    /// Persist one cycle in a single transaction; any failure rolls back every row.
    pub fn save_snapshot_at(
        &self,
        timestamp: DateTime<Utc>,
        records: &[ConnectionRecord],
        metrics: Option<&Groupings>,
    ) -> StoreResult<SaveReport> {
        let ts = timestamp.timestamp_millis();
        let total = records.len();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(INSERT_CONNECTION)?;
            let mut saved = 0usize;
            for chunk in records.chunks(batch_size(total)) {
                for r in chunk {
                    stmt.execute(params![
                        ts,
                        r.protocol,
                        r.state,
                        r.src,
                        r.dst,
                        r.sport,
                        r.dport,
                        r.flags,
                        r.mark,
                        r.use_count,
                        to_sql_int(r.bytes_sent),
                        to_sql_int(r.bytes_recv),
                    ])?;
                }
                saved += chunk.len();
                if total > PROGRESS_THRESHOLD {
                    debug!(saved, total, "snapshot progress");
                }
            }
        }

        let mut metric_rows = 0usize;
        if let Some(groupings) = metrics {
            let mut stmt = tx.prepare_cached(INSERT_METRIC)?;
            for (dim, buckets) in groupings {
                for (key, b) in buckets {
                    stmt.execute(params![
                        ts,
                        dim.as_str(),
                        key,
                        to_sql_int(b.count),
                        to_sql_int(b.bytes_sent),
                        to_sql_int(b.bytes_recv),
                        to_sql_int(b.bytes_sent.saturating_add(b.bytes_recv)),
                    ])?;
                    metric_rows += 1;
                }
            }
        }

        tx.commit()?;
        Ok(SaveReport {
            timestamp: from_millis(ts),
            connections: total,
            metrics: metric_rows,
        })
    }

    /// Raw metric rows for one dimension (optionally one key), oldest first.
    pub fn metric_rows(
        &self,
        metric_type: Dimension,
        metric_key: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricSnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ts, metric_key, count, bytes_sent, bytes_recv, total_bytes FROM metric_snapshots \
             WHERE metric_type = ?1 AND (?2 IS NULL OR metric_key = ?2) AND ts >= ?3 AND ts <= ?4 \
             ORDER BY ts",
        )?;
        let rows = stmt.query_map(
            params![
                metric_type.as_str(),
                metric_key,
                start.timestamp_millis(),
                end.timestamp_millis()
            ],
            |row| {
                Ok(MetricSnapshot {
                    timestamp: from_millis(row.get(0)?),
                    metric_type,
                    metric_key: row.get(1)?,
                    count: from_sql_int(row.get(2)?),
                    bytes_sent: from_sql_int(row.get(3)?),
                    bytes_recv: from_sql_int(row.get(4)?),
                    total_bytes: from_sql_int(row.get(5)?),
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Metric rows summed per interval, ascending. Omit `metric_key` to sum every key.
    pub fn time_series(
        &self,
        metric_type: Dimension,
        metric_key: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: u32,
    ) -> StoreResult<Vec<TimeBucket>> {
        let mut buckets: BTreeMap<i64, TimeBucket> = BTreeMap::new();
        for row in self.metric_rows(metric_type, metric_key, start, end)? {
            let at = bucket_start(row.timestamp.timestamp_millis(), interval_minutes);
            let b = buckets.entry(at).or_insert_with(|| TimeBucket {
                timestamp: from_millis(at),
                count: 0,
                bytes_sent: 0,
                bytes_recv: 0,
                total_bytes: 0,
            });
            b.count += row.count;
            b.bytes_sent = b.bytes_sent.saturating_add(row.bytes_sent);
            b.bytes_recv = b.bytes_recv.saturating_add(row.bytes_recv);
            b.total_bytes = b.total_bytes.saturating_add(row.total_bytes);
        }
        Ok(buckets.into_values().collect())
    }

    /// Connection rows per cycle, summed per interval, ascending.
    pub fn connection_count_time_series(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_minutes: u32,
    ) -> StoreResult<Vec<CountBucket>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ts, COUNT(*) FROM connection_snapshots WHERE ts >= ?1 AND ts <= ?2 \
             GROUP BY ts ORDER BY ts",
        )?;
        let rows = stmt.query_map(
            params![start.timestamp_millis(), end.timestamp_millis()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
        for row in rows {
            let (ts, count) = row?;
            *buckets.entry(bucket_start(ts, interval_minutes)).or_insert(0) += from_sql_int(count);
        }
        Ok(buckets
            .into_iter()
            .map(|(at, count)| CountBucket {
                timestamp: from_millis(at),
                count,
            })
            .collect())
    }

    /// Every metric stored at exactly `timestamp`, grouped by dimension then key.
    pub fn metrics_at(&self, timestamp: DateTime<Utc>) -> StoreResult<Groupings> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT metric_type, metric_key, count, bytes_sent, bytes_recv, total_bytes \
             FROM metric_snapshots WHERE ts = ?1",
        )?;
        let rows = stmt.query_map(params![timestamp.timestamp_millis()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                AggregateBucket {
                    key: row.get(1)?,
                    count: from_sql_int(row.get(2)?),
                    bytes_sent: from_sql_int(row.get(3)?),
                    bytes_recv: from_sql_int(row.get(4)?),
                    total_bytes: from_sql_int(row.get(5)?),
                },
            ))
        })?;

        let mut out = Groupings::new();
        for row in rows {
            let (metric_type, bucket) = row?;
            let Ok(dim) = metric_type.parse::<Dimension>() else {
                continue;
            };
            out.entry(dim).or_default().insert(bucket.key.clone(), bucket);
        }
        Ok(out)
    }

    fn latest_metric_ts(&self) -> StoreResult<Option<i64>> {
        let conn = self.lock()?;
        let ts = conn
            .query_row("SELECT MAX(ts) FROM metric_snapshots", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?;
        Ok(ts.flatten())
    }

    /// All metrics of the most recent cycle; `None` when nothing has been stored.
    pub fn latest_metrics_snapshot(&self) -> StoreResult<Option<MetricsSnapshot>> {
        let Some(ts) = self.latest_metric_ts()? else {
            return Ok(None);
        };
        let timestamp = from_millis(ts);
        Ok(Some(MetricsSnapshot {
            timestamp,
            metrics: self.metrics_at(timestamp)?,
        }))
    }

    /// One dimension's buckets from the most recent cycle.
    pub fn latest_grouping(&self, dim: Dimension) -> StoreResult<BTreeMap<String, AggregateBucket>> {
        Ok(self
            .latest_metrics_snapshot()?
            .and_then(|mut s| s.metrics.remove(&dim))
            .unwrap_or_default())
    }

    /// Connection rows stored for one cycle.
    pub fn connections_at(&self, timestamp: DateTime<Utc>) -> StoreResult<Vec<ConnectionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT protocol, state, src, dst, sport, dport, flags, mark, use_count, bytes_sent, bytes_recv \
             FROM connection_snapshots WHERE ts = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![timestamp.timestamp_millis()], |row| {
            let flags: Option<String> = row.get(6)?;
            let bytes_sent = from_sql_int(row.get(9)?);
            let bytes_recv = from_sql_int(row.get(10)?);
            Ok(ConnectionRecord {
                protocol: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                state: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                src: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                dst: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                sport: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                dport: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                assured: flags.as_deref().is_some_and(|f| f.contains("ASSURED")),
                unreplied: flags.as_deref().is_some_and(|f| f.contains("UNREPLIED")),
                flags,
                mark: row.get(7)?,
                use_count: row.get(8)?,
                bytes_sent,
                bytes_recv,
                total_bytes: bytes_sent.saturating_add(bytes_recv),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn row_counts(&self) -> StoreResult<RowCounts> {
        let conn = self.lock()?;
        let connections: i64 =
            conn.query_row("SELECT COUNT(*) FROM connection_snapshots", [], |r| r.get(0))?;
        let metrics: i64 = conn.query_row("SELECT COUNT(*) FROM metric_snapshots", [], |r| r.get(0))?;
        Ok(RowCounts {
            connections: from_sql_int(connections),
            metrics: from_sql_int(metrics),
        })
    }

    /// Retention: delete rows of both tables older than `cutoff`. Irreversible.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> StoreResult<PruneReport> {
        let ts = cutoff.timestamp_millis();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let connections = tx.execute("DELETE FROM connection_snapshots WHERE ts < ?1", params![ts])?;
        let metrics = tx.execute("DELETE FROM metric_snapshots WHERE ts < ?1", params![ts])?;
        tx.commit()?;
        let report = PruneReport {
            connections: connections as u64,
            metrics: metrics as u64,
        };
        if report.connections + report.metrics > 0 {
            info!(connections = report.connections, metrics = report.metrics, "pruned snapshots");
        }
        Ok(report)
    }

    pub fn prune_older_than(&self, retention_days: u32) -> StoreResult<PruneReport> {
        self.prune_before(Utc::now() - Duration::days(i64::from(retention_days)))
    }
}

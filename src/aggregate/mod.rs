//! Aggregation engine: pure O(n)/O(n log n) functions over a record batch.

mod summary;

pub use summary::{all_groupings, summarize, ConnectionSummary, Groupings};

use crate::parser::{parse_port, ConnectionRecord, UNKNOWN};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_TOP_N: usize = 20;

/// Grouping key shared by live aggregation and persisted metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Protocol,
    State,
    SrcIp,
    DstIp,
    Sport,
    Dport,
    /// Synthetic `sport:dport` pair
    Port,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Protocol,
        Dimension::State,
        Dimension::SrcIp,
        Dimension::DstIp,
        Dimension::Sport,
        Dimension::Dport,
        Dimension::Port,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Protocol => "protocol",
            Dimension::State => "state",
            Dimension::SrcIp => "src_ip",
            Dimension::DstIp => "dst_ip",
            Dimension::Sport => "sport",
            Dimension::Dport => "dport",
            Dimension::Port => "port",
        }
    }

    /// The record's value along this dimension. Protocol and state are upper-cased.
    pub fn key_of(self, r: &ConnectionRecord) -> String {
        match self {
            Dimension::Protocol => r.protocol.to_uppercase(),
            Dimension::State => r.state.to_uppercase(),
            Dimension::SrcIp => r.src.clone(),
            Dimension::DstIp => r.dst.clone(),
            Dimension::Sport => r.sport.clone(),
            Dimension::Dport => r.dport.clone(),
            Dimension::Port => format!("{}:{}", r.sport, r.dport),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown dimension: {0}")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| UnknownDimension(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Source,
    Destination,
}

impl PortKind {
    fn port_of(self, r: &ConnectionRecord) -> &str {
        match self {
            PortKind::Source => &r.sport,
            PortKind::Destination => &r.dport,
        }
    }
}

/// Statistics for one grouping key within one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub key: String,
    pub count: u64,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub total_bytes: u64,
}

impl AggregateBucket {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    fn add(&mut self, r: &ConnectionRecord) {
        self.count += 1;
        self.bytes_sent = self.bytes_sent.saturating_add(r.bytes_sent);
        self.bytes_recv = self.bytes_recv.saturating_add(r.bytes_recv);
        self.total_bytes = self.bytes_sent.saturating_add(self.bytes_recv);
    }
}

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
}

/// Counts that remember first-appearance order.
#[derive(Default)]
struct Tally {
    index: HashMap<String, usize>,
    entries: Vec<RankedEntry>,
}

impl Tally {
    fn add(&mut self, key: String) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push(RankedEntry { key, count: 1 });
            }
        }
    }
}

pub fn count_by(records: &[ConnectionRecord], dim: Dimension) -> BTreeMap<String, u64> {
    let mut out = BTreeMap::new();
    for r in records {
        *out.entry(dim.key_of(r)).or_insert(0) += 1;
    }
    out
}

/// Most frequent values first; equal counts keep first-appearance order.
pub fn top_n_by(records: &[ConnectionRecord], dim: Dimension, n: usize) -> Vec<RankedEntry> {
    let mut tally = Tally::default();
    for r in records {
        tally.add(dim.key_of(r));
    }
    let mut entries = tally.entries;
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries.truncate(n);
    entries
}

/// Ports ranked by numeric port value, highest first (not by count).
/// Non-numeric and absent ports are excluded.
pub fn top_ports_by(records: &[ConnectionRecord], kind: PortKind, n: usize) -> Vec<RankedEntry> {
    let mut tally = Tally::default();
    for r in records {
        let port = kind.port_of(r);
        if parse_port(port).is_some() {
            tally.add(port.to_string());
        }
    }
    let mut entries = tally.entries;
    entries.sort_by_key(|e| std::cmp::Reverse(parse_port(&e.key).unwrap_or(0)));
    entries.truncate(n);
    entries
}

pub fn cross_tabulate(
    records: &[ConnectionRecord],
    outer: Dimension,
    inner: Dimension,
) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut out: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for r in records {
        *out.entry(outer.key_of(r))
            .or_default()
            .entry(inner.key_of(r))
            .or_insert(0) += 1;
    }
    out
}

/// Count and byte totals for every distinct value; `unknown` keys are skipped.
pub fn group_with_bytes(
    records: &[ConnectionRecord],
    dim: Dimension,
) -> BTreeMap<String, AggregateBucket> {
    let mut out: BTreeMap<String, AggregateBucket> = BTreeMap::new();
    for r in records {
        let key = dim.key_of(r);
        if key.is_empty() || key.eq_ignore_ascii_case(UNKNOWN) {
            continue;
        }
        out.entry(key.clone())
            .or_insert_with(|| AggregateBucket::new(key))
            .add(r);
    }
    out
}

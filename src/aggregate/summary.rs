use super::{
    count_by, cross_tabulate, group_with_bytes, top_n_by, top_ports_by, AggregateBucket,
    Dimension, PortKind, RankedEntry, DEFAULT_TOP_N,
};
use crate::parser::ConnectionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every dimension's full grouping; the payload persisted each collection cycle.
pub type Groupings = BTreeMap<Dimension, BTreeMap<String, AggregateBucket>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub total_connections: usize,
    pub by_protocol: BTreeMap<String, u64>,
    pub by_state: BTreeMap<String, u64>,
    pub top_source_ips: Vec<RankedEntry>,
    pub top_destination_ips: Vec<RankedEntry>,
    pub top_source_ports: Vec<RankedEntry>,
    pub top_destination_ports: Vec<RankedEntry>,
    /// protocol → state → count
    pub protocol_state_matrix: BTreeMap<String, BTreeMap<String, u64>>,
    pub timestamp: DateTime<Utc>,
}

pub fn summarize(records: &[ConnectionRecord]) -> ConnectionSummary {
    ConnectionSummary {
        total_connections: records.len(),
        by_protocol: count_by(records, Dimension::Protocol),
        by_state: count_by(records, Dimension::State),
        top_source_ips: top_n_by(records, Dimension::SrcIp, DEFAULT_TOP_N),
        top_destination_ips: top_n_by(records, Dimension::DstIp, DEFAULT_TOP_N),
        top_source_ports: top_ports_by(records, PortKind::Source, DEFAULT_TOP_N),
        top_destination_ports: top_ports_by(records, PortKind::Destination, DEFAULT_TOP_N),
        protocol_state_matrix: cross_tabulate(records, Dimension::Protocol, Dimension::State),
        timestamp: Utc::now(),
    }
}

pub fn all_groupings(records: &[ConnectionRecord]) -> Groupings {
    Dimension::ALL
        .iter()
        .map(|&d| (d, group_with_bytes(records, d)))
        .collect()
}

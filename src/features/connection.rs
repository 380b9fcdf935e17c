use super::FEATURE_DIM;
use crate::error::ModelError;
use crate::parser::ConnectionRecord;
use ndarray::Array2;
use std::collections::HashMap;

const PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "icmpv6", "gre", "esp", "ah"];
const STATES: &[&str] = &[
    "ESTABLISHED",
    "TIME_WAIT",
    "CLOSE",
    "CLOSE_WAIT",
    "SYN_SENT",
    "SYN_RECV",
    "FIN_WAIT",
    "LAST_ACK",
    "LISTEN",
    "NEW",
    "RELATED",
    "NONE",
];

/// Code for a transport name; anything unlisted shares the "other" code.
pub fn protocol_code(protocol: &str) -> f64 {
    let p = protocol.to_lowercase();
    PROTOCOLS
        .iter()
        .position(|&k| k == p)
        .unwrap_or(PROTOCOLS.len()) as f64
}

/// Code for a state name; anything unlisted shares the `NONE` code.
pub fn state_code(state: &str) -> f64 {
    STATES
        .iter()
        .position(|&k| k == state)
        .unwrap_or(STATES.len() - 1) as f64
}

fn ratio(value: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        value as f64 / max as f64
    }
}

/// Batch-wide maxima and address frequencies.
#[derive(Debug, Default)]
pub struct BatchStats<'a> {
    pub max_bytes_sent: u64,
    pub max_bytes_recv: u64,
    pub max_total_bytes: u64,
    /// Highest numeric port seen on either side
    pub max_port: u64,
    /// Appearances of each address as source or destination
    pub ip_freq: HashMap<&'a str, usize>,
    pub max_ip_freq: usize,
}

impl<'a> BatchStats<'a> {
    pub fn from_records(records: &'a [ConnectionRecord]) -> Self {
        let mut s = BatchStats::default();
        for r in records {
            s.max_bytes_sent = s.max_bytes_sent.max(r.bytes_sent);
            s.max_bytes_recv = s.max_bytes_recv.max(r.bytes_recv);
            s.max_total_bytes = s.max_total_bytes.max(r.total_bytes);
            for port in [r.sport_num(), r.dport_num()].into_iter().flatten() {
                s.max_port = s.max_port.max(u64::from(port));
            }
            *s.ip_freq.entry(r.src.as_str()).or_insert(0) += 1;
            *s.ip_freq.entry(r.dst.as_str()).or_insert(0) += 1;
        }
        s.max_ip_freq = s.ip_freq.values().copied().max().unwrap_or(0);
        s
    }

    /// 1 − mean(freq(src), freq(dst)) / max freq. Rare addresses score higher.
    fn ip_uniqueness(&self, r: &ConnectionRecord) -> f64 {
        if self.max_ip_freq == 0 {
            return 0.5;
        }
        let src = self.ip_freq.get(r.src.as_str()).copied().unwrap_or(1);
        let dst = self.ip_freq.get(r.dst.as_str()).copied().unwrap_or(1);
        let avg = (src + dst) as f64 / 2.0;
        1.0 - avg / self.max_ip_freq as f64
    }

    pub fn row(&self, r: &ConnectionRecord) -> [f64; FEATURE_DIM] {
        [
            protocol_code(&r.protocol),
            state_code(&r.state),
            ratio(r.bytes_sent, self.max_bytes_sent),
            ratio(r.bytes_recv, self.max_bytes_recv),
            ratio(r.total_bytes, self.max_total_bytes),
            ratio(r.dport_num().map(u64::from).unwrap_or(0), self.max_port),
            self.ip_uniqueness(r),
        ]
    }
}

pub fn feature_rows(records: &[ConnectionRecord]) -> Vec<[f64; FEATURE_DIM]> {
    let stats = BatchStats::from_records(records);
    records.iter().map(|r| stats.row(r)).collect()
}

/// `records.len() × FEATURE_DIM` matrix.
pub fn feature_matrix(records: &[ConnectionRecord]) -> Result<Array2<f64>, ModelError> {
    if records.is_empty() {
        return Err(ModelError::EmptyBatch);
    }
    let flat: Vec<f64> = feature_rows(records).into_iter().flatten().collect();
    if flat.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    Ok(Array2::from_shape_vec((records.len(), FEATURE_DIM), flat)?)
}

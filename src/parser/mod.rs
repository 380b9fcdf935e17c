//! Record parser: raw connection-tracking text → [`ConnectionRecord`].
//!
//! Two line layouts exist in the wild and are dispatched once per line via [`Layout`]:
//! - extended: `ipv4 2 tcp 6 431999 ESTABLISHED src=.. dst=.. sport=.. dport=.. packets=.. bytes=.. ...`
//! - default:  `tcp 6 431999 ESTABLISHED src=.. dst=.. sport=.. dport=.. ...`
//!
//! Stateless protocols (udp, icmp) omit the state token entirely.

mod command;
mod procfs;

pub use command::{parse_command_line, parse_command_output};
pub use procfs::{parse_procfs, parse_procfs_line};

use serde::{Deserialize, Serialize};

/// Placeholder for ports absent from a line.
pub const UNKNOWN: &str = "unknown";
/// State used when the line carries no state token.
pub const NO_STATE: &str = "NONE";
/// Lines with fewer tokens than this are discarded.
pub const MIN_TOKENS: usize = 4;

/// One tracked flow at observation time. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Lower-cased transport name; unknown protocols kept verbatim
    pub protocol: String,
    pub state: String,
    pub src: String,
    pub dst: String,
    pub sport: String,
    pub dport: String,
    /// Forward-direction byte counter (first `bytes=` on the line)
    pub bytes_sent: u64,
    /// Reply-direction byte counter (second `bytes=` on the line)
    pub bytes_recv: u64,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(default)]
    pub assured: bool,
    #[serde(default)]
    pub unreplied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_count: Option<String>,
}

impl ConnectionRecord {
    /// Numeric destination port, if the token is a plain number.
    pub fn dport_num(&self) -> Option<u32> {
        parse_port(&self.dport)
    }

    pub fn sport_num(&self) -> Option<u32> {
        parse_port(&self.sport)
    }
}

pub(crate) fn parse_port(token: &str) -> Option<u32> {
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse().ok()
    } else {
        None
    }
}

/// Token layout of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Leading address family (`ipv4`/`ipv6`) then layer-3 number, protocol, protocol number, timeout
    Extended,
    /// Leading protocol then protocol number, timeout
    Default,
}

impl Layout {
    pub fn detect(first_token: &str) -> Self {
        match first_token {
            "ipv4" | "ipv6" => Layout::Extended,
            _ => Layout::Default,
        }
    }

    pub const fn protocol_offset(self) -> usize {
        match self {
            Layout::Extended => 2,
            Layout::Default => 0,
        }
    }

    /// Index of the optional state token
    pub const fn state_offset(self) -> usize {
        match self {
            Layout::Extended => 5,
            Layout::Default => 3,
        }
    }
}

/// Accumulates `key=value` and `[FLAG,...]` tokens for one line.
#[derive(Debug, Default)]
pub(crate) struct FieldScan {
    src: Option<String>,
    dst: Option<String>,
    sport: Option<String>,
    dport: Option<String>,
    mark: Option<String>,
    use_count: Option<String>,
    bytes_sent: u64,
    bytes_recv: u64,
    bytes_seen: bool,
    flags: Option<String>,
    assured: bool,
    unreplied: bool,
}

impl FieldScan {
    pub(crate) fn feed(&mut self, token: &str) {
        if let Some((key, value)) = token.split_once('=') {
            match key {
                // reply direction repeats these; the forward direction comes first
                "src" => set_first(&mut self.src, value),
                "dst" => set_first(&mut self.dst, value),
                "sport" => set_first(&mut self.sport, value),
                "dport" => set_first(&mut self.dport, value),
                "mark" => self.mark = Some(value.to_string()),
                "use" => self.use_count = Some(value.to_string()),
                "bytes" => {
                    if let Ok(n) = value.parse::<u64>() {
                        if self.bytes_seen {
                            self.bytes_recv = n;
                        } else {
                            self.bytes_sent = n;
                            self.bytes_seen = true;
                        }
                    }
                }
                _ => {}
            }
        } else if token.len() >= 2 && token.starts_with('[') && token.ends_with(']') {
            let flags = &token[1..token.len() - 1];
            if flags.contains("ASSURED") {
                self.assured = true;
            }
            if flags.contains("UNREPLIED") {
                self.unreplied = true;
            }
            self.flags = Some(flags.to_string());
        }
    }

    /// Build the record; `None` unless both endpoints were seen.
    pub(crate) fn finish(self, protocol: String, state: String) -> Option<ConnectionRecord> {
        let src = self.src?;
        let dst = self.dst?;
        Some(ConnectionRecord {
            protocol,
            state,
            src,
            dst,
            sport: self.sport.unwrap_or_else(|| UNKNOWN.to_string()),
            dport: self.dport.unwrap_or_else(|| UNKNOWN.to_string()),
            bytes_sent: self.bytes_sent,
            bytes_recv: self.bytes_recv,
            total_bytes: self.bytes_sent.saturating_add(self.bytes_recv),
            flags: self.flags,
            assured: self.assured,
            unreplied: self.unreplied,
            mark: self.mark,
            use_count: self.use_count,
        })
    }
}

fn set_first(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

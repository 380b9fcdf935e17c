//! Parser for the kernel pseudo-files (`/proc/net/nf_conntrack`, `/proc/net/ip_conntrack`).
//! Fixed offsets; the token at the state offset is taken verbatim unless it is a field.

use super::{ConnectionRecord, FieldScan, Layout, MIN_TOKENS, NO_STATE};

pub fn parse_procfs(content: &str) -> Vec<ConnectionRecord> {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_procfs_line)
        .collect()
}

/// State offset follows the line layout: token 5 for `nf_conntrack`, token 3 for `ip_conntrack`.
pub fn parse_procfs_line(line: &str) -> Option<ConnectionRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }
    // nf_conntrack lines carry the address family prefix, ip_conntrack lines do not
    let layout = Layout::detect(tokens[0]);
    let protocol = tokens.get(layout.protocol_offset())?.to_lowercase();

    let state_at = layout.state_offset();
    let (state, fields_from) = match tokens.get(state_at) {
        Some(tok) if !tok.contains('=') => (tok.to_string(), state_at + 1),
        _ => (NO_STATE.to_string(), state_at),
    };

    let mut scan = FieldScan::default();
    for tok in tokens.iter().skip(fields_from) {
        scan.feed(tok);
    }
    scan.finish(protocol, state)
}

//! Parser for `conntrack -L` output (extended or default layout).

use super::{ConnectionRecord, FieldScan, Layout, MIN_TOKENS, NO_STATE};

const KNOWN_STATES: &[&str] = &[
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
    NO_STATE,
];

/// Whether the token at the state offset really is a state and not the first field.
fn is_state_token(token: &str) -> bool {
    if KNOWN_STATES.contains(&token) {
        return true;
    }
    !token.contains('=') && !token.bytes().all(|b| b.is_ascii_digit()) && !token.starts_with('[')
}

/// Parse every non-blank line; malformed lines are dropped.
pub fn parse_command_output(output: &str) -> Vec<ConnectionRecord> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(parse_command_line)
        .collect()
}

pub fn parse_command_line(line: &str) -> Option<ConnectionRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }
    let layout = Layout::detect(tokens[0]);
    let protocol = tokens
        .get(layout.protocol_offset())
        .unwrap_or(&tokens[0])
        .to_lowercase();

    let state_at = layout.state_offset();
    let (state, fields_from) = match tokens.get(state_at) {
        Some(tok) if is_state_token(tok) => (tok.to_string(), state_at + 1),
        _ => (NO_STATE.to_string(), state_at),
    };

    let mut scan = FieldScan::default();
    for tok in tokens.iter().skip(fields_from) {
        scan.feed(tok);
    }
    scan.finish(protocol, state)
}

//! Record parser: layouts, state detection, positional bytes, duplicate keys.

use conntrack_monitor::parser::{
    parse_command_line, parse_command_output, parse_procfs, Layout, NO_STATE, UNKNOWN,
};

const EXTENDED_TCP: &str = "ipv4     2 tcp      6 431999 ESTABLISHED src=10.0.0.5 dst=93.184.216.34 sport=51514 dport=443 packets=12 bytes=100 src=93.184.216.34 dst=10.0.0.5 sport=443 dport=51514 packets=10 bytes=50 [ASSURED] mark=0 use=1";
const EXTENDED_UDP: &str = "ipv4     2 udp      17 29 src=10.0.0.5 dst=1.1.1.1 sport=40000 dport=53 packets=1 bytes=70 [UNREPLIED] src=1.1.1.1 dst=10.0.0.5 sport=53 dport=40000 packets=0 bytes=0 mark=0 use=1";
const DEFAULT_TCP: &str = "tcp      6 94 TIME_WAIT src=10.233.102.187 dst=44.193.130.88 sport=43022 dport=443 src=44.193.130.88 dst=10.233.102.187 sport=443 dport=43022 [ASSURED] mark=0 use=1";
const DEFAULT_UDP: &str = "udp      17 3 src=10.233.102.187 dst=172.18.101.57 sport=48106 dport=53 src=172.18.101.57 dst=10.233.102.187 sport=53 dport=48106 mark=0 use=1";

#[test]
fn layout_detection_and_offsets() {
    assert_eq!(Layout::detect("ipv4"), Layout::Extended);
    assert_eq!(Layout::detect("ipv6"), Layout::Extended);
    assert_eq!(Layout::detect("tcp"), Layout::Default);
    assert_eq!(Layout::Extended.protocol_offset(), 2);
    assert_eq!(Layout::Extended.state_offset(), 5);
    assert_eq!(Layout::Default.protocol_offset(), 0);
    assert_eq!(Layout::Default.state_offset(), 3);
}

#[test]
fn missing_dst_is_dropped() {
    assert!(parse_command_output("tcp 6 30 src=1.1.1.1 sport=1").is_empty());
    assert!(parse_command_output("tcp 6 30 dst=1.1.1.1 dport=1").is_empty());
}

#[test]
fn short_and_blank_lines_are_dropped() {
    let out = parse_command_output("\n   \nsrc=1.1.1.1 dst=2.2.2.2\ntcp 6 src=1.1.1.1\n");
    assert!(out.is_empty());
}

#[test]
fn extended_tcp_line() {
    let r = parse_command_line(EXTENDED_TCP).unwrap();
    assert_eq!(r.protocol, "tcp");
    assert_eq!(r.state, "ESTABLISHED");
    assert_eq!(r.src, "10.0.0.5");
    assert_eq!(r.dst, "93.184.216.34");
    assert_eq!(r.sport, "51514");
    assert_eq!(r.dport, "443");
    assert_eq!(r.bytes_sent, 100);
    assert_eq!(r.bytes_recv, 50);
    assert_eq!(r.total_bytes, 150);
    assert_eq!(r.flags.as_deref(), Some("ASSURED"));
    assert!(r.assured);
    assert!(!r.unreplied);
    assert_eq!(r.mark.as_deref(), Some("0"));
    assert_eq!(r.use_count.as_deref(), Some("1"));
}

#[test]
fn stateless_extended_udp_line() {
    let r = parse_command_line(EXTENDED_UDP).unwrap();
    assert_eq!(r.protocol, "udp");
    assert_eq!(r.state, NO_STATE);
    assert_eq!(r.src, "10.0.0.5");
    assert_eq!(r.dport, "53");
    assert_eq!(r.bytes_sent, 70);
    assert_eq!(r.bytes_recv, 0);
    assert!(r.unreplied);
}

#[test]
fn default_layout_lines() {
    let records = parse_command_output(&format!("{}\n{}\n", DEFAULT_TCP, DEFAULT_UDP));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].protocol, "tcp");
    assert_eq!(records[0].state, "TIME_WAIT");
    assert_eq!(records[0].src, "10.233.102.187");
    assert_eq!(records[1].protocol, "udp");
    assert_eq!(records[1].state, NO_STATE);
    assert_eq!(records[1].dst, "172.18.101.57");
    // no byte counters in default output
    assert_eq!(records[0].bytes_sent, 0);
    assert_eq!(records[0].total_bytes, 0);
}

#[test]
fn first_occurrence_wins_for_addresses() {
    let r = parse_command_line("tcp 6 10 ESTABLISHED src=1.2.3.4 dst=5.6.7.8 sport=1000 dport=80 src=9.9.9.9 dst=8.8.8.8 sport=80 dport=1000").unwrap();
    assert_eq!(r.src, "1.2.3.4");
    assert_eq!(r.dst, "5.6.7.8");
    assert_eq!(r.sport, "1000");
    assert_eq!(r.dport, "80");
}

#[test]
fn last_occurrence_wins_for_mark_and_use() {
    let r = parse_command_line("tcp 6 10 CLOSE src=1.2.3.4 dst=5.6.7.8 mark=1 use=2 mark=7 use=3").unwrap();
    assert_eq!(r.mark.as_deref(), Some("7"));
    assert_eq!(r.use_count.as_deref(), Some("3"));
}

#[test]
fn bytes_are_positional() {
    let r = parse_command_line("tcp 6 10 ESTABLISHED src=1.1.1.1 dst=2.2.2.2 bytes=100 src=2.2.2.2 dst=1.1.1.1 bytes=50").unwrap();
    assert_eq!(r.bytes_sent, 100);
    assert_eq!(r.bytes_recv, 50);
    assert_eq!(r.total_bytes, 150);
}

#[test]
fn unparseable_bytes_do_not_consume_a_position() {
    let r = parse_command_line("tcp 6 10 ESTABLISHED src=1.1.1.1 dst=2.2.2.2 bytes=abc bytes=40 bytes=60").unwrap();
    assert_eq!(r.bytes_sent, 40);
    assert_eq!(r.bytes_recv, 60);
}

#[test]
fn unknown_state_word_is_accepted_and_unknown_protocol_kept() {
    let r = parse_command_line("sctp 132 30 COOKIE_WAIT src=1.1.1.1 dst=2.2.2.2").unwrap();
    assert_eq!(r.protocol, "sctp");
    assert_eq!(r.state, "COOKIE_WAIT");
    assert_eq!(r.sport, UNKNOWN);
    assert_eq!(r.dport, UNKNOWN);
}

#[test]
fn bracket_or_numeric_token_is_not_a_state() {
    let r = parse_command_line("icmp 1 29 [UNREPLIED] src=1.1.1.1 dst=2.2.2.2 type=8 code=0 id=1").unwrap();
    assert_eq!(r.state, NO_STATE);
    assert!(r.unreplied);
}

#[test]
fn uppercase_protocol_is_lowercased() {
    let r = parse_command_line("TCP 6 10 ESTABLISHED src=1.1.1.1 dst=2.2.2.2").unwrap();
    assert_eq!(r.protocol, "tcp");
}

#[test]
fn procfs_nf_conntrack_and_legacy_lines() {
    let content = "\
ipv4     2 tcp      6 119 TIME_WAIT src=192.168.1.100 dst=10.0.0.1 sport=54321 dport=80 src=10.0.0.1 dst=192.168.1.100 sport=80 dport=54321 [ASSURED] mark=0 zone=0 use=2
ipv4     2 udp      17 25 src=192.168.1.100 dst=8.8.8.8 sport=5353 dport=53 src=8.8.8.8 dst=192.168.1.100 sport=53 dport=5353 mark=0 use=2
tcp      6 431999 ESTABLISHED src=192.168.1.5 dst=192.168.1.9 sport=22 dport=40000 src=192.168.1.9 dst=192.168.1.5 sport=40000 dport=22 use=1
ipv4     2 tcp      6 10 CLOSE src=1.1.1.1 sport=1
";
    let records = parse_procfs(content);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].protocol, "tcp");
    assert_eq!(records[0].state, "TIME_WAIT");
    assert_eq!(records[0].src, "192.168.1.100");
    assert_eq!(records[0].dport, "80");
    assert_eq!(records[1].protocol, "udp");
    assert_eq!(records[1].state, NO_STATE);
    assert_eq!(records[2].state, "ESTABLISHED");
    assert_eq!(records[2].use_count.as_deref(), Some("1"));
    assert!(records.iter().all(|r| r.bytes_sent == 0 && r.bytes_recv == 0));
}

#[test]
fn procfs_accounting_bytes() {
    let line = "ipv4 2 tcp 6 300 ESTABLISHED src=10.0.0.2 dst=10.0.0.3 sport=1 dport=2 packets=3 bytes=300 src=10.0.0.3 dst=10.0.0.2 sport=2 dport=1 packets=2 bytes=20 use=1";
    let records = parse_procfs(line);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].bytes_sent, 300);
    assert_eq!(records[0].bytes_recv, 20);
}

#[test]
fn record_serializes_use_key() {
    let r = parse_command_line(DEFAULT_TCP).unwrap();
    let v = serde_json::to_value(&r).unwrap();
    assert_eq!(v["use"], "1");
    assert_eq!(v["protocol"], "tcp");
    assert_eq!(v["bytes_sent"], 0);
}

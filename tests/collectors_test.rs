//! Acquisition fallback chain against real processes and temp pseudo-files.

use conntrack_monitor::collectors::privilege::classify_failure;
use conntrack_monitor::collectors::{ConntrackCollector, Source};
use conntrack_monitor::config::CollectorsConfig;
use conntrack_monitor::error::SourceError;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const NF_CONNTRACK: &str = "\
ipv4     2 tcp      6 119 TIME_WAIT src=192.168.1.100 dst=10.0.0.1 sport=54321 dport=80 src=10.0.0.1 dst=192.168.1.100 sport=80 dport=54321 [ASSURED] mark=0 use=2
ipv4     2 udp      17 25 src=192.168.1.100 dst=8.8.8.8 sport=5353 dport=53 src=8.8.8.8 dst=192.168.1.100 sport=53 dport=5353 mark=0 use=2
";

const MISSING_TOOL: &str = "/nonexistent/bin/conntrack-tool";

fn procfs_file(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

fn timeout() -> Duration {
    Duration::from_secs(5)
}

#[test]
fn default_chain_order() {
    let config = CollectorsConfig::default();
    let labels: Vec<String> = Source::default_chain(&config).iter().map(Source::label).collect();
    assert_eq!(
        labels,
        vec![
            "conntrack -L -o extended",
            "conntrack -L -o extended -n",
            "conntrack -L",
            "/proc/net/nf_conntrack",
            "/proc/net/ip_conntrack",
        ]
    );
}

#[tokio::test]
async fn falls_back_from_missing_tool_to_pseudo_file() {
    let file = procfs_file(NF_CONNTRACK);
    let collector = ConntrackCollector::with_sources(
        vec![
            Source::command(MISSING_TOOL, &["-L", "-o", "extended"]),
            Source::proc_file(file.path()),
        ],
        timeout(),
    );

    let acquisition = collector.acquire_detailed_async().await;
    assert_eq!(acquisition.records.len(), 2);
    assert_eq!(acquisition.source, Some(file.path().display().to_string()));
    assert_eq!(acquisition.failures.len(), 1);
    assert!(matches!(acquisition.failures[0].error, SourceError::NotFound));
    assert!(!acquisition.requires_elevated_privileges());
    assert_eq!(acquisition.records[0].state, "TIME_WAIT");
}

#[tokio::test]
async fn all_sources_failing_yields_nothing() {
    let empty = procfs_file("   \n");
    let garbage = procfs_file("not a conntrack line\n");
    let collector = ConntrackCollector::with_sources(
        vec![
            Source::command(MISSING_TOOL, &["-L"]),
            Source::proc_file(PathBuf::from("/nonexistent/nf_conntrack")),
            Source::proc_file(empty.path()),
            Source::proc_file(garbage.path()),
        ],
        timeout(),
    );

    let acquisition = collector.acquire_detailed_async().await;
    assert!(acquisition.records.is_empty());
    assert!(acquisition.source.is_none());
    assert_eq!(acquisition.failures.len(), 4);
    assert!(matches!(acquisition.failures[2].error, SourceError::Empty));
    assert!(matches!(acquisition.failures[3].error, SourceError::NoRecords));
    assert!(collector.acquire_async().await.is_empty());
}

#[test]
fn blocking_and_async_agree() {
    let file = procfs_file(NF_CONNTRACK);
    let collector = ConntrackCollector::with_sources(
        vec![Source::command(MISSING_TOOL, &[]), Source::proc_file(file.path())],
        timeout(),
    );
    let blocking = collector.acquire();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let via_async = rt.block_on(collector.acquire_async());
    assert_eq!(blocking.len(), 2);
    assert_eq!(blocking, via_async);
}

#[test]
fn permission_markers_are_classified() {
    assert!(classify_failure("conntrack v1.4.6: Operation not permitted").is_permission_denied());
    assert!(classify_failure("You need to be root to run this").is_permission_denied());
    assert!(classify_failure("Permission denied").is_permission_denied());
    assert!(!classify_failure("invalid option -- 'x'").is_permission_denied());
    assert!(!classify_failure("cannot open /root/.conntrackrc: No such file").is_permission_denied());
    assert!(!classify_failure("chroot setup failed").is_permission_denied());
}

#[cfg(unix)]
#[tokio::test]
async fn denied_tool_is_reported() {
    let collector = ConntrackCollector::with_sources(
        vec![Source::command(
            "sh",
            &["-c", "echo 'conntrack v1.4.6 (conntrack-tools): Operation not permitted' >&2; exit 1"],
        )],
        timeout(),
    );
    let acquisition = collector.acquire_detailed_async().await;
    assert!(acquisition.records.is_empty());
    assert!(acquisition.requires_elevated_privileges());
}

#[cfg(unix)]
#[tokio::test]
async fn tool_output_is_parsed_as_command_output() {
    let script = "printf 'tcp      6 94 TIME_WAIT src=10.1.1.1 dst=10.2.2.2 sport=43022 dport=443 src=10.2.2.2 dst=10.1.1.1 sport=443 dport=43022 [ASSURED] mark=0 use=1\\n'";
    let collector = ConntrackCollector::with_sources(vec![Source::command("sh", &["-c", script])], timeout());
    let acquisition = collector.acquire_detailed_async().await;
    assert_eq!(acquisition.records.len(), 1);
    assert_eq!(acquisition.records[0].dport, "443");
    assert!(acquisition.failures.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn slow_tool_times_out_and_falls_through() {
    let file = procfs_file(NF_CONNTRACK);
    let collector = ConntrackCollector::with_sources(
        vec![Source::command("sleep", &["5"]), Source::proc_file(file.path())],
        Duration::from_millis(200),
    );
    let acquisition = collector.acquire_detailed_async().await;
    assert_eq!(acquisition.records.len(), 2);
    assert!(matches!(acquisition.failures[0].error, SourceError::Timeout(_)));
}

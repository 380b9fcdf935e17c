//! Privilege checks. Listing the connection-tracking table needs root or CAP_NET_ADMIN;
//! a denied tool call is reported distinctly so operators can be told to elevate.

use crate::error::SourceError;

const DENIED_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "must be root",
    "need to be root",
];

/// True when running with effective uid 0.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

/// Map a failed tool run to a source error from its stderr.
pub fn classify_failure(stderr: &str) -> SourceError {
    let lower = stderr.to_lowercase();
    if DENIED_MARKERS.iter().any(|m| lower.contains(m)) {
        SourceError::PermissionDenied(stderr.trim().to_string())
    } else {
        SourceError::Failed(stderr.trim().to_string())
    }
}

//! Server version advisory.
//!
//! Lizzy reports its own version in the `X-Lizzy-Version` response header. A client
//! that differs from the server still works, but operators want to know about it, so
//! a mismatch is surfaced as a warning and nothing more.

use reqwest::header::HeaderMap;
use std::fmt;
use tracing::warn;

/// Response header carrying the server version.
pub const LIZZY_VERSION_HEADER: &str = "X-Lizzy-Version";

/// Version this crate reports unless the configuration overrides it.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A client/server version disagreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    /// Version the client reports
    pub client: String,
    /// Version announced by the server
    pub server: String,
}

impl fmt::Display for VersionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Version Mismatch (Client: {}, Server: {})",
            self.client, self.server
        )
    }
}

/// Compare the server version from `headers` against `client_version`.
///
/// Returns `None` when the header is absent, unreadable, empty or equal.
#[must_use]
pub fn check_server_version(client_version: &str, headers: &HeaderMap) -> Option<VersionMismatch> {
    let server = headers.get(LIZZY_VERSION_HEADER)?.to_str().ok()?.trim();

    if server.is_empty() || server == client_version {
        return None;
    }

    Some(VersionMismatch {
        client: client_version.to_string(),
        server: server.to_string(),
    })
}

/// Log a warning when the server version differs. Never fails.
pub fn warn_on_version_mismatch(client_version: &str, headers: &HeaderMap) {
    if let Some(mismatch) = check_server_version(client_version, headers) {
        warn!(
            client_version = %mismatch.client,
            server_version = %mismatch.server,
            "{mismatch}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers_with(version: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-lizzy-version", HeaderValue::from_static(version));
        headers
    }

    #[test]
    fn mismatch_detected() {
        let mismatch = check_server_version("1.0.0", &headers_with("9.9.9")).unwrap();
        assert_eq!(mismatch.client, "1.0.0");
        assert_eq!(mismatch.server, "9.9.9");
        assert_eq!(
            mismatch.to_string(),
            "Version Mismatch (Client: 1.0.0, Server: 9.9.9)"
        );
    }

    #[test]
    fn matching_version_is_silent() {
        assert!(check_server_version("1.0.0", &headers_with("1.0.0")).is_none());
    }

    #[test]
    fn missing_or_empty_header_is_silent() {
        assert!(check_server_version("1.0.0", &HeaderMap::new()).is_none());
        assert!(check_server_version("1.0.0", &headers_with("")).is_none());
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert!(check_server_version("1.0.0", &headers_with(" 1.0.0 ")).is_none());
    }
}

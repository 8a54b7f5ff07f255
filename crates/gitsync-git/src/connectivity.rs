//! Remote reachability probe
//!
//! Answers the coordinator's "is the network up" question by opening a TCP
//! connection to the host named in the remote URL. Local remotes (plain
//! paths and `file://` URLs) are always reachable.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gitsync_core::ports::IConnectivity;
use tokio::net::TcpStream;
use tracing::debug;

/// Default bound on one probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a remote URL points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEndpoint {
    Network { host: String, port: u16 },
    Local,
}

impl RemoteEndpoint {
    /// Parses https, http, ssh, git, scp-like and local remote URLs
    ///
    /// Returns `None` for URLs that name no host.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        if let Some((scheme, rest)) = url.split_once("://") {
            let default_port = match scheme.to_ascii_lowercase().as_str() {
                "file" => return Some(RemoteEndpoint::Local),
                "https" => 443,
                "http" => 80,
                "ssh" | "git+ssh" | "ssh+git" => 22,
                "git" => 9418,
                _ => return None,
            };
            let authority = rest.split('/').next().unwrap_or_default();
            let host_port = authority.rsplit('@').next().unwrap_or_default();
            return split_host_port(host_port, default_port);
        }

        // scp-like `user@host:path`; a colon after the first slash is a local path
        match url.split_once(':') {
            Some((head, _)) if !head.contains('/') && !is_windows_drive(head) => {
                let host = head.rsplit('@').next().unwrap_or_default();
                (!host.is_empty()).then(|| RemoteEndpoint::Network {
                    host: host.to_string(),
                    port: 22,
                })
            }
            _ => Some(RemoteEndpoint::Local),
        }
    }
}

fn split_host_port(host_port: &str, default_port: u16) -> Option<RemoteEndpoint> {
    // bracketed IPv6 literal
    if let Some(rest) = host_port.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().ok()?,
            None => default_port,
        };
        return Some(RemoteEndpoint::Network {
            host: host.to_string(),
            port,
        });
    }

    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (host_port, default_port),
    };
    if host.is_empty() {
        return None;
    }
    Some(RemoteEndpoint::Network {
        host: host.to_string(),
        port,
    })
}

fn is_windows_drive(head: &str) -> bool {
    head.len() == 1 && head.chars().all(|c| c.is_ascii_alphabetic())
}

/// Connectivity check that dials the remote's host
#[derive(Debug, Clone)]
pub struct TcpConnectivityProbe {
    endpoint: RemoteEndpoint,
    timeout: Duration,
}

impl TcpConnectivityProbe {
    pub fn new(endpoint: RemoteEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    /// Builds a probe for the URL configured for `remote` in the repository at `root`
    pub fn for_remote(root: &Path, remote: &str) -> Result<Self> {
        let repo = git2::Repository::open(root)
            .with_context(|| format!("Failed to open repository at {}", root.display()))?;
        let remote_handle = repo
            .find_remote(remote)
            .with_context(|| format!("Remote '{remote}' is not configured"))?;
        let url = remote_handle
            .url()
            .with_context(|| format!("Remote '{remote}' has no UTF-8 URL"))?;
        let endpoint = RemoteEndpoint::parse(url)
            .with_context(|| format!("Cannot determine host of remote URL '{url}'"))?;

        Ok(Self::new(endpoint, DEFAULT_PROBE_TIMEOUT))
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl IConnectivity for TcpConnectivityProbe {
    async fn is_network_available(&self) -> bool {
        let RemoteEndpoint::Network { host, port } = &self.endpoint else {
            return true;
        };

        match tokio::time::timeout(self.timeout, TcpStream::connect((host.as_str(), *port))).await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %host, port, error = %e, "Remote unreachable");
                false
            }
            Err(_) => {
                debug!(host = %host, port, "Reachability probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(host: &str, port: u16) -> Option<RemoteEndpoint> {
        Some(RemoteEndpoint::Network {
            host: host.to_string(),
            port,
        })
    }

    #[test]
    fn test_parse_urls() {
        assert_eq!(
            RemoteEndpoint::parse("https://github.com/me/notes.git"),
            net("github.com", 443)
        );
        assert_eq!(
            RemoteEndpoint::parse("http://user:pw@git.local:8080/notes"),
            net("git.local", 8080)
        );
        assert_eq!(
            RemoteEndpoint::parse("ssh://git@example.org:2222/notes.git"),
            net("example.org", 2222)
        );
        assert_eq!(
            RemoteEndpoint::parse("git@github.com:me/notes.git"),
            net("github.com", 22)
        );
        assert_eq!(
            RemoteEndpoint::parse("https://[::1]:8443/notes"),
            net("::1", 8443)
        );
        assert_eq!(RemoteEndpoint::parse("git://example.org/x"), net("example.org", 9418));
    }

    #[test]
    fn test_parse_local_and_invalid() {
        assert_eq!(RemoteEndpoint::parse("/srv/git/notes.git"), Some(RemoteEndpoint::Local));
        assert_eq!(RemoteEndpoint::parse("../notes.git"), Some(RemoteEndpoint::Local));
        assert_eq!(RemoteEndpoint::parse("file:///srv/notes"), Some(RemoteEndpoint::Local));
        assert_eq!(RemoteEndpoint::parse("C:/repos/notes"), Some(RemoteEndpoint::Local));
        assert_eq!(RemoteEndpoint::parse(""), None);
        assert_eq!(RemoteEndpoint::parse("gopher://x/y"), None);
        assert_eq!(RemoteEndpoint::parse("https://host:notaport/x"), None);
    }

    #[tokio::test]
    async fn test_local_remote_is_always_available() {
        let probe = TcpConnectivityProbe::new(RemoteEndpoint::Local, Duration::from_millis(10));
        assert!(probe.is_network_available().await);
    }

    #[tokio::test]
    async fn test_probe_reaches_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpConnectivityProbe::new(
            RemoteEndpoint::Network {
                host: "127.0.0.1".into(),
                port,
            },
            Duration::from_secs(2),
        );
        assert!(probe.is_network_available().await);

        drop(listener);
        assert!(!probe.is_network_available().await);
    }
}

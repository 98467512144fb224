//! Node health probes.
//!
//! The checker is an injected strategy: the container schedules the probes
//! but does not care how a node's health is established.

use crate::cluster::Node;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Strategy deciding whether a node is healthy.
#[async_trait]
pub trait NodeHealthChecker: Send + Sync + 'static {
    /// Probe the node. Returns true when the node is healthy.
    async fn check(&self, node: &Node) -> bool;
}

/// Accepts every node without probing.
///
/// Useful when an external system feeds health through
/// [`Node::record_io_error`] instead.
pub struct NoopHealthChecker;

#[async_trait]
impl NodeHealthChecker for NoopHealthChecker {
    async fn check(&self, _node: &Node) -> bool {
        true
    }
}

/// Probes by opening a TCP connection to the node's connection URI.
pub struct TcpHealthChecker {
    timeout: Duration,
}

impl TcpHealthChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpHealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl NodeHealthChecker for TcpHealthChecker {
    async fn check(&self, node: &Node) -> bool {
        let Some(addr) = node_address(node) else {
            return false;
        };
        match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(jvm_route = %node.jvm_route(), error = %e, "tcp probe failed");
                false
            }
            Err(_) => {
                debug!(jvm_route = %node.jvm_route(), "tcp probe timed out");
                false
            }
        }
    }
}

/// Probes with an HTTP GET and compares the response status.
pub struct HttpHealthChecker {
    path: String,
    expected_status: u16,
    timeout: Duration,
}

impl HttpHealthChecker {
    pub fn new(path: impl Into<String>, expected_status: u16, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            expected_status,
            timeout,
        }
    }
}

impl Default for HttpHealthChecker {
    fn default() -> Self {
        Self::new("/", 200, DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl NodeHealthChecker for HttpHealthChecker {
    async fn check(&self, node: &Node) -> bool {
        let Some(addr) = node_address(node) else {
            return false;
        };
        match http_probe(&addr, &self.path, self.timeout).await {
            Ok(status) => status == self.expected_status,
            Err(e) => {
                debug!(jvm_route = %node.jvm_route(), error = %e, "http probe failed");
                false
            }
        }
    }
}

/// host:port of the node's connection URI, with scheme-default ports.
fn node_address(node: &Node) -> Option<String> {
    let uri = node.connection_uri();
    let host = uri.host()?;
    let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
        Some("https") => 443,
        Some("ajp") => 8009,
        _ => 80,
    });
    Some(format!("{}:{}", host, port))
}

/// Issue a GET and return the response status code.
async fn http_probe(addr: &str, path: &str, probe_timeout: Duration) -> Result<u16, String> {
    let stream = match timeout(probe_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(format!("connection failed: {}", e)),
        Err(_) => return Err("connection timeout".to_string()),
    };

    let mut stream = stream;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );

    if let Err(e) = stream.write_all(request.as_bytes()).await {
        return Err(format!("write failed: {}", e));
    }

    // The status line is all we need.
    let mut buf = vec![0u8; 1024];
    let n = match timeout(probe_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => n,
        Ok(Ok(_)) => return Err("empty response".to_string()),
        Ok(Err(e)) => return Err(format!("read failed: {}", e)),
        Err(_) => return Err("read timeout".to_string()),
    };

    let response = String::from_utf8_lossy(&buf[..n]);
    parse_http_status(&response)
}

/// Parse the status code out of an HTTP response.
fn parse_http_status(response: &str) -> Result<u16, String> {
    // Format: "HTTP/1.1 200 OK\r\n..."
    let parts: Vec<&str> = response.split_whitespace().collect();
    if parts.len() < 2 {
        return Err("invalid HTTP response".to_string());
    }

    parts[1]
        .parse()
        .map_err(|_| "invalid status code".to_string())
}

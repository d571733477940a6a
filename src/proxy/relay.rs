//! Loopback relay that authenticates Chrome against the proxy gateway
//!
//! Chrome cannot attach credentials to an upstream proxy, so every browser
//! session points at a local listener instead. The relay reads Chrome's
//! CONNECT (or plain HTTP) request, replays it upstream with a
//! `Proxy-Authorization` header for the session's identity, and then moves
//! bytes both ways until either side hangs up.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::ProxyIdentity;

/// Local port range reserved for relays (19400..39400)
const PORT_BASE: u32 = 19400;
const PORT_RANGE: u32 = 20000;

static PORT_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Bounds on a single header block
const MAX_HEADERS: usize = 100;
const MAX_HEADER_LINE: usize = 8192;

/// CONNECT retries against a flaky upstream gateway
const CONNECT_RETRIES: u32 = 2;

/// Allocate a unique loopback port, wrapping within the reserved range.
pub fn allocate_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::Relaxed) % PORT_RANGE;
    (PORT_BASE + offset) as u16
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind local relay: {0}")]
    Bind(std::io::Error),
    #[error("client closed before sending a request")]
    ClientGone,
    #[error("malformed proxy request: {0}")]
    BadRequest(String),
    #[error("upstream proxy rejected request: {0}")]
    UpstreamRejected(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-session authenticating relay
pub struct ProxyRelay {
    local_port: u16,
    upstream_addr: String,
    auth_header: String,
    running: Arc<AtomicBool>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ProxyRelay {
    /// Create a relay for one proxy identity on an auto-allocated port.
    pub fn for_identity(identity: &ProxyIdentity) -> Self {
        let credentials = format!("{}:{}", identity.username, identity.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
        Self {
            local_port: allocate_port(),
            upstream_addr: format!("{}:{}", identity.host, identity.port),
            auth_header: format!("Basic {}", encoded),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
        }
    }

    /// Proxy URL Chrome should be launched with
    pub fn local_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }

    pub fn port(&self) -> u16 {
        self.local_port
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Bind the listener and spawn the accept loop.
    pub async fn start(&mut self) -> Result<(), RelayError> {
        if self.running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let addr = format!("127.0.0.1:{}", self.local_port);
        let listener = TcpListener::bind(&addr).await.map_err(RelayError::Bind)?;
        info!("Proxy relay listening on {} -> {}", addr, self.upstream_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);
        self.running.store(true, Ordering::Relaxed);

        let running = self.running.clone();
        let upstream_addr = self.upstream_addr.clone();
        let auth_header = self.auth_header.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Proxy relay shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                debug!("Relay accepted connection from {}", peer);
                                let upstream_addr = upstream_addr.clone();
                                let auth_header = auth_header.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_client(stream, &upstream_addr, &auth_header).await {
                                        warn!("Relay connection ended with error: {}", e);
                                    }
                                });
                            }
                            Err(e) => error!("Relay accept error: {}", e),
                        }
                    }
                }
            }
            running.store(false, Ordering::Relaxed);
        });

        Ok(())
    }

    /// Signal the accept loop to stop. Established tunnels drain on their own.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.running.store(false, Ordering::Relaxed);
        debug!("Proxy relay stopped on port {}", self.local_port);
    }
}

impl Drop for ProxyRelay {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Read header lines up to the blank separator, bounded.
async fn read_header_block(
    reader: &mut BufReader<TcpStream>,
) -> Result<Vec<String>, RelayError> {
    let mut headers = Vec::new();
    for _ in 0..MAX_HEADERS {
        let mut line = String::with_capacity(128);
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        if line.len() > MAX_HEADER_LINE {
            return Err(RelayError::BadRequest("header line too long".into()));
        }
        headers.push(line);
    }
    Ok(headers)
}

async fn handle_client(
    client: TcpStream,
    upstream_addr: &str,
    auth_header: &str,
) -> Result<(), RelayError> {
    let mut client = BufReader::new(client);

    let mut request_line = String::new();
    if client.read_line(&mut request_line).await? == 0 {
        return Err(RelayError::ClientGone);
    }

    let mut parts = request_line.trim().split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RelayError::BadRequest(request_line.trim().to_string()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| RelayError::BadRequest(request_line.trim().to_string()))?
        .to_string();

    let headers = read_header_block(&mut client).await?;

    if method == "CONNECT" {
        tunnel_connect(client, &target, upstream_addr, auth_header, &request_line).await
    } else {
        forward_http(client, upstream_addr, auth_header, &request_line, headers).await
    }
}

/// Establish an authenticated CONNECT tunnel upstream, then splice bytes.
async fn tunnel_connect(
    mut client: BufReader<TcpStream>,
    target: &str,
    upstream_addr: &str,
    auth_header: &str,
    request_line: &str,
) -> Result<(), RelayError> {
    debug!("CONNECT {} via {}", target, upstream_addr);

    let connect_request = format!(
        "{}\r\nHost: {}\r\nProxy-Authorization: {}\r\nProxy-Connection: keep-alive\r\n\r\n",
        request_line.trim(),
        target,
        auth_header
    );

    let mut upstream: Option<BufReader<TcpStream>> = None;
    let mut last_status = String::from("upstream unreachable");

    for attempt in 0..=CONNECT_RETRIES {
        if attempt > 0 {
            warn!("CONNECT retry {}/{} for {}", attempt, CONNECT_RETRIES, target);
            tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
        }

        let stream = match tokio::time::timeout(
            Duration::from_secs(10),
            TcpStream::connect(upstream_addr),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                last_status = e.to_string();
                continue;
            }
            Err(_) => {
                last_status = format!("timeout connecting to {}", upstream_addr);
                continue;
            }
        };

        let mut candidate = BufReader::new(stream);
        if candidate.get_mut().write_all(connect_request.as_bytes()).await.is_err() {
            continue;
        }

        let mut status_line = String::new();
        if candidate.read_line(&mut status_line).await.is_err() {
            continue;
        }
        if read_header_block(&mut candidate).await.is_err() {
            continue;
        }

        if status_line.contains(" 200") {
            upstream = Some(candidate);
            break;
        }

        last_status = status_line.trim().to_string();
        // 5xx from the gateway is usually transient, anything else is final
        let transient = status_line.contains(" 5");
        if !transient {
            break;
        }
    }

    let mut upstream = match upstream {
        Some(u) => u,
        None => {
            let _ = client
                .get_mut()
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                .await;
            return Err(RelayError::UpstreamRejected(last_status));
        }
    };

    client
        .get_mut()
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    client.get_mut().flush().await?;

    debug!("CONNECT tunnel up for {}", target);
    let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
    debug!("CONNECT tunnel closed for {}", target);
    Ok(())
}

/// Forward a plain HTTP request with the auth header injected.
async fn forward_http(
    mut client: BufReader<TcpStream>,
    upstream_addr: &str,
    auth_header: &str,
    request_line: &str,
    headers: Vec<String>,
) -> Result<(), RelayError> {
    debug!("HTTP {} via {}", request_line.trim(), upstream_addr);

    let stream = tokio::time::timeout(Duration::from_secs(10), TcpStream::connect(upstream_addr))
        .await
        .map_err(|_| RelayError::UpstreamRejected(format!("timeout connecting to {}", upstream_addr)))??;
    let mut upstream = BufReader::new(stream);

    let mut request = String::new();
    request.push_str(request_line);
    request.push_str("Proxy-Authorization: ");
    request.push_str(auth_header);
    request.push_str("\r\n");
    for header in &headers {
        request.push_str(header);
    }
    request.push_str("\r\n");

    upstream.get_mut().write_all(request.as_bytes()).await?;
    upstream.get_mut().flush().await?;

    let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
    Ok(())
}

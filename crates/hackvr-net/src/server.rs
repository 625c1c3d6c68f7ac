//! Server-side listeners: accept loops that run establishment and hand
//! framed connections to the application.
//!
//! One listener task accepts; each connection gets its own task for the
//! strict establishment exchange, then surfaces as an [`Accepted`] value on
//! an mpsc channel. The `cancel` token stops accepting and exits cleanly.
//! TLS listeners are the embedder's business: feed their streams through
//! [`establish_raw_server`] / [`establish_upgrade_server`] directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use hackvr_protocol::SessionToken;
use hackvr_session::{
    build_upgrade_response, negotiate, parse_client_hello, parse_upgrade_request,
    server_hello_line, EstablishError, Origin, PROTOCOL_VERSION,
};

use crate::client::DEFAULT_HELLO_TIMEOUT;
use crate::conn::Connection;

/// Limits for one listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub hello_timeout: Duration,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hello_timeout: DEFAULT_HELLO_TIMEOUT,
            max_connections: 64,
        }
    }
}

/// A connection that survived establishment.
pub struct Accepted<S = TcpStream> {
    pub conn: Connection<S>,
    pub peer: Option<SocketAddr>,
    /// Negotiated protocol version (1 on the upgrade path).
    pub version: u32,
    /// Canonical origin of the world the client asked for.
    pub origin: Origin,
    /// Token the client attached during establishment; the application
    /// processes it as if `resume-session` were the first command.
    pub resume_token: Option<SessionToken>,
}

/// Accept raw `hackvr://` connections until cancelled.
pub fn start_raw_server(
    listener: TcpListener,
    config: ServerConfig,
    accepted_tx: mpsc::Sender<Accepted>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    start_server(listener, config, accepted_tx, cancel, false)
}

/// Accept `http+hackvr://` upgrade connections until cancelled.
pub fn start_upgrade_server(
    listener: TcpListener,
    config: ServerConfig,
    accepted_tx: mpsc::Sender<Accepted>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    start_server(listener, config, accepted_tx, cancel, true)
}

fn start_server(
    listener: TcpListener,
    config: ServerConfig,
    accepted_tx: mpsc::Sender<Accepted>,
    cancel: CancellationToken,
    upgrade: bool,
) -> JoinHandle<()> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_connections));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("listener shutting down");
                    break;
                }
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(pair) => pair,
                        Err(err) => {
                            log::error!("accept error: {err}");
                            continue;
                        }
                    };
                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            log::warn!("connection limit reached, rejecting {peer}");
                            continue;
                        }
                    };
                    let tx = accepted_tx.clone();
                    let timeout = config.hello_timeout;
                    tokio::spawn(async move {
                        let establishment = if upgrade {
                            establish_upgrade_server(stream, timeout, false).await
                        } else {
                            establish_raw_server(stream, timeout).await
                        };
                        match establishment {
                            Ok(mut accepted) => {
                                accepted.peer = Some(peer);
                                if tx.send(accepted).await.is_err() {
                                    log::debug!("application gone, dropping {peer}");
                                }
                            }
                            Err(err) => {
                                // Strict regime: close without replying.
                                log::debug!("establishment with {peer} failed: {err}");
                            }
                        }
                        drop(permit);
                    });
                }
            }
        }
    })
}

/// Server half of the raw `hackvr-hello` exchange.
pub async fn establish_raw_server<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    hello_timeout: Duration,
) -> Result<Accepted<S>, EstablishError> {
    let mut conn = Connection::new(stream);
    conn.send(&server_hello_line())
        .await
        .map_err(|_| EstablishError::Closed)?;

    let frame = conn.next_frame_strict(hello_timeout).await?;
    let hello = parse_client_hello(&frame)?;
    let version = negotiate(hello.max_version, PROTOCOL_VERSION)?;
    let url = Url::parse(&hello.uri).map_err(|_| EstablishError::MalformedHello)?;
    let origin = Origin::from_raw_url(&url).map_err(|_| EstablishError::MalformedHello)?;
    log::debug!("client established v{version} for {}", hello.uri);
    Ok(Accepted {
        conn,
        peer: None,
        version,
        origin,
        resume_token: hello.token,
    })
}

/// Server half of the HTTP/1.1 upgrade exchange.
pub async fn establish_upgrade_server<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    hello_timeout: Duration,
    secure: bool,
) -> Result<Accepted<S>, EstablishError> {
    let mut conn = Connection::new(stream);
    let (block, leftover) = conn.read_header_block(hello_timeout).await?;
    let request = parse_upgrade_request(&block)?;
    let origin = Origin::from_upgrade(&request.host, &request.target, secure)
        .map_err(|_| EstablishError::MalformedHttp("host header"))?;

    conn.send(&build_upgrade_response())
        .await
        .map_err(|_| EstablishError::Closed)?;
    // The client's command stream may already have started.
    conn.preload(&leftover);
    log::debug!("upgrade established for {}{}", request.host, request.target);
    Ok(Accepted {
        conn,
        peer: None,
        version: 1,
        origin,
        resume_token: request.token,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Client-side connector: dial, establish, hand back a framed stream.
//!
//! Raw schemes exchange `hackvr-hello` lines; upgrade schemes run the
//! HTTP/1.1 handshake and switch to the HackVR stream immediately after the
//! blank line. TLS is an external collaborator: the `hackvrs` and
//! `https+hackvr` schemes are only reachable through
//! [`Connector::establish_on`], where the embedder supplies an
//! already-negotiated TLS stream.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use hackvr_protocol::SessionToken;
use hackvr_session::{
    client_hello_line, negotiate, parse_server_hello, parse_upgrade_response, EstablishError,
    Origin, PROTOCOL_VERSION,
};

use crate::conn::Connection;
use crate::url::{parse_hackvr_url, HackVrUrl, Scheme};

/// Default window for the peer's side of the establishment exchange.
pub const DEFAULT_HELLO_TIMEOUT: Duration = Duration::from_millis(500);

/// An established client connection.
#[derive(Debug)]
pub struct Established<S> {
    pub conn: Connection<S>,
    /// Negotiated protocol version.
    pub version: u32,
    /// The origin session tokens from this connection bind against.
    pub origin: Origin,
    /// Token the viewer attached (from the URL fragment); the server has
    /// processed it as an implicit `resume-session`.
    pub token: Option<SessionToken>,
}

/// Dials and establishes HackVR connections.
#[derive(Debug, Clone)]
pub struct Connector {
    pub hello_timeout: Duration,
}

impl Default for Connector {
    fn default() -> Self {
        Self {
            hello_timeout: DEFAULT_HELLO_TIMEOUT,
        }
    }
}

impl Connector {
    /// Connect to a cleartext HackVR URL. TLS schemes are rejected here;
    /// use [`Connector::establish_on`] with an embedder-provided stream.
    pub async fn connect(&self, raw_url: &str) -> Result<Established<TcpStream>> {
        let url = parse_hackvr_url(raw_url)?;
        if url.scheme.is_tls() {
            bail!(
                "{raw_url:?} needs a TLS transport; establish over an \
                 embedder-supplied stream instead"
            );
        }
        let stream = TcpStream::connect((url.host.as_str(), url.port))
            .await
            .with_context(|| format!("connect to {}:{}", url.host, url.port))?;
        self.establish_on(stream, &url).await
    }

    /// Run establishment over an already-connected stream (TCP, TLS, or a
    /// test transport).
    pub async fn establish_on<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        stream: S,
        url: &HackVrUrl,
    ) -> Result<Established<S>> {
        let mut conn = Connection::new(stream);
        match url.scheme {
            Scheme::Raw | Scheme::RawTls => self.establish_raw(conn, url).await,
            Scheme::Upgrade | Scheme::UpgradeTls => {
                let version = self.establish_upgrade(&mut conn, url).await?;
                Ok(Established {
                    conn,
                    version,
                    origin: url.origin.clone(),
                    token: url.token,
                })
            }
        }
    }

    async fn establish_raw<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        mut conn: Connection<S>,
        url: &HackVrUrl,
    ) -> Result<Established<S>> {
        conn.send(&client_hello_line(&url.hello_uri, url.token.as_ref()))
            .await?;
        let frame = conn
            .next_frame_strict(self.hello_timeout)
            .await
            .map_err(establish_fatal)?;
        let server_max = parse_server_hello(&frame).map_err(establish_fatal)?;
        let version = negotiate(PROTOCOL_VERSION, server_max).map_err(establish_fatal)?;
        log::debug!("raw establishment done, effective version v{version}");
        Ok(Established {
            conn,
            version,
            origin: url.origin.clone(),
            token: url.token,
        })
    }

    async fn establish_upgrade<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        conn: &mut Connection<S>,
        url: &HackVrUrl,
    ) -> Result<u32> {
        let request = hackvr_session::build_upgrade_request(
            &url.host_header(),
            &url.target,
            url.token.as_ref(),
        );
        conn.send(&request).await?;

        let (block, leftover) = conn
            .read_header_block(self.hello_timeout)
            .await
            .map_err(establish_fatal)?;
        match parse_upgrade_response(&block) {
            Ok(()) => {
                // The HackVR stream starts immediately after the blank line.
                conn.preload(&leftover);
                log::debug!("upgrade establishment done (v1)");
                Ok(1)
            }
            Err(EstablishError::UnexpectedStatus {
                status,
                body_follows: true,
            }) => {
                // A non-101 2xx carries a debug body the viewer surfaces.
                let mut body = leftover;
                body.extend(conn.read_body_best_effort(self.hello_timeout).await);
                bail!(
                    "upgrade refused with HTTP {status}: {}",
                    String::from_utf8_lossy(&body).trim()
                )
            }
            Err(err) => Err(establish_fatal(err)),
        }
    }
}

fn establish_fatal(err: EstablishError) -> anyhow::Error {
    anyhow::anyhow!("establishment failed: {err}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

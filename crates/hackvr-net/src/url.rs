//! HackVR URL handling.
//!
//! Four schemes select the transport: `hackvr://` (raw TCP), `hackvrs://`
//! (raw TCP over TLS), `http+hackvr://` and `https+hackvr://` (HTTP/1.1
//! Upgrade). The URL fragment is parsed client-side as an optional session
//! token and never transmitted inside `uri` parameters.

use anyhow::{bail, Context, Result};
use url::Url;

use hackvr_protocol::SessionToken;
use hackvr_session::{Origin, HACKVRS_PORT, HACKVR_PORT};

/// Which transport a URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Raw,
    RawTls,
    Upgrade,
    UpgradeTls,
}

impl Scheme {
    pub fn is_tls(&self) -> bool {
        matches!(self, Scheme::RawTls | Scheme::UpgradeTls)
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Raw => HACKVR_PORT,
            Scheme::RawTls => HACKVRS_PORT,
            Scheme::Upgrade => 80,
            Scheme::UpgradeTls => 443,
        }
    }
}

/// A parsed HackVR URL, ready for connecting.
#[derive(Debug, Clone)]
pub struct HackVrUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Request-target: path plus optional query.
    pub target: String,
    /// Session token recovered from the URL fragment, if any.
    pub token: Option<SessionToken>,
    /// Fragment-stripped URL text, as sent in the raw hello.
    pub hello_uri: String,
    /// The canonical origin tuple tokens bind against.
    pub origin: Origin,
}

impl HackVrUrl {
    /// The `Host` header value for upgrade requests: port included only when
    /// it is not the scheme default.
    pub fn host_header(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Parse and classify a HackVR URL.
pub fn parse_hackvr_url(raw: &str) -> Result<HackVrUrl> {
    let url = Url::parse(raw).with_context(|| format!("unparseable URL {raw:?}"))?;
    let scheme = match url.scheme() {
        "hackvr" => Scheme::Raw,
        "hackvrs" => Scheme::RawTls,
        "http+hackvr" => Scheme::Upgrade,
        "https+hackvr" => Scheme::UpgradeTls,
        other => bail!("unsupported URL scheme {other:?}"),
    };
    let host = url
        .host_str()
        .context("URL must include a hostname")?
        .to_string();
    let port = url.port().unwrap_or_else(|| scheme.default_port());

    let token = match url.fragment() {
        Some(fragment) if !fragment.is_empty() => Some(
            SessionToken::parse(fragment)
                .map_err(|err| anyhow::anyhow!("URL fragment is not a session token: {err}"))?,
        ),
        _ => None,
    };

    let mut stripped = url.clone();
    stripped.set_fragment(None);
    let hello_uri = stripped.to_string();

    let path = if url.path().is_empty() { "/" } else { url.path() };
    let mut target = path.to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let origin = match scheme {
        Scheme::Raw | Scheme::RawTls => Origin::from_raw_url(&stripped)
            .map_err(|err| anyhow::anyhow!("cannot derive origin: {err}"))?,
        Scheme::Upgrade | Scheme::UpgradeTls => {
            let host_header = if port == scheme.default_port() {
                host.clone()
            } else {
                format!("{host}:{port}")
            };
            Origin::from_upgrade(&host_header, &target, scheme.is_tls())
                .map_err(|err| anyhow::anyhow!("cannot derive origin: {err}"))?
        }
    };

    Ok(HackVrUrl {
        scheme,
        host,
        port,
        target,
        token,
        hello_uri,
        origin,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

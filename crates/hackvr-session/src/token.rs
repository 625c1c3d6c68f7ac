//! Session tokens and origin binding.
//!
//! Tokens are session *identifiers*, not credentials: resuming one may still
//! require re-authentication, and world state is never transferred client
//! side. Every token is bound to a canonicalized origin tuple; viewers
//! refuse to attach a token to a connection whose origin differs from the
//! one it was stored under.

use std::collections::HashMap;
use std::time::Duration;

use rand::RngCore;
use thiserror::Error;
use url::Url;

use hackvr_protocol::{SessionToken, UserId};

/// Default port for `hackvr://`.
pub const HACKVR_PORT: u16 = 1913;

/// Default port for `hackvrs://`.
pub const HACKVRS_PORT: u16 = 19133;

/// The canonicalized tuple a token is bound to.
///
/// For raw connections: scheme, lowercased host (IDNA A-label), explicit or
/// default port, path, and query. For HTTP upgrades: scheme, canonicalized
/// `Host` header, and request-target. The URI fragment is never part of the
/// origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub resource: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("URL must include a host")]
    MissingHost,
    #[error("unparseable URL")]
    Unparseable,
}

impl Origin {
    /// Canonicalize a `hackvr://` or `hackvrs://` URL.
    pub fn from_raw_url(url: &Url) -> Result<Self, OriginError> {
        let default_port = match url.scheme() {
            "hackvr" => HACKVR_PORT,
            "hackvrs" => HACKVRS_PORT,
            other => return Err(OriginError::UnsupportedScheme(other.to_string())),
        };
        let host = url.host_str().ok_or(OriginError::MissingHost)?;
        let mut resource = url.path().to_string();
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: canonicalize_host(host)?,
            port: url.port().unwrap_or(default_port),
            resource,
        })
    }

    /// Canonicalize an HTTP upgrade origin from the `Host` header and the
    /// request-target. `secure` selects the `https+hackvr` scheme.
    pub fn from_upgrade(host_header: &str, target: &str, secure: bool) -> Result<Self, OriginError> {
        let (scheme, default_port) = if secure {
            ("https+hackvr", 443)
        } else {
            ("http+hackvr", 80)
        };
        let (host, port) = match host_header.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|ch| ch.is_ascii_digit()) && !port.is_empty() => {
                (host, port.parse().map_err(|_| OriginError::Unparseable)?)
            }
            _ => (host_header, default_port),
        };
        if host.is_empty() {
            return Err(OriginError::MissingHost);
        }
        Ok(Self {
            scheme: scheme.to_string(),
            host: canonicalize_host(host)?,
            port,
            resource: target.to_string(),
        })
    }
}

/// Lowercase a host and apply IDNA-to-A-label conversion. The `url` crate
/// treats hosts of non-special schemes as opaque, so the host is re-parsed
/// under a special scheme to get the full WHATWG host canonicalization.
fn canonicalize_host(host: &str) -> Result<String, OriginError> {
    Url::parse(&format!("http://{host}"))
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or(OriginError::Unparseable)
}

/// Mint a fresh 32-byte token from the CSPRNG.
pub fn mint_token() -> SessionToken {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    SessionToken(bytes)
}

/// Why a `resume-session` was not honored. The server replies per its own
/// policy; none of these leak more than token validity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResumeError {
    #[error("unknown session token")]
    Unknown,
    #[error("session token was revoked")]
    Revoked,
    #[error("session token expired")]
    Expired,
    #[error("session token bound to a different origin")]
    OriginMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub origin: Origin,
    pub user: UserId,
    pub issued_at: Duration,
    pub lifetime: Option<Duration>,
    pub revoked: bool,
}

/// Server-side registry of announced tokens. Logically single-writer: the
/// owner wraps it in a lock when connections share it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<SessionToken, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mint and register a token bound to `origin` for `user`.
    pub fn announce(
        &mut self,
        origin: Origin,
        user: UserId,
        now: Duration,
        lifetime: Option<Duration>,
    ) -> SessionToken {
        let token = mint_token();
        self.entries.insert(
            token,
            SessionEntry {
                origin,
                user,
                issued_at: now,
                lifetime,
                revoked: false,
            },
        );
        token
    }

    /// Re-announcing an existing token refreshes its expiry.
    pub fn refresh(&mut self, token: &SessionToken, now: Duration, lifetime: Option<Duration>) {
        if let Some(entry) = self.entries.get_mut(token) {
            entry.issued_at = now;
            entry.lifetime = lifetime;
        }
    }

    /// World-wide invalidation.
    pub fn revoke(&mut self, token: &SessionToken) {
        if let Some(entry) = self.entries.get_mut(token) {
            log::info!("revoking session token for {}", entry.user);
            entry.revoked = true;
        }
    }

    /// Validate a `resume-session` against the registry and the connection's
    /// origin. Restoration semantics beyond this check are server policy.
    pub fn resume(
        &self,
        token: &SessionToken,
        origin: &Origin,
        now: Duration,
    ) -> Result<&SessionEntry, ResumeError> {
        let entry = self.entries.get(token).ok_or(ResumeError::Unknown)?;
        if entry.revoked {
            return Err(ResumeError::Revoked);
        }
        if let Some(lifetime) = entry.lifetime {
            if now.saturating_sub(entry.issued_at) > lifetime {
                return Err(ResumeError::Expired);
            }
        }
        if entry.origin != *origin {
            return Err(ResumeError::OriginMismatch);
        }
        Ok(entry)
    }
}

/// Per-connection announced-token slot, as tracked by the viewer.
/// Announcing a different token invalidates the previous one for this
/// connection; announcing the same one is a refresh.
#[derive(Debug, Default)]
pub struct AnnouncedToken {
    current: Option<SessionToken>,
}

impl AnnouncedToken {
    pub fn current(&self) -> Option<&SessionToken> {
        self.current.as_ref()
    }

    /// Returns the token that became invalid for this connection, if any.
    pub fn announce(&mut self, token: SessionToken) -> Option<SessionToken> {
        match self.current {
            Some(previous) if previous == token => None,
            _ => self.current.replace(token),
        }
    }

    pub fn revoke(&mut self, token: &SessionToken) {
        if self.current.as_ref() == Some(token) {
            self.current = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

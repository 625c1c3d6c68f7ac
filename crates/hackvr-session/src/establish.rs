//! Connection establishment: raw `hackvr-hello` and HTTP/1.1 Upgrade.
//!
//! Everything here is sans-IO: the transport layer reads bytes and hands
//! complete first lines (or HTTP header blocks) to these functions. The
//! establishment regime is strict — every error closes the transport, the
//! viewer surfaces it, and auto-reconnect is forbidden.
//!
//! Raw path: both sides send `hackvr-hello` as their very first line. The
//! effective version is `min(client-max, server-max)`; anything below v1
//! closes the connection. A session token carried in the client hello is
//! processed as an implicit `resume-session`.
//!
//! HTTP path: `GET` with `Connection: upgrade`, `Upgrade: hackvr`,
//! `HackVr-Version: v1`, optional `HackVr-Session`. Success is exactly
//! `101 Switching Protocols` with matching headers; the HackVR stream begins
//! immediately after the blank line and `hackvr-hello` must not appear on it.

use std::collections::HashMap;

use thiserror::Error;

use hackvr_protocol::{encode_line, types, Frame, SessionToken};

/// Highest protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Errors in the strict establishment regime. All of them are fatal to the
/// transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EstablishError {
    #[error("expected hackvr-hello, got {0:?}")]
    UnexpectedFirstCommand(String),
    #[error("malformed hackvr-hello")]
    MalformedHello,
    #[error("hello uri must not carry a fragment")]
    FragmentInHelloUri,
    #[error("no protocol version in common")]
    UnsupportedVersion,
    #[error("framing violation during establishment")]
    Framing,
    #[error("malformed HTTP {0}")]
    MalformedHttp(&'static str),
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16, body_follows: bool },
    #[error("missing or mismatched upgrade headers")]
    BadUpgradeHeaders,
    #[error("connection closed during establishment")]
    Closed,
    #[error("establishment timed out")]
    TimedOut,
}

/// The parsed client side of a raw hello.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientHello {
    pub max_version: u32,
    pub uri: String,
    pub token: Option<SessionToken>,
}

/// Effective version negotiation: the minimum of the two maxima, which must
/// still be a version we can speak.
pub fn negotiate(client_max: u32, server_max: u32) -> Result<u32, EstablishError> {
    let effective = client_max.min(server_max);
    if effective < 1 {
        return Err(EstablishError::UnsupportedVersion);
    }
    Ok(effective)
}

/// First line a client sends on a raw connection.
pub fn client_hello_line(uri: &str, token: Option<&SessionToken>) -> Vec<u8> {
    let mut params = vec![types::format_version(PROTOCOL_VERSION), uri.to_string()];
    if let Some(token) = token {
        params.push(token.to_string());
    }
    encode_line("hackvr-hello", &params).expect("hello line encodes")
}

/// First line a server sends on a raw connection.
pub fn server_hello_line() -> Vec<u8> {
    encode_line("hackvr-hello", &[types::format_version(PROTOCOL_VERSION)])
        .expect("hello line encodes")
}

/// Parse the client's first frame on a raw connection.
pub fn parse_client_hello(frame: &Frame) -> Result<ClientHello, EstablishError> {
    if frame.name != "hackvr-hello" {
        return Err(EstablishError::UnexpectedFirstCommand(frame.name.clone()));
    }
    if frame.args.len() < 2 || frame.args.len() > 3 {
        return Err(EstablishError::MalformedHello);
    }
    let max_version =
        types::parse_version(&frame.args[0]).map_err(|_| EstablishError::MalformedHello)?;
    let uri = types::parse_uri(&frame.args[1]).map_err(|_| EstablishError::MalformedHello)?;
    if uri.contains('#') {
        return Err(EstablishError::FragmentInHelloUri);
    }
    let token = match frame.args.get(2) {
        Some(raw) => {
            Some(SessionToken::parse(raw).map_err(|_| EstablishError::MalformedHello)?)
        }
        None => None,
    };
    Ok(ClientHello {
        max_version,
        uri,
        token,
    })
}

/// Parse the server's first frame on a raw connection, returning its max
/// version.
pub fn parse_server_hello(frame: &Frame) -> Result<u32, EstablishError> {
    if frame.name != "hackvr-hello" {
        return Err(EstablishError::UnexpectedFirstCommand(frame.name.clone()));
    }
    if frame.args.len() != 1 {
        return Err(EstablishError::MalformedHello);
    }
    types::parse_version(&frame.args[0]).map_err(|_| EstablishError::MalformedHello)
}

// ---------------------------------------------------------------------------
// HTTP/1.1 Upgrade
// ---------------------------------------------------------------------------

/// A parsed upgrade request, as seen by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeRequest {
    pub host: String,
    pub target: String,
    pub token: Option<SessionToken>,
}

/// Build the client's upgrade request. `target` is the request-target
/// (path plus optional query); `host_header` already carries the port when
/// it is not the scheme default.
pub fn build_upgrade_request(
    host_header: &str,
    target: &str,
    token: Option<&SessionToken>,
) -> Vec<u8> {
    let mut request = format!(
        "GET {target} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Connection: upgrade\r\n\
         Upgrade: hackvr\r\n\
         HackVr-Version: v1\r\n"
    );
    if let Some(token) = token {
        request.push_str(&format!("HackVr-Session: {token}\r\n"));
    }
    request.push_str("\r\n");
    request.into_bytes()
}

/// The server's `101 Switching Protocols` response.
pub fn build_upgrade_response() -> Vec<u8> {
    let response = "HTTP/1.1 101 Switching Protocols\r\n\
                    Connection: upgrade\r\n\
                    Upgrade: hackvr\r\n\
                    HackVr-Version: v1\r\n\
                    \r\n";
    response.as_bytes().to_vec()
}

/// Parse a request header block (everything up to and including the blank
/// line, decoded as latin-1-compatible text).
pub fn parse_upgrade_request(header_block: &str) -> Result<UpgradeRequest, EstablishError> {
    let mut lines = header_block.split("\r\n");
    let request_line = lines.next().ok_or(EstablishError::MalformedHttp("request"))?;
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or("");
    let target = parts
        .next()
        .ok_or(EstablishError::MalformedHttp("request line"))?;
    let version = parts.next().unwrap_or("");
    if !method.eq_ignore_ascii_case("GET") || !version.starts_with("HTTP/1.1") {
        return Err(EstablishError::MalformedHttp("request line"));
    }

    let headers = parse_headers(lines);
    check_upgrade_headers(&headers)?;
    let host = headers
        .get("host")
        .ok_or(EstablishError::MalformedHttp("missing Host"))?
        .clone();
    let token = match headers.get("hackvr-session") {
        Some(raw) => Some(
            SessionToken::parse(raw).map_err(|_| EstablishError::MalformedHttp("session token"))?,
        ),
        None => None,
    };
    Ok(UpgradeRequest {
        host,
        target: target.to_string(),
        token,
    })
}

/// Parse a response header block. Success is strictly `101` with matching
/// upgrade headers; any other 2xx signals a debug body the viewer should
/// surface, and everything else is a plain failure.
pub fn parse_upgrade_response(header_block: &str) -> Result<(), EstablishError> {
    let mut lines = header_block.split("\r\n");
    let status_line = lines.next().ok_or(EstablishError::MalformedHttp("response"))?;
    let mut parts = status_line.split(' ');
    let version = parts.next().unwrap_or("");
    let status: u16 = parts
        .next()
        .and_then(|raw| raw.parse().ok())
        .ok_or(EstablishError::MalformedHttp("status line"))?;
    if !version.starts_with("HTTP/1.1") {
        return Err(EstablishError::MalformedHttp("status line"));
    }
    if status != 101 {
        return Err(EstablishError::UnexpectedStatus {
            status,
            body_follows: (200..300).contains(&status),
        });
    }
    let headers = parse_headers(lines);
    check_upgrade_headers(&headers)?;
    Ok(())
}

fn check_upgrade_headers(headers: &HashMap<String, String>) -> Result<(), EstablishError> {
    let upgrade_ok = headers
        .get("upgrade")
        .is_some_and(|value| value.eq_ignore_ascii_case("hackvr"));
    let connection_ok = headers
        .get("connection")
        .is_some_and(|value| value.to_ascii_lowercase().contains("upgrade"));
    if upgrade_ok && connection_ok {
        Ok(())
    } else {
        Err(EstablishError::BadUpgradeHeaders)
    }
}

/// Header names are case-insensitive; values keep their case with edges
/// trimmed. Lines without a colon are skipped.
fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    headers
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, args: &[&str]) -> Frame {
        Frame {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn negotiation_takes_minimum() {
        assert_eq!(negotiate(2, 1).unwrap(), 1);
        assert_eq!(negotiate(1, 3).unwrap(), 1);
        assert_eq!(negotiate(4, 4).unwrap(), 4);
    }

    #[test]
    fn client_hello_round_trip() {
        let token = SessionToken([3u8; 32]);
        let line = client_hello_line("hackvr://example/world", Some(&token));
        let text = String::from_utf8(line).unwrap();
        let parts: Vec<&str> = text.trim_end().split('\t').collect();
        let hello = parse_client_hello(&frame(parts[0], &parts[1..])).unwrap();
        assert_eq!(hello.max_version, PROTOCOL_VERSION);
        assert_eq!(hello.uri, "hackvr://example/world");
        assert_eq!(hello.token, Some(token));
    }

    #[test]
    fn client_hello_without_token() {
        let hello =
            parse_client_hello(&frame("hackvr-hello", &["v2", "hackvr://example/world"])).unwrap();
        assert_eq!(hello.max_version, 2);
        assert!(hello.token.is_none());
    }

    #[test]
    fn hello_rejects_fragment() {
        assert_eq!(
            parse_client_hello(&frame(
                "hackvr-hello",
                &["v1", "hackvr://example/world#token"],
            )),
            Err(EstablishError::FragmentInHelloUri)
        );
    }

    #[test]
    fn wrong_first_command_is_fatal() {
        assert_eq!(
            parse_client_hello(&frame("chat", &["hello"])),
            Err(EstablishError::UnexpectedFirstCommand("chat".into()))
        );
        assert_eq!(
            parse_server_hello(&frame("chat", &["hello"])),
            Err(EstablishError::UnexpectedFirstCommand("chat".into()))
        );
    }

    #[test]
    fn server_hello_requires_exactly_one_version() {
        assert_eq!(parse_server_hello(&frame("hackvr-hello", &["v1"])).unwrap(), 1);
        assert!(parse_server_hello(&frame("hackvr-hello", &[])).is_err());
        assert!(parse_server_hello(&frame("hackvr-hello", &["v1", "x"])).is_err());
        assert!(parse_server_hello(&frame("hackvr-hello", &["1"])).is_err());
    }

    #[test]
    fn upgrade_request_round_trip() {
        let token = SessionToken([7u8; 32]);
        let raw = build_upgrade_request("example.com:8080", "/world?a=1", Some(&token));
        let text = String::from_utf8(raw).unwrap();
        let request = parse_upgrade_request(&text).unwrap();
        assert_eq!(request.host, "example.com:8080");
        assert_eq!(request.target, "/world?a=1");
        assert_eq!(request.token, Some(token));
    }

    #[test]
    fn upgrade_request_requires_headers() {
        let raw = "GET /world HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(
            parse_upgrade_request(raw),
            Err(EstablishError::BadUpgradeHeaders)
        );
        let raw = "POST /world HTTP/1.1\r\nHost: x\r\nConnection: upgrade\r\nUpgrade: hackvr\r\n\r\n";
        assert!(matches!(
            parse_upgrade_request(raw),
            Err(EstablishError::MalformedHttp(_))
        ));
    }

    #[test]
    fn upgrade_response_round_trip() {
        let raw = build_upgrade_response();
        let text = String::from_utf8(raw).unwrap();
        parse_upgrade_response(&text).unwrap();
    }

    #[test]
    fn upgrade_response_headers_are_case_insensitive() {
        let raw = "HTTP/1.1 101 Switching Protocols\r\nCONNECTION: Upgrade\r\nupgrade: HackVR\r\n\r\n";
        parse_upgrade_response(raw).unwrap();
    }

    #[test]
    fn non_101_status_is_fatal() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n";
        assert_eq!(
            parse_upgrade_response(raw),
            Err(EstablishError::UnexpectedStatus {
                status: 200,
                body_follows: true
            })
        );
        let raw = "HTTP/1.1 404 Not Found\r\n\r\n";
        assert_eq!(
            parse_upgrade_response(raw),
            Err(EstablishError::UnexpectedStatus {
                status: 404,
                body_follows: false
            })
        );
    }

    #[test]
    fn status_101_with_wrong_headers_is_fatal() {
        let raw = "HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: websocket\r\n\r\n";
        assert_eq!(
            parse_upgrade_response(raw),
            Err(EstablishError::BadUpgradeHeaders)
        );
    }
}

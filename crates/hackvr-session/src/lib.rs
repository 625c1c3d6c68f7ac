//! Session machinery for HackVR connections: establishment, authentication,
//! and session tokens.
//!
//! The [`establish`] module is sans-IO — transports feed it first lines and
//! HTTP header blocks and act on the verdicts. [`auth`] is the server's
//! challenge/response automaton plus the viewer-side signing helper.
//! [`token`] owns origin canonicalization and the announce/refresh/revoke/
//! resume lifecycle; [`identity`] is the server's `userid → public key`
//! table. [`host`] ties them together as the per-connection server agent
//! that processes the C→S command stream in wire order.

pub mod auth;
pub mod establish;
pub mod host;
pub mod identity;
pub mod token;

pub use auth::{sign_challenge, signing_payload, AuthEvent, AuthMachine, NONCE_TTL};
pub use host::{HostEvent, HostOutput, HostSession};
pub use establish::{
    build_upgrade_request, build_upgrade_response, client_hello_line, negotiate,
    parse_client_hello, parse_server_hello, parse_upgrade_request, parse_upgrade_response,
    server_hello_line, ClientHello, EstablishError, UpgradeRequest, PROTOCOL_VERSION,
};
pub use identity::IdentityStore;
pub use token::{
    mint_token, AnnouncedToken, Origin, OriginError, ResumeError, SessionEntry, SessionRegistry,
    HACKVRS_PORT, HACKVR_PORT,
};

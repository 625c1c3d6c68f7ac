//! TCP transports for HackVR.
//!
//! This crate glues the sans-IO establishment engine to real sockets: a
//! [`Connector`] that dials any HackVR URL, and listener tasks that accept
//! connections, run the strict establishment exchange, and hand framed
//! streams to the application. Each accepted connection is meant to be owned
//! by one task that processes its command stream strictly in order.
//!
//! TLS never happens in here. The `hackvrs` and `https+hackvr` schemes are
//! served by passing an externally negotiated stream to the `establish_*`
//! functions.

pub mod client;
pub mod conn;
pub mod server;
pub mod url;

pub use client::{Connector, Established, DEFAULT_HELLO_TIMEOUT};
pub use conn::Connection;
pub use server::{
    establish_raw_server, establish_upgrade_server, start_raw_server, start_upgrade_server,
    Accepted, ServerConfig,
};
pub use url::{parse_hackvr_url, HackVrUrl, Scheme};

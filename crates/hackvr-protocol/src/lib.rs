//! Wire codec and command catalog for the HackVR protocol.
//!
//! HackVR is a line-oriented, server-authoritative protocol: a host drives a
//! 3D scene on a remote viewer with `CR LF`-terminated, `HT`-separated text
//! commands, and the viewer reports discrete interactions back. This crate
//! owns everything between raw transport bytes and a typed command:
//!
//! - [`framer`]: incremental splitting of the byte stream into frames, with
//!   control-character and length guards and resynchronization after
//!   violations.
//! - [`types`]: parsing and canonical formatting of every typed argument.
//! - [`selector`]: glob and range expansion over dash-grouped identifiers.
//! - [`command`]: the full catalog as direction-typed enums with parse and
//!   encode.
//! - [`encode`]: outbound line assembly under the same rules the framer
//!   enforces inbound.
//!
//! Session state, the scene engine, and transports live in sibling crates.

pub mod command;
pub mod encode;
pub mod error;
pub mod framer;
pub mod selector;
pub mod types;

pub use command::{direction_of, Direction, HostCommand, TriangleRecord, ViewerCommand};
pub use encode::encode_line;
pub use error::{CommandError, EncodeError};
pub use framer::{Frame, FrameEvent, FrameViolation, Framer, MAX_FRAME_SIZE};
pub use selector::{Selector, SelectorError};
pub use types::{
    Anchor, Color, Euler, GeomId, Ident, IntentId, ObjectId, ReparentMode, SessionToken,
    SizeMode, Tag, TapKind, TrackMode, TypeError, UserId,
};

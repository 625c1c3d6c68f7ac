//! Command-level error model.
//!
//! Two regimes share these types: during establishment every error is fatal
//! and closes the transport; after establishment each error drops exactly one
//! command instance and the stream continues. The split itself lives with the
//! session engine; this module only names what went wrong.

use std::fmt;

use crate::selector::SelectorError;
use crate::types::TypeError;

/// Why a single command instance was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No command with this name exists in either direction.
    UnknownCommand(String),
    /// The command exists but is not valid in the receiving direction.
    WrongDirection(String),
    /// A required argument was omitted (or present-but-empty).
    MissingArgument(&'static str),
    /// A typed argument failed to parse.
    BadArgument(&'static str, TypeError),
    /// A selector argument was malformed or used forbidden forms.
    BadSelector(&'static str, SelectorError),
    /// The variadic tail had the wrong shape (e.g. a partial triangle).
    BadTail(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownCommand(name) => write!(f, "unknown command {name:?}"),
            CommandError::WrongDirection(name) => {
                write!(f, "command {name:?} not valid in this direction")
            }
            CommandError::MissingArgument(param) => write!(f, "missing argument <{param}>"),
            CommandError::BadArgument(param, err) => write!(f, "argument <{param}>: {err}"),
            CommandError::BadSelector(param, err) => write!(f, "selector <{param}>: {err}"),
            CommandError::BadTail(what) => write!(f, "malformed tail: {what}"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Why an outbound line could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    InvalidName,
    InvalidParam,
    /// The encoded frame would exceed the wire's frame-size cap.
    TooLong(usize),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidName => write!(f, "invalid command name"),
            EncodeError::InvalidParam => write!(f, "invalid parameter"),
            EncodeError::TooLong(size) => {
                write!(f, "encoded frame is {size} bytes, over the frame cap")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

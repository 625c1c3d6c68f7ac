//! Incremental framer for the CRLF-terminated HackVR line protocol.
//!
//! Bytes are pushed in as they arrive from the transport; complete frames
//! (or framing violations) are pulled out in order. The framer never assumes
//! a single read delivers a full line: partial pushes are buffered until the
//! `CR LF` terminator shows up. After a violation it discards bytes until the
//! next `CR LF` boundary and resumes, so one bad line never poisons the rest
//! of the stream.

use std::collections::VecDeque;

/// Maximum frame size in bytes, including the `CR LF` terminator.
pub const MAX_FRAME_SIZE: usize = 1024;

/// One parsed frame: the command name plus its raw `HT`-separated arguments.
///
/// Arguments are untyped at this layer; typed parsing happens in
/// [`crate::command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub args: Vec<String>,
}

/// Why a line was rejected by the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameViolation {
    /// Frame exceeded [`MAX_FRAME_SIZE`] before a terminator arrived.
    Overlong,
    /// A `CR` appeared anywhere other than immediately before `LF`.
    StrayCr,
    /// The line was not valid UTF-8.
    InvalidUtf8,
    /// A forbidden `Cc`-category character appeared (only `HT` as the
    /// separator and `LF` inside arguments are allowed).
    ForbiddenControl,
    /// The command name slot was empty or contained control characters.
    InvalidName,
}

/// Output of the framer: either a complete frame or a recoverable violation.
///
/// During establishment the caller treats any violation as fatal; after
/// establishment violations are per-line and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Frame(Frame),
    Violation(FrameViolation),
}

/// Incremental push parser over the raw byte stream.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
    queue: VecDeque<FrameEvent>,
    overflowed: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw transport bytes into the framer.
    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(data);
        self.drain_buffer();
    }

    /// Pull the next frame or violation, in wire order.
    pub fn pull(&mut self) -> Option<FrameEvent> {
        self.queue.pop_front()
    }

    fn drain_buffer(&mut self) {
        loop {
            // An overlong frame is reported once, then bytes are discarded
            // until the next CR LF boundary. Only one line's worth of tail
            // is retained while hunting for the terminator.
            if self.buffer.len() > MAX_FRAME_SIZE && !self.overflowed {
                self.overflowed = true;
                self.queue
                    .push_back(FrameEvent::Violation(FrameViolation::Overlong));
            }
            if self.overflowed {
                match find_crlf(&self.buffer) {
                    Some(end) => {
                        self.buffer.drain(..end + 2);
                        self.overflowed = false;
                        continue;
                    }
                    None => {
                        if self.buffer.len() > MAX_FRAME_SIZE {
                            let excess = self.buffer.len() - MAX_FRAME_SIZE;
                            self.buffer.drain(..excess);
                        }
                        return;
                    }
                }
            }

            let Some(end) = find_crlf(&self.buffer) else {
                return;
            };

            let line: Vec<u8> = self.buffer.drain(..end + 2).take(end).collect();

            // Empty lines between terminators are skipped, not errors.
            if line.is_empty() {
                continue;
            }

            if let Some(event) = scan_line(&line) {
                self.queue.push_back(event);
            }
        }
    }
}

/// Validate one terminator-stripped line and turn it into a frame event.
///
/// Returns `None` only for lines that are silently skipped (never happens
/// today; empty lines are filtered earlier).
fn scan_line(line: &[u8]) -> Option<FrameEvent> {
    if line.contains(&b'\r') {
        return Some(FrameEvent::Violation(FrameViolation::StrayCr));
    }

    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(_) => return Some(FrameEvent::Violation(FrameViolation::InvalidUtf8)),
    };

    let mut parts = text.split('\t');
    let name = parts.next().unwrap_or("");
    if name.is_empty() || name.chars().any(char::is_control) {
        return Some(FrameEvent::Violation(FrameViolation::InvalidName));
    }

    let mut args = Vec::new();
    for part in parts {
        // LF may be carried inside an argument; every other Cc is forbidden.
        if part.chars().any(|ch| ch.is_control() && ch != '\n') {
            return Some(FrameEvent::Violation(FrameViolation::ForbiddenControl));
        }
        args.push(part.to_string());
    }

    Some(FrameEvent::Frame(Frame {
        name: name.to_string(),
        args,
    }))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

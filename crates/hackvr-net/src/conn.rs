//! A framed HackVR connection over any async byte stream.
//!
//! Wraps a transport stream with the incremental framer on the read side and
//! the line encoder on the write side. Reads are partial-read tolerant: the
//! framer buffers across reads and frames are pulled out as they complete.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use hackvr_protocol::{Frame, FrameEvent, Framer, MAX_FRAME_SIZE};
use hackvr_session::EstablishError;

const READ_CHUNK: usize = 4096;

/// Upper bound on an HTTP header block during establishment.
pub(crate) const MAX_HEADER_BLOCK: usize = MAX_FRAME_SIZE * 8;

/// A framed, bidirectional HackVR stream.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    framer: Framer,
    eof: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            framer: Framer::new(),
            eof: false,
        }
    }

    /// Seed the framer with bytes that were read past an HTTP header block.
    pub(crate) fn preload(&mut self, leftover: &[u8]) {
        self.framer.push(leftover);
    }

    /// Next frame or framing violation, or `None` once the peer closed and
    /// the buffer drained.
    pub async fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        loop {
            if let Some(event) = self.framer.pull() {
                return Ok(Some(event));
            }
            if self.eof {
                return Ok(None);
            }
            let mut buf = [0u8; READ_CHUNK];
            let n = self
                .stream
                .read(&mut buf)
                .await
                .context("transport read failed")?;
            if n == 0 {
                self.eof = true;
                continue;
            }
            self.framer.push(&buf[..n]);
        }
    }

    /// Next well-formed frame under the strict establishment regime: any
    /// framing violation, EOF, or timeout is fatal.
    pub async fn next_frame_strict(&mut self, timeout: Duration) -> Result<Frame, EstablishError> {
        let event = tokio::time::timeout(timeout, self.next_event())
            .await
            .map_err(|_| EstablishError::TimedOut)?
            .map_err(|_| EstablishError::Closed)?;
        match event {
            Some(FrameEvent::Frame(frame)) => Ok(frame),
            Some(FrameEvent::Violation(_)) => Err(EstablishError::Framing),
            None => Err(EstablishError::Closed),
        }
    }

    /// Write one pre-encoded line.
    pub async fn send(&mut self, line: &[u8]) -> Result<()> {
        self.stream
            .write_all(line)
            .await
            .context("transport write failed")?;
        self.stream.flush().await.context("transport flush failed")?;
        Ok(())
    }

    /// Read raw bytes until the HTTP header terminator, returning the header
    /// block and any bytes read past it (the start of the HackVR stream).
    pub(crate) async fn read_header_block(
        &mut self,
        timeout: Duration,
    ) -> Result<(String, Vec<u8>), EstablishError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = Vec::new();
        loop {
            if let Some(end) = find_terminator(&buf) {
                let block = String::from_utf8_lossy(&buf[..end + 4]).into_owned();
                let leftover = buf[end + 4..].to_vec();
                return Ok((block, leftover));
            }
            if buf.len() > MAX_HEADER_BLOCK {
                return Err(EstablishError::MalformedHttp("headers too large"));
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = tokio::time::timeout_at(deadline, self.stream.read(&mut chunk))
                .await
                .map_err(|_| EstablishError::TimedOut)?
                .map_err(|_| EstablishError::Closed)?;
            if n == 0 {
                return Err(EstablishError::Closed);
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read whatever body bytes arrive before EOF or the timeout; used to
    /// surface the debug body of a non-101 2xx upgrade response.
    pub(crate) async fn read_body_best_effort(&mut self, timeout: Duration) -> Vec<u8> {
        let mut body = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut chunk = [0u8; READ_CHUNK];
            match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => body.extend_from_slice(&chunk[..n]),
            }
        }
        body
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

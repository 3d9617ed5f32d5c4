// src/device/framer.rs
//! NMEA sentence framing over a raw device byte stream
//!
//! Receivers interleave noise, blank lines and multi-line bursts. A sentence
//! starts on a line beginning with `$` and ends either on a blank line or as
//! soon as the accumulated text carries a `*HH` checksum tail.

use std::{fmt, io};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    time::Instant,
};

/// Upper bound on a plausible sentence, terminators excluded
pub const MAX_SENTENCE_LEN: usize = 256;

/// Whitespace tolerated around a line before the length guard applies
const LINE_SLACK: usize = 4;

#[derive(Debug)]
pub enum FramingError {
    Timeout,
    TooLong(usize),
    /// End of stream, usually because the device went away
    Closed,
    Io(io::Error),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::Timeout => write!(f, "no complete sentence before deadline"),
            FramingError::TooLong(len) => write!(
                f,
                "message too long to be a GPS sentence ({} > {} bytes)",
                len, MAX_SENTENCE_LEN
            ),
            FramingError::Closed => write!(f, "device stream closed"),
            FramingError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for FramingError {}

enum Line {
    Text(Vec<u8>),
    /// Line exceeded the limit; holds the bytes read so far, rest unconsumed
    Overflow(Vec<u8>),
}

/// Reads one sentence at a time from an open device.
///
/// Buffered bytes survive between calls, so the same reader must be reused
/// for the lifetime of the handle.
pub struct SentenceReader<R> {
    inner: BufReader<R>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> SentenceReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_len: MAX_SENTENCE_LEN,
        }
    }

    /// Read the next complete sentence, giving up at `deadline`.
    ///
    /// A timed-out attempt never yields the text accumulated so far.
    pub async fn read_sentence(&mut self, deadline: Instant) -> Result<String, FramingError> {
        match tokio::time::timeout_at(deadline, self.frame()).await {
            Ok(result) => result,
            Err(_) => Err(FramingError::Timeout),
        }
    }

    async fn frame(&mut self) -> Result<String, FramingError> {
        let mut sentence = String::new();
        let mut started = false;

        loop {
            let limit = self.max_len.saturating_sub(sentence.len()) + LINE_SLACK;
            let line = match self.read_line(limit).await? {
                Line::Text(line) => line,
                Line::Overflow(head) => {
                    if started || head.trim_ascii_start().starts_with(b"$") {
                        return Err(FramingError::TooLong(sentence.len() + head.len()));
                    }
                    self.skip_line().await?;
                    continue;
                }
            };
            let trimmed = line.trim_ascii();

            if !started {
                // Noise and stray terminators before the first `$`
                if !trimmed.starts_with(b"$") {
                    continue;
                }
                started = true;
            } else if trimmed.is_empty() {
                return Ok(sentence);
            }

            sentence.push_str(&String::from_utf8_lossy(trimmed));

            let bytes = sentence.as_bytes();
            if bytes.len() >= 3 && bytes[bytes.len() - 3] == b'*' {
                return Ok(sentence);
            }

            if sentence.len() > self.max_len {
                return Err(FramingError::TooLong(sentence.len()));
            }
        }
    }

    /// Read up to and excluding the next `\n`, holding at most `limit` bytes
    async fn read_line(&mut self, limit: usize) -> Result<Line, FramingError> {
        let mut line = Vec::new();

        loop {
            let (consumed, done) = {
                let available = self.inner.fill_buf().await.map_err(FramingError::Io)?;
                if available.is_empty() {
                    return Err(FramingError::Closed);
                }

                let newline = available.iter().position(|&b| b == b'\n');
                let content = newline.unwrap_or(available.len());
                let room = limit.saturating_sub(line.len());

                if content > room {
                    line.extend_from_slice(&available[..room]);
                    (room, None)
                } else {
                    line.extend_from_slice(&available[..content]);
                    match newline {
                        Some(i) => (i + 1, Some(true)),
                        None => (content, Some(false)),
                    }
                }
            };
            self.inner.consume(consumed);

            match done {
                None => return Ok(Line::Overflow(line)),
                Some(true) => return Ok(Line::Text(line)),
                Some(false) => continue,
            }
        }
    }

    /// Discard the remainder of an overlong noise line
    async fn skip_line(&mut self) -> Result<(), FramingError> {
        loop {
            let (consumed, found) = {
                let available = self.inner.fill_buf().await.map_err(FramingError::Io)?;
                if available.is_empty() {
                    return Err(FramingError::Closed);
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(consumed);
            if found {
                return Ok(());
            }
        }
    }
}

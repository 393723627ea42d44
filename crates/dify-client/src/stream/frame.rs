use std::collections::VecDeque;
use std::fmt;

use futures::{Stream, StreamExt as _, stream};

use crate::errors::DifyError;

const DATA_PREFIX: &str = "data: ";

/// Splits raw bytes into newline-terminated lines across chunk boundaries.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to contain no newline.
    scanned: usize,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8], lines: &mut VecDeque<String>) {
        self.buf.extend_from_slice(chunk);
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buf[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            lines.push_back(String::from_utf8_lossy(&self.buf[start..end]).into_owned());
            start = end + 1;
            from = start;
        }
        if start > 0 {
            self.buf.drain(..start);
        }
        self.scanned = self.buf.len();
    }

    /// Returns the unterminated tail left at end of input.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(tail)
    }
}

/// Extracts the JSON payload of a `data: ` line.
///
/// Blank lines, comments and every other SSE field yield `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.strip_prefix(DATA_PREFIX)
}

/// Reads SSE `data: ` payloads from a byte stream, one per call.
///
/// The underlying stream is polled only when no complete line is buffered,
/// so nothing is read past the frame the caller is currently handling.
pub struct FrameReader<S> {
    bytes: S,
    decoder: LineDecoder,
    lines: VecDeque<String>,
    done: bool,
}

impl<S, B, E> FrameReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    pub fn new(bytes: S) -> Self {
        Self {
            bytes,
            decoder: LineDecoder::default(),
            lines: VecDeque::new(),
            done: false,
        }
    }

    /// Returns the next payload, `Ok(None)` at end of input, or a
    /// `StreamRead` error when the transport fails.
    pub async fn next_frame(&mut self) -> Result<Option<String>, DifyError> {
        loop {
            while let Some(line) = self.lines.pop_front() {
                if let Some(payload) = data_payload(&line) {
                    return Ok(Some(payload.to_string()));
                }
            }
            if self.done {
                return Ok(None);
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self.decoder.push_chunk(chunk.as_ref(), &mut self.lines),
                Some(Err(e)) => {
                    self.done = true;
                    return Err(DifyError::StreamRead(e.to_string()));
                }
                None => {
                    self.done = true;
                    if let Some(tail) = self.decoder.finish() {
                        self.lines.push_back(tail);
                    }
                }
            }
        }
    }

    /// Turns the reader into a stream of payloads that ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, DifyError>> {
        stream::try_unfold(self, |mut reader| async move {
            Ok(reader.next_frame().await?.map(|frame| (frame, reader)))
        })
    }
}

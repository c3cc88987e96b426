//! Protocol line framing
//!
//! The EBB firmware answers with ASCII lines terminated by `\r\n`, `\n`,
//! or `\r`, but the transports deliver those bytes in arbitrary chunks:
//! per-notification for BLE, per-frame for WebSocket, per-read for
//! serial. [`LineFramer`] turns any chunking of the same byte stream
//! into the same sequence of protocol lines, and [`Utf8StreamDecoder`]
//! turns raw byte chunks into text chunks without corrupting multi-byte
//! sequences split across chunk boundaries.

/// Accumulates text fragments and yields complete protocol lines.
///
/// Invariant: after every [`consume`](Self::consume) call the internal
/// buffer holds no complete line, only the unterminated tail of the
/// most recent chunk.
#[derive(Debug, Default)]
pub struct LineFramer {
    tail: String,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text fragment, returning every complete line it closes.
    ///
    /// Lines are split on `\r\n`, `\n`, or `\r`, trimmed, and dropped
    /// when empty after trimming. The final unterminated segment is
    /// retained as the new buffer tail and never emitted.
    pub fn consume(&mut self, chunk: &str) -> Vec<String> {
        self.tail.push_str(chunk);

        let buffer = std::mem::take(&mut self.tail);
        let mut rest = buffer.as_str();
        let mut lines = Vec::new();

        while let Some(pos) = rest.find(['\r', '\n']) {
            let (raw, remainder) = rest.split_at(pos);
            let line = raw.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            rest = if remainder.starts_with("\r\n") {
                &remainder[2..]
            } else {
                &remainder[1..]
            };
        }

        self.tail = rest.to_string();
        lines
    }

    /// Discard any buffered tail. Used by the disconnect sweep.
    pub fn clear(&mut self) {
        self.tail.clear();
    }
}

/// Streaming UTF-8 decoder for byte-oriented transports.
///
/// BLE notifications and binary WebSocket frames can split a multi-byte
/// UTF-8 sequence at any byte boundary. Incomplete trailing sequences
/// are carried into the next call; bytes that can never form a valid
/// sequence are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    carry: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a byte chunk into as much text as is currently complete.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.carry.clear();
                    break;
                }
                Err(err) => {
                    let valid_len = err.valid_up_to();
                    out.push_str(
                        std::str::from_utf8(&self.carry[..valid_len]).unwrap_or_default(),
                    );
                    match err.error_len() {
                        // Incomplete trailing sequence: keep it for the next chunk.
                        None => {
                            self.carry.drain(..valid_len);
                            break;
                        }
                        // Genuinely invalid bytes: replace and keep scanning.
                        Some(bad_len) => {
                            out.push('\u{FFFD}');
                            self.carry.drain(..valid_len + bad_len);
                        }
                    }
                }
            }
        }
        out
    }

    /// Discard any carried bytes. Used by the disconnect sweep.
    pub fn clear(&mut self) {
        self.carry.clear();
    }
}

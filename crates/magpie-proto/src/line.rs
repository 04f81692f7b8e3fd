//! Line-based codec for tokio.
//!
//! This module turns an arbitrary sequence of byte chunks into complete
//! protocol lines, buffering any trailing partial line across reads.
//! Lines are terminated by `\r\n` or bare `\n`; the terminator is
//! stripped from the yielded line.
//!
//! Decoding never fails: bytes are tried as strict UTF-8 first, then
//! through a chain of single-byte fallback encodings, and as a last
//! resort decoded lossily with undecodable bytes replaced. The worst
//! case is logged as a recoverable event so the read loop never stalls
//! on malformed input.

use bytes::BytesMut;
use encoding::Encoding;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::error;

/// Decode raw line bytes through the fallback chain: strict UTF-8
/// first, then the single-byte fallbacks, then lossy UTF-8.
///
/// WINDOWS_1252 subsumes the latin1/iso-8859-1 labels in the WHATWG
/// encoding registry, which matches what legacy IRC clients actually
/// send.
fn decode_lossy(raw: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(raw) {
        return text.to_owned();
    }

    let fallbacks: [&Encoding; 1] = [encoding::WINDOWS_1252];
    for enc in fallbacks {
        if let Some(text) = enc.decode_without_bom_handling_and_without_replacement(raw) {
            debug!(encoding = enc.name(), "decoded line with fallback encoding");
            return text.into_owned();
        }
    }

    warn!("could not decode line with any known encoding; dropping undecodable bytes");
    String::from_utf8_lossy(raw).into_owned()
}

/// Line-based codec that handles newline-terminated messages.
///
/// By default, lines are limited to 512 bytes (IRC standard). Over-long
/// lines are skipped with a warning rather than failing the stream.
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
    /// Set while skipping the remainder of an over-long line
    discarding: bool,
}

impl LineCodec {
    /// Create a new codec with the default 512-byte line limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: 512,
            discarding: false,
        }
    }

    /// Create a new codec with a custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            ..Self::new()
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        loop {
            // Look for a newline starting from where we left off
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if self.discarding {
                    // Still inside an over-long line; keep memory bounded.
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }

                // No complete line yet - remember where we stopped
                self.next_index = src.len();

                // A partial line already over the limit can never become
                // a valid line; drop it and skip to the next terminator.
                if src.len() > self.max_len {
                    warn!(
                        buffered = src.len(),
                        limit = self.max_len,
                        "partial line exceeds limit; discarding until next terminator"
                    );
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                }

                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if self.discarding {
                // Tail of a line we already gave up on
                self.discarding = false;
                continue;
            }

            if line.len() > self.max_len {
                warn!(
                    actual = line.len(),
                    limit = self.max_len,
                    "skipping over-long line"
                );
                continue;
            }

            let mut text = decode_lossy(&line);
            text.truncate(text.trim_end_matches(&['\r', '\n'][..]).len());
            return Ok(Some(text));
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> error::Result<()> {
        if msg.len() > self.max_len {
            return Err(error::ProtocolError::MessageTooLong {
                actual: msg.len(),
                limit: self.max_len,
            });
        }
        dst.extend(msg.into_bytes());
        Ok(())
    }
}

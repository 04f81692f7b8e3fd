//! IRC message codec for tokio.
//!
//! Wraps [`LineCodec`] and parses lines into [`Message`] values.
//! Whitespace-only lines and lines that fail to parse are dropped here
//! with a log entry; the stream itself never errors on malformed
//! input.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error;
use crate::line::LineCodec;
use crate::message::Message;

/// Tokio codec for encoding/decoding IRC messages.
#[derive(Default)]
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Create a new codec with the default line limit.
    pub fn new() -> Self {
        Self {
            inner: LineCodec::new(),
        }
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        loop {
            match self.inner.decode(src)? {
                Some(line) => match Message::parse(&line) {
                    Some(msg) => return Ok(Some(msg)),
                    None => {
                        if !line.trim().is_empty() {
                            debug!(line = %line, "dropping unparseable line");
                        }
                        continue;
                    }
                },
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        self.inner.encode(format!("{}\r\n", msg), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n");

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["test"]);
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("\r\n   \r\nPING :test\r\n");

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_appends_terminator() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(Message::pong("test"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG test\r\n");
    }
}

//! # magpie-proto
//!
//! Protocol support for the Magpie IRC bot: line framing with an
//! encoding fallback chain, message parsing and serialization, CTCP
//! helpers, the SASL PLAIN handshake, and a tokio transport over TCP
//! or TLS.
//!
//! ## Quick Start
//!
//! ```rust
//! use magpie_proto::Message;
//!
//! // Parse a message
//! let msg = Message::parse(":nick!user@host PRIVMSG #channel :Hello!").unwrap();
//! assert_eq!(msg.source_nick(), Some("nick"));
//!
//! // Construct a message
//! let reply = Message::privmsg("#channel", "Hello yourself!");
//! assert_eq!(reply.to_string(), "PRIVMSG #channel :Hello yourself!");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod chan;
pub mod ctcp;
pub mod error;
pub mod irc;
pub mod line;
pub mod message;
pub mod sasl;
pub mod transport;

pub use self::chan::ChannelExt;
pub use self::ctcp::{Ctcp, CtcpKind};
pub use self::error::ProtocolError;
pub use self::irc::IrcCodec;
pub use self::line::LineCodec;
pub use self::message::Message;
pub use self::sasl::{encode_plain, SaslPhase, SaslSession, SASL_CHUNK_SIZE};
pub use self::transport::{Transport, MAX_IRC_LINE_LEN};

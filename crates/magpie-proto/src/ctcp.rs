//! CTCP (Client-to-Client Protocol) message handling.
//!
//! CTCP queries are embedded within PRIVMSG and NOTICE payloads using
//! the `\x01` delimiter character. The bot answers VERSION and emits
//! ACTION; everything else parses as [`CtcpKind::Unknown`] and is left
//! to the caller.
//!
//! # Example
//!
//! ```
//! use magpie_proto::ctcp::{Ctcp, CtcpKind};
//!
//! let ctcp = Ctcp::parse("\x01VERSION\x01").unwrap();
//! assert_eq!(ctcp.kind, CtcpKind::Version);
//! assert_eq!(ctcp.params, None);
//!
//! let action = Ctcp::action("waves");
//! assert_eq!(action.to_string(), "\x01ACTION waves\x01");
//! ```

use std::fmt;

/// The CTCP delimiter character (`\x01`).
const CTCP_DELIM: char = '\x01';

/// Known CTCP command types.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CtcpKind {
    /// ACTION - describes an action performed by the user (`/me`).
    Action,
    /// VERSION - requests client version information.
    Version,
    /// PING - measures round-trip latency.
    Ping,
    /// Unknown or custom CTCP command.
    Unknown(String),
}

impl CtcpKind {
    /// Parse a CTCP command name into a `CtcpKind`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "ACTION" => Self::Action,
            "VERSION" => Self::Version,
            "PING" => Self::Ping,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Returns the canonical uppercase name of this CTCP command.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "ACTION",
            Self::Version => "VERSION",
            Self::Ping => "PING",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for CtcpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed CTCP message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// The CTCP command type.
    pub kind: CtcpKind,
    /// Optional parameters following the command.
    pub params: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Parse a CTCP message from a PRIVMSG/NOTICE body.
    ///
    /// Returns `None` if the message is not a CTCP message. A missing
    /// closing delimiter is tolerated, as many clients omit it.
    pub fn parse(text: &'a str) -> Option<Self> {
        let inner = text.strip_prefix(CTCP_DELIM)?;
        let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
        if inner.is_empty() {
            return None;
        }

        let (name, params) = match inner.split_once(' ') {
            Some((name, rest)) => (name, (!rest.is_empty()).then_some(rest)),
            None => (inner, None),
        };

        Some(Ctcp {
            kind: CtcpKind::parse(name),
            params,
        })
    }

    /// Create a VERSION reply carrying a version string.
    pub fn version(version: &'a str) -> Self {
        Ctcp {
            kind: CtcpKind::Version,
            params: Some(version),
        }
    }

    /// Create an ACTION message.
    pub fn action(text: &'a str) -> Self {
        Ctcp {
            kind: CtcpKind::Action,
            params: Some(text),
        }
    }
}

impl fmt::Display for Ctcp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params {
            Some(params) => write!(f, "{}{} {}{}", CTCP_DELIM, self.kind, params, CTCP_DELIM),
            None => write!(f, "{}{}{}", CTCP_DELIM, self.kind, CTCP_DELIM),
        }
    }
}

//! IRC message parsing and serialization.
//!
//! A [`Message`] is the structured form of one protocol line: an
//! optional source (the `:prefix` on the wire), a command (verb or
//! three-digit numeric), and the positional arguments with at most one
//! trailing multi-word argument.
//!
//! # Example
//!
//! ```
//! use magpie_proto::Message;
//!
//! let msg = Message::parse(":alice!u@h PRIVMSG #chan :hello there").unwrap();
//! assert_eq!(msg.source_nick(), Some("alice"));
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.args, vec!["#chan", "hello there"]);
//! ```

use std::fmt;

/// An owned IRC message.
///
/// `args` preserves protocol order; the trailing parameter (prefixed by
/// `:` on the wire) is stored as the last element and never re-split.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// Message source (`nick!user@host` or a server name), if present.
    pub source: Option<String>,
    /// The command verb or three-digit numeric.
    pub command: String,
    /// Positional arguments, trailing argument last.
    pub args: Vec<String>,
}

impl Message {
    /// Create a message from a command and its arguments.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Message {
            source: None,
            command: command.into(),
            args,
        }
    }

    /// Parse one raw line into a message.
    ///
    /// Returns `None` for empty or whitespace-only lines and for lines
    /// that carry a source but no command. Malformed input never
    /// produces an error; the caller drops `None` and continues.
    pub fn parse(line: &str) -> Option<Message> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (source, command_index) = match parts.first()? {
            token if token.starts_with(':') => (Some(token[1..].to_string()), 1),
            _ => (None, 0),
        };
        let command = parts.get(command_index)?.to_string();

        let mut args = Vec::new();
        for (i, part) in parts.iter().enumerate().skip(command_index + 1) {
            if let Some(stripped) = part.strip_prefix(':') {
                // Trailing argument: this token and everything after it,
                // rejoined with single spaces.
                let mut trailing = stripped.to_string();
                for rest in &parts[i + 1..] {
                    trailing.push(' ');
                    trailing.push_str(rest);
                }
                args.push(trailing);
                break;
            }
            args.push((*part).to_string());
        }

        Some(Message {
            source,
            command,
            args,
        })
    }

    /// Get the nickname from the message source, if present.
    ///
    /// For a `nick!user@host` source this is the text before the `!`;
    /// for a bare server name it is the whole source.
    pub fn source_nick(&self) -> Option<&str> {
        self.source
            .as_deref()
            .and_then(|s| s.split('!').next())
            .filter(|s| !s.is_empty())
    }

    /// Attach a source to this message.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Create a PRIVMSG to a target with text.
    #[must_use]
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("PRIVMSG", vec![target.into(), text.into()])
    }

    /// Create a NOTICE to a target with text.
    #[must_use]
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("NOTICE", vec![target.into(), text.into()])
    }

    /// Create a JOIN message for a channel.
    #[must_use]
    pub fn join(channel: impl Into<String>) -> Self {
        Message::new("JOIN", vec![channel.into()])
    }

    /// Create a PART message for a channel.
    #[must_use]
    pub fn part(channel: impl Into<String>) -> Self {
        Message::new("PART", vec![channel.into()])
    }

    /// Create a NICK message.
    #[must_use]
    pub fn nick(nickname: impl Into<String>) -> Self {
        Message::new("NICK", vec![nickname.into()])
    }

    /// Create a USER registration message.
    #[must_use]
    pub fn user(ident: impl Into<String>, realname: impl Into<String>) -> Self {
        Message::new(
            "USER",
            vec![ident.into(), "*".into(), "*".into(), realname.into()],
        )
    }

    /// Create a PING with a token.
    #[must_use]
    pub fn ping(token: impl Into<String>) -> Self {
        Message::new("PING", vec![token.into()])
    }

    /// Create a PONG echoing a challenge token.
    #[must_use]
    pub fn pong(token: impl Into<String>) -> Self {
        Message::new("PONG", vec![token.into()])
    }

    /// Create a QUIT with a parting message.
    #[must_use]
    pub fn quit(reason: impl Into<String>) -> Self {
        Message::new("QUIT", vec![reason.into()])
    }

    /// Create a `CAP LS 302` capability-listing request.
    #[must_use]
    pub fn cap_ls() -> Self {
        Message::new("CAP", vec!["LS".into(), "302".into()])
    }

    /// Create a `CAP REQ` for a capability.
    #[must_use]
    pub fn cap_req(capability: impl Into<String>) -> Self {
        Message::new("CAP", vec!["REQ".into(), capability.into()])
    }

    /// Create a `CAP END` to finish capability negotiation.
    #[must_use]
    pub fn cap_end() -> Self {
        Message::new("CAP", vec!["END".into()])
    }

    /// Create an AUTHENTICATE message with a payload chunk.
    #[must_use]
    pub fn authenticate(payload: impl Into<String>) -> Self {
        Message::new("AUTHENTICATE", vec![payload.into()])
    }
}

/// Serialize back to wire form (without the line terminator).
///
/// The last argument is written as a trailing parameter when it needs
/// to be: when it contains a space, is empty, or starts with `:`.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, ":{} ", source)?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.args.split_last() {
            for arg in middle {
                write!(f, " {}", arg)?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_ping() {
        let msg = Message::parse("PING :serverhost").unwrap();
        assert_eq!(msg.source, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["serverhost"]);
    }

    #[test]
    fn test_parse_privmsg_with_source() {
        let msg = Message::parse(":alice!u@h PRIVMSG #chan :&ping").unwrap();
        assert_eq!(msg.source.as_deref(), Some("alice!u@h"));
        assert_eq!(msg.source_nick(), Some("alice"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.args, vec!["#chan", "&ping"]);
    }

    #[test]
    fn test_parse_trailing_preserved() {
        let msg = Message::parse("PRIVMSG #c :one two  three").unwrap();
        // Trailing tokens rejoined with single spaces, never re-split.
        assert_eq!(msg.args, vec!["#c", "one two three"]);
    }

    #[test]
    fn test_parse_middle_args_before_trailing() {
        let msg = Message::parse(":server 001 magpie :Welcome to IRC").unwrap();
        assert_eq!(msg.source.as_deref(), Some("server"));
        assert_eq!(msg.command, "001");
        assert_eq!(msg.args, vec!["magpie", "Welcome to IRC"]);
    }

    #[test]
    fn test_parse_empty_and_whitespace() {
        assert_eq!(Message::parse(""), None);
        assert_eq!(Message::parse("   "), None);
    }

    #[test]
    fn test_parse_source_without_command() {
        assert_eq!(Message::parse(":lonely"), None);
    }

    #[test]
    fn test_parse_colon_inside_trailing() {
        let msg = Message::parse("PRIVMSG #c :see: this").unwrap();
        assert_eq!(msg.args, vec!["#c", "see: this"]);
    }

    #[test]
    fn test_source_nick_server_name() {
        let msg = Message::parse(":irc.example.net NOTICE * :hi").unwrap();
        assert_eq!(msg.source_nick(), Some("irc.example.net"));
    }

    #[test]
    fn test_display_trailing_with_spaces() {
        let msg = Message::privmsg("#chan", "alice: Pong!");
        assert_eq!(msg.to_string(), "PRIVMSG #chan :alice: Pong!");
    }

    #[test]
    fn test_display_single_word_arg() {
        let msg = Message::join("#chan");
        assert_eq!(msg.to_string(), "JOIN #chan");
    }

    #[test]
    fn test_display_user_registration() {
        let msg = Message::user("magpie", "Magpie Bot");
        assert_eq!(msg.to_string(), "USER magpie * * :Magpie Bot");
    }

    #[test]
    fn test_round_trip_stability() {
        let lines = [
            ":alice!u@h PRIVMSG #chan :hello there",
            "PING :serverhost",
            ":server 001 magpie :Welcome to the network",
            "JOIN #chan",
            "CAP REQ :sasl",
            "AUTHENTICATE +",
            ":bob!b@h PRIVMSG magpie ::)",
        ];
        for line in lines {
            let parsed = Message::parse(line).unwrap();
            let reparsed = Message::parse(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "round trip for {:?}", line);
        }
    }
}

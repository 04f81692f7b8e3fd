//! SASL authentication for IRC clients.
//!
//! [`SaslSession`] is a sans-IO state machine driving the PLAIN
//! handshake: capability request, mechanism selection, credential
//! exchange, and the success/failure numerics. It consumes parsed
//! messages and produces the messages to send; the caller owns all
//! actual I/O.
//!
//! The session is fail-open: on any of the failure numerics it logs
//! and still emits `CAP END` so registration proceeds without
//! authentication rather than hanging forever.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, error};

use crate::message::Message;

/// Maximum length of a single SASL message chunk (400 bytes).
///
/// Responses longer than this must be split across multiple
/// AUTHENTICATE commands, with a final `+` when the payload is an
/// exact multiple of the chunk size.
pub const SASL_CHUNK_SIZE: usize = 400;

/// Numeric reply for successful SASL authentication.
pub const RPL_SASLSUCCESS: &str = "903";

/// Numeric replies indicating SASL failure.
pub const ERR_SASL_FAILURES: [&str; 4] = ["904", "905", "906", "907"];

/// Encode credentials for the PLAIN mechanism.
///
/// The PLAIN mechanism encodes `authzid NUL authcid NUL password`;
/// for IRC the authzid is empty.
pub fn encode_plain(username: &str, password: &str) -> String {
    let payload = format!("\0{}\0{}", username, password);
    BASE64.encode(payload.as_bytes())
}

/// Split an encoded SASL response into transmission chunks.
pub fn chunk_response(encoded: &str) -> impl Iterator<Item = &str> {
    encoded.as_bytes().chunks(SASL_CHUNK_SIZE).map(|chunk| {
        // base64 output is always ASCII
        std::str::from_utf8(chunk).unwrap()
    })
}

/// Phase of the SASL handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaslPhase {
    /// Created, nothing sent yet.
    Idle,
    /// Sent `CAP REQ :sasl`, awaiting acknowledgement.
    CapRequested,
    /// Server acknowledged; sent `AUTHENTICATE <mechanism>`, awaiting
    /// the continuation prompt.
    AckReceived,
    /// Credentials sent, awaiting the success/failure numeric.
    CredentialsSent,
    /// Authentication succeeded.
    Done,
    /// Authentication failed; registration proceeds unauthenticated.
    Failed,
}

impl SaslPhase {
    /// Check whether the handshake has reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// State machine for one SASL PLAIN authentication attempt.
///
/// Created when capability negotiation begins and discarded on
/// success, failure, or connection loss; a new connection gets a new
/// session.
#[derive(Clone, Debug)]
pub struct SaslSession {
    mechanism: String,
    phase: SaslPhase,
    username: String,
    password: String,
}

impl SaslSession {
    /// Create a new session for the given account credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        SaslSession {
            mechanism: "PLAIN".to_string(),
            phase: SaslPhase::Idle,
            username: username.into(),
            password: password.into(),
        }
    }

    /// The negotiated mechanism name.
    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    /// Current handshake phase.
    pub fn phase(&self) -> &SaslPhase {
        &self.phase
    }

    /// Start the handshake, producing the capability request to send.
    ///
    /// Only valid from [`SaslPhase::Idle`]; calling it again returns
    /// nothing.
    pub fn begin(&mut self) -> Option<Message> {
        if self.phase != SaslPhase::Idle {
            return None;
        }
        self.phase = SaslPhase::CapRequested;
        Some(Message::cap_req("sasl"))
    }

    /// Feed one server message into the handshake.
    ///
    /// Returns the messages to send in response. Messages outside the
    /// expected continuation/success/failure set leave the phase
    /// unchanged and produce nothing.
    pub fn feed(&mut self, msg: &Message) -> Vec<Message> {
        match msg.command.as_str() {
            "CAP" => self.on_cap(msg),
            "AUTHENTICATE" => self.on_authenticate(msg),
            RPL_SASLSUCCESS => self.on_success(),
            numeric if ERR_SASL_FAILURES.contains(&numeric) => self.on_failure(numeric),
            other => {
                if self.phase == SaslPhase::CredentialsSent {
                    debug!(command = %other, "ignoring message during pending authentication");
                }
                Vec::new()
            }
        }
    }

    fn on_cap(&mut self, msg: &Message) -> Vec<Message> {
        // CAP replies look like: <target> ACK :sasl
        let subcommand = msg.args.get(1).map(String::as_str);
        let caps = msg.args.get(2).map(String::as_str).unwrap_or("");
        let names_sasl = caps
            .split_whitespace()
            .any(|c| c.eq_ignore_ascii_case("sasl"));

        match subcommand {
            Some("ACK") if names_sasl && self.phase == SaslPhase::CapRequested => {
                self.phase = SaslPhase::AckReceived;
                vec![Message::authenticate(self.mechanism.clone())]
            }
            Some("NAK") if names_sasl && self.phase == SaslPhase::CapRequested => {
                error!("server refused the sasl capability; continuing unauthenticated");
                self.phase = SaslPhase::Failed;
                vec![Message::cap_end()]
            }
            _ => {
                debug!(args = ?msg.args, "ignoring CAP message");
                Vec::new()
            }
        }
    }

    fn on_authenticate(&mut self, msg: &Message) -> Vec<Message> {
        if self.phase != SaslPhase::AckReceived || msg.args.first().map(String::as_str) != Some("+")
        {
            debug!(args = ?msg.args, phase = ?self.phase, "ignoring AUTHENTICATE message");
            return Vec::new();
        }

        self.phase = SaslPhase::CredentialsSent;
        let encoded = encode_plain(&self.username, &self.password);
        let mut out: Vec<Message> = chunk_response(&encoded).map(Message::authenticate).collect();
        if encoded.len() % SASL_CHUNK_SIZE == 0 {
            // An exact multiple (including the empty payload) needs a
            // terminating `+` so the server knows we are done.
            out.push(Message::authenticate("+"));
        }
        out
    }

    fn on_success(&mut self) -> Vec<Message> {
        if self.phase != SaslPhase::CredentialsSent {
            debug!(phase = ?self.phase, "ignoring 903 outside credential exchange");
            return Vec::new();
        }
        self.phase = SaslPhase::Done;
        vec![Message::cap_end()]
    }

    fn on_failure(&mut self, numeric: &str) -> Vec<Message> {
        if self.phase != SaslPhase::CredentialsSent {
            debug!(numeric = %numeric, phase = ?self.phase, "ignoring SASL failure numeric outside credential exchange");
            return Vec::new();
        }
        error!(numeric = %numeric, "SASL authentication failed; continuing unauthenticated");
        self.phase = SaslPhase::Failed;
        vec![Message::cap_end()]
    }
}

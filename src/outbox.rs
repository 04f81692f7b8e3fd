//! Outgoing message queue.
//!
//! The dispatcher, the command router, plugins, and the keepalive task
//! all produce messages through an [`Outbox`]; the connection loop
//! drains the queue and writes to the transport. The queue is
//! unbounded because the protocol is low-volume by design and the
//! producer and consumer can share one task.

use magpie_proto::{Ctcp, Message};
use tokio::sync::mpsc;

use crate::error::{BotError, Result};

/// Cloneable sending handle for the outgoing queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbox {
    /// Create an outbox and the receiver the connection loop drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for sending.
    ///
    /// Fails only when the connection loop is gone, which means the
    /// connection is dead.
    pub fn send(&self, msg: Message) -> Result<()> {
        self.tx.send(msg).map_err(|_| BotError::ConnectionClosed)
    }

    /// Queue a PRIVMSG.
    pub fn privmsg(&self, target: &str, text: impl Into<String>) -> Result<()> {
        self.send(Message::privmsg(target, text.into()))
    }

    /// Queue a NOTICE.
    pub fn notice(&self, target: &str, text: impl Into<String>) -> Result<()> {
        self.send(Message::notice(target, text.into()))
    }

    /// Queue a CTCP ACTION (`/me`).
    pub fn action(&self, target: &str, text: &str) -> Result<()> {
        self.privmsg(target, Ctcp::action(text).to_string())
    }
}

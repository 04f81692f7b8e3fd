//! Command routing for `&`-prefixed chat commands.
//!
//! Resolution is linear and deterministic: the fixed built-in table is
//! tried first (case-insensitively), then each plugin in registration
//! order; the first plugin that reports success wins. If nobody
//! handles the command, the requester gets a notice.

use magpie_proto::ChannelExt;
use tracing::warn;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::outbox::Outbox;
use crate::plugins::{PluginContext, PluginHost};

/// The fixed set of built-in commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Version,
    Ping,
    Join,
    Part,
}

impl Builtin {
    /// Resolve a command name against the built-in table.
    pub fn resolve(name: &str) -> Option<Builtin> {
        match name.to_ascii_lowercase().as_str() {
            "help" => Some(Builtin::Help),
            "version" => Some(Builtin::Version),
            "ping" => Some(Builtin::Ping),
            "join" => Some(Builtin::Join),
            "part" => Some(Builtin::Part),
            _ => None,
        }
    }
}

/// Route one command and report whether anything handled it.
///
/// `target` is where the command was spoken; replies go back there for
/// channels and to the sender for private messages.
#[allow(clippy::too_many_arguments)]
pub async fn route(
    out: &Outbox,
    db: &Database,
    config: &Config,
    plugins: &mut PluginHost,
    nick: &str,
    target: &str,
    name: &str,
    args: &[String],
) -> Result<bool> {
    let reply_to = if target.is_channel_name() { target } else { nick };

    let Some(builtin) = Builtin::resolve(name) else {
        let ctx = PluginContext { out, db, config };
        if plugins.dispatch_command(&ctx, nick, target, name, args).await {
            return Ok(true);
        }
        out.notice(nick, format!("Unknown command: {}", name))?;
        return Ok(false);
    };

    match builtin {
        Builtin::Help => {
            out.privmsg(
                reply_to,
                format!("{}: Available commands: help, version, ping, join, part", nick),
            )?;
        }
        Builtin::Version => {
            out.privmsg(reply_to, format!("{}: magpie v{}", nick, config.version))?;
        }
        Builtin::Ping => {
            out.privmsg(reply_to, format!("{}: Pong!", nick))?;
        }
        Builtin::Join => match args.first() {
            Some(channel) if channel.is_channel_name() => {
                out.send(magpie_proto::Message::join(channel.clone()))?;
                if let Err(e) = db.channels().save(channel).await {
                    warn!(channel = %channel, error = %e, "failed to persist channel");
                }
                out.privmsg(reply_to, format!("{}: Joined {}", nick, channel))?;
            }
            _ => {
                out.privmsg(reply_to, format!("{}: Invalid channel name", nick))?;
            }
        },
        Builtin::Part => {
            let channel = args.first().map(String::as_str).unwrap_or(target);
            if channel.is_channel_name() {
                out.send(magpie_proto::Message::part(channel))?;
                if let Err(e) = db.channels().remove(channel).await {
                    warn!(channel = %channel, error = %e, "failed to remove persisted channel");
                }
                if channel != target {
                    out.privmsg(reply_to, format!("{}: Left {}", nick, channel))?;
                }
            } else {
                out.privmsg(reply_to, format!("{}: Invalid channel name", nick))?;
            }
        }
    }

    Ok(true)
}

//! Central message dispatch.
//!
//! The dispatcher consumes parsed messages one at a time, in framer
//! order, updates the connection state, drives the SASL session,
//! resolves built-in control verbs, and forwards chat events to the
//! command router and plugin host. Unrecognized commands are logged
//! and ignored for forward compatibility.

use std::sync::Arc;

use magpie_proto::{Ctcp, CtcpKind, Message, SaslPhase, SaslSession};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::outbox::Outbox;
use crate::plugins::{PluginContext, PluginHost};
use crate::router;
use crate::state::ConnectionState;

/// The finite set of control verbs the engine acts on.
///
/// Everything else passes through to the debug log. Keeping the table
/// explicit makes the recognized set enumerable and testable in
/// isolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlVerb {
    /// Capability negotiation replies.
    Cap,
    /// Server liveness probe.
    Ping,
    /// SASL continuation prompt.
    Authenticate,
    /// Chat message.
    Privmsg,
    /// Channel invitation.
    Invite,
    /// Version query sent as a bare command.
    Version,
    /// Registration complete (001).
    Welcome,
    /// SASL success numeric (903).
    SaslSuccess,
    /// SASL failure numerics (904-907).
    SaslFailure,
    /// Server-side fatal error; forces a reconnect.
    ServerError,
}

impl ControlVerb {
    /// Classify a command string against the dispatch table.
    pub fn classify(command: &str) -> Option<ControlVerb> {
        match command {
            "CAP" => Some(ControlVerb::Cap),
            "PING" => Some(ControlVerb::Ping),
            "AUTHENTICATE" => Some(ControlVerb::Authenticate),
            "PRIVMSG" => Some(ControlVerb::Privmsg),
            "INVITE" => Some(ControlVerb::Invite),
            "VERSION" => Some(ControlVerb::Version),
            "001" => Some(ControlVerb::Welcome),
            "903" => Some(ControlVerb::SaslSuccess),
            "904" | "905" | "906" | "907" => Some(ControlVerb::SaslFailure),
            "ERROR" => Some(ControlVerb::ServerError),
            _ => None,
        }
    }
}

/// Per-connection dispatcher.
///
/// Created when a transport comes up and dropped with it; the SASL
/// session dies with the dispatcher, never resumed across connections.
pub struct Dispatcher<'a> {
    config: Arc<Config>,
    db: Database,
    plugins: &'a mut PluginHost,
    out: Outbox,
    sasl: Option<SaslSession>,
    state: ConnectionState,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher for a freshly opened connection.
    pub fn new(
        config: Arc<Config>,
        db: Database,
        plugins: &'a mut PluginHost,
        out: Outbox,
    ) -> Self {
        Dispatcher {
            config,
            db,
            plugins,
            out,
            sasl: None,
            state: ConnectionState::Connecting,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Queue the registration commands for a new connection.
    ///
    /// Capability negotiation is only opened when the configuration
    /// opts into authentication.
    pub fn start_registration(&mut self) -> Result<()> {
        let conn = &self.config.connection;
        if self.config.sasl.enabled {
            self.out.send(Message::cap_ls())?;
        }
        self.out.send(Message::nick(&conn.nick))?;
        self.out.send(Message::user(&conn.ident, &conn.realname))?;

        if self.config.sasl.enabled {
            let mut session =
                SaslSession::new(&self.config.sasl.username, &self.config.sasl.password);
            if let Some(req) = session.begin() {
                self.out.send(req)?;
            }
            self.sasl = Some(session);
        }

        self.state = ConnectionState::Registering;
        Ok(())
    }

    /// Handle one incoming message.
    pub async fn dispatch(&mut self, msg: Message) -> Result<()> {
        match ControlVerb::classify(&msg.command) {
            Some(ControlVerb::Cap)
            | Some(ControlVerb::Authenticate)
            | Some(ControlVerb::SaslSuccess)
            | Some(ControlVerb::SaslFailure) => self.drive_sasl(&msg)?,
            Some(ControlVerb::Ping) => self.on_ping(&msg)?,
            Some(ControlVerb::Privmsg) => self.on_privmsg(&msg).await?,
            Some(ControlVerb::Invite) => self.on_invite(&msg).await?,
            Some(ControlVerb::Version) => self.on_version_query(&msg)?,
            Some(ControlVerb::Welcome) => self.on_welcome().await?,
            Some(ControlVerb::ServerError) => {
                let reason = msg.args.first().map(String::as_str).unwrap_or("unknown");
                error!(reason = %reason, "server error; dropping connection");
                self.state = ConnectionState::Disconnected;
            }
            None => {
                debug!(command = %msg.command, args = ?msg.args, "unhandled command");
            }
        }
        Ok(())
    }

    /// Feed a message into the SASL session and track its phase.
    fn drive_sasl(&mut self, msg: &Message) -> Result<()> {
        let Some(session) = self.sasl.as_mut() else {
            debug!(command = %msg.command, "no authentication in progress; ignoring");
            return Ok(());
        };

        let actions = session.feed(msg);
        let phase = session.phase().clone();
        for action in actions {
            self.out.send(action)?;
        }

        if phase.is_terminal() {
            info!(?phase, "authentication finished");
            self.sasl = None;
            if self.state == ConnectionState::Authenticating {
                self.state = ConnectionState::Registering;
            }
        } else if matches!(phase, SaslPhase::AckReceived | SaslPhase::CredentialsSent) {
            self.state = ConnectionState::Authenticating;
        }
        Ok(())
    }

    fn on_ping(&mut self, msg: &Message) -> Result<()> {
        let token = msg
            .args
            .first()
            .cloned()
            .unwrap_or_else(|| self.config.connection.hostname.clone());
        self.out.send(Message::pong(token))
    }

    async fn on_privmsg(&mut self, msg: &Message) -> Result<()> {
        let (Some(target), Some(text)) = (msg.args.first(), msg.args.get(1)) else {
            return Ok(());
        };
        let nick = msg.source_nick().unwrap_or("unknown").to_string();

        if let Some(ctcp) = Ctcp::parse(text) {
            if ctcp.kind == CtcpKind::Version {
                let version = format!("magpie {}", self.config.version);
                let reply = Ctcp::version(&version);
                self.out.notice(&nick, reply.to_string())?;
            }
        } else if let Some(rest) = text.strip_prefix(self.config.connection.command_prefix.as_str())
        {
            let mut parts = rest.split_whitespace();
            if let Some(name) = parts.next() {
                let args: Vec<String> = parts.map(str::to_string).collect();
                router::route(
                    &self.out,
                    &self.db,
                    &self.config,
                    self.plugins,
                    &nick,
                    target,
                    name,
                    &args,
                )
                .await?;
            }
        }

        // Plugins see every message, command or not.
        let ctx = PluginContext {
            out: &self.out,
            db: &self.db,
            config: &self.config,
        };
        self.plugins.dispatch_message(&ctx, &nick, target, text).await;
        Ok(())
    }

    async fn on_invite(&mut self, msg: &Message) -> Result<()> {
        let Some(channel) = msg.args.get(1) else {
            return Ok(());
        };
        self.out.send(Message::join(channel.clone()))?;
        if let Err(e) = self.db.channels().save(channel).await {
            warn!(channel = %channel, error = %e, "failed to persist invited channel");
        }
        info!(channel = %channel, "auto-joining after invite");
        Ok(())
    }

    fn on_version_query(&mut self, msg: &Message) -> Result<()> {
        let Some(nick) = msg.source_nick() else {
            return Ok(());
        };
        let nick = nick.to_string();
        self.out
            .notice(&nick, format!("magpie v{}", self.config.version))
    }

    async fn on_welcome(&mut self) -> Result<()> {
        info!("registered with server");
        self.state = ConnectionState::Registered;

        match self.db.channels().list().await {
            Ok(channels) => {
                for channel in channels {
                    info!(channel = %channel, "auto-joining");
                    self.out.send(Message::join(channel))?;
                }
            }
            Err(e) => warn!(error = %e, "failed to load persisted channels"),
        }

        let ctx = PluginContext {
            out: &self.out,
            db: &self.db,
            config: &self.config,
        };
        self.plugins.dispatch_connect(&ctx).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_config(sasl: bool) -> Arc<Config> {
        let sasl_block = if sasl {
            "\n[sasl]\nenabled = true\nusername = \"magpie\"\npassword = \"hunter2\"\n"
        } else {
            ""
        };
        Arc::new(
            toml::from_str(&format!(
                r#"
                version = "0.9.0"

                [connection]
                hostname = "irc.example.net"
                port = 6667
                nick = "magpie"
                ident = "magpie"
                realname = "Magpie Bot"

                [database]
                path = ":memory:"
                {sasl_block}
                "#
            ))
            .unwrap(),
        )
    }

    async fn fixture(
        sasl: bool,
    ) -> (
        Arc<Config>,
        Database,
        PluginHost,
        Outbox,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let config = test_config(sasl);
        let db = Database::new(":memory:").await.unwrap();
        let plugins = PluginHost::empty();
        let (out, rx) = Outbox::new();
        (config, db, plugins, out, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            lines.push(msg.to_string());
        }
        lines
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(ControlVerb::classify("PING"), Some(ControlVerb::Ping));
        assert_eq!(ControlVerb::classify("PRIVMSG"), Some(ControlVerb::Privmsg));
        assert_eq!(ControlVerb::classify("001"), Some(ControlVerb::Welcome));
        assert_eq!(ControlVerb::classify("903"), Some(ControlVerb::SaslSuccess));
        for numeric in ["904", "905", "906", "907"] {
            assert_eq!(
                ControlVerb::classify(numeric),
                Some(ControlVerb::SaslFailure)
            );
        }
        assert_eq!(ControlVerb::classify("ERROR"), Some(ControlVerb::ServerError));
        assert_eq!(ControlVerb::classify("TOPIC"), None);
        assert_eq!(ControlVerb::classify("366"), None);
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (config, db, mut plugins, out, mut rx) = fixture(false).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher
            .dispatch(Message::parse("PING :serverhost").unwrap())
            .await
            .unwrap();

        assert_eq!(drain(&mut rx), vec!["PONG serverhost"]);
    }

    #[tokio::test]
    async fn test_builtin_ping_command_scenario() {
        let (config, db, mut plugins, out, mut rx) = fixture(false).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher
            .dispatch(Message::parse(":alice!u@h PRIVMSG #chan :&ping").unwrap())
            .await
            .unwrap();

        assert_eq!(drain(&mut rx), vec!["PRIVMSG #chan :alice: Pong!"]);
    }

    #[tokio::test]
    async fn test_welcome_sets_state_and_autojoins() {
        let (config, db, mut plugins, out, mut rx) = fixture(false).await;
        db.channels().save("#rust").await.unwrap();
        db.channels().save("#magpie").await.unwrap();

        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);
        dispatcher
            .dispatch(Message::parse(":server 001 magpie :Welcome").unwrap())
            .await
            .unwrap();

        assert!(dispatcher.state().is_registered());
        assert_eq!(drain(&mut rx), vec!["JOIN #rust", "JOIN #magpie"]);
    }

    #[tokio::test]
    async fn test_invite_autojoin_persists() {
        let (config, db, mut plugins, out, mut rx) = fixture(false).await;
        let mut dispatcher = Dispatcher::new(config, db.clone(), &mut plugins, out);

        dispatcher
            .dispatch(Message::parse(":bob!b@h INVITE magpie #secret").unwrap())
            .await
            .unwrap();

        assert_eq!(drain(&mut rx), vec!["JOIN #secret"]);
        assert_eq!(db.channels().list().await.unwrap(), vec!["#secret"]);
    }

    #[tokio::test]
    async fn test_ctcp_version_reply() {
        let (config, db, mut plugins, out, mut rx) = fixture(false).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher
            .dispatch(Message::parse(":alice!u@h PRIVMSG magpie :\u{1}VERSION\u{1}").unwrap())
            .await
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec!["NOTICE alice :\u{1}VERSION magpie 0.9.0\u{1}"]
        );
    }

    #[tokio::test]
    async fn test_server_error_flips_state() {
        let (config, db, mut plugins, out, _rx) = fixture(false).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher
            .dispatch(Message::parse("ERROR :Closing Link: flood").unwrap())
            .await
            .unwrap();

        assert_eq!(dispatcher.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let (config, db, mut plugins, out, mut rx) = fixture(false).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher
            .dispatch(Message::parse(":server 372 magpie :- motd line").unwrap())
            .await
            .unwrap();

        assert!(drain(&mut rx).is_empty());
        assert_eq!(dispatcher.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_registration_without_sasl() {
        let (config, db, mut plugins, out, mut rx) = fixture(false).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher.start_registration().unwrap();

        assert_eq!(
            drain(&mut rx),
            vec!["NICK magpie", "USER magpie * * :Magpie Bot"]
        );
        assert_eq!(dispatcher.state(), ConnectionState::Registering);
    }

    #[tokio::test]
    async fn test_full_sasl_flow() {
        let (config, db, mut plugins, out, mut rx) = fixture(true).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher.start_registration().unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                "CAP LS 302",
                "NICK magpie",
                "USER magpie * * :Magpie Bot",
                "CAP REQ sasl",
            ]
        );

        dispatcher
            .dispatch(Message::parse(":server CAP * ACK :sasl").unwrap())
            .await
            .unwrap();
        assert_eq!(dispatcher.state(), ConnectionState::Authenticating);
        assert_eq!(drain(&mut rx), vec!["AUTHENTICATE PLAIN"]);

        dispatcher
            .dispatch(Message::parse("AUTHENTICATE +").unwrap())
            .await
            .unwrap();
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("AUTHENTICATE "));

        dispatcher
            .dispatch(Message::parse(":server 903 magpie :SASL successful").unwrap())
            .await
            .unwrap();
        assert_eq!(drain(&mut rx), vec!["CAP END"]);
        assert_eq!(dispatcher.state(), ConnectionState::Registering);

        dispatcher
            .dispatch(Message::parse(":server 001 magpie :Welcome").unwrap())
            .await
            .unwrap();
        assert!(dispatcher.state().is_registered());
    }

    #[tokio::test]
    async fn test_sasl_failure_proceeds_unauthenticated() {
        let (config, db, mut plugins, out, mut rx) = fixture(true).await;
        let mut dispatcher = Dispatcher::new(config, db, &mut plugins, out);

        dispatcher.start_registration().unwrap();
        drain(&mut rx);

        dispatcher
            .dispatch(Message::parse(":server CAP * ACK :sasl").unwrap())
            .await
            .unwrap();
        dispatcher
            .dispatch(Message::parse("AUTHENTICATE +").unwrap())
            .await
            .unwrap();
        drain(&mut rx);

        dispatcher
            .dispatch(Message::parse(":server 904 magpie :SASL failed").unwrap())
            .await
            .unwrap();
        assert_eq!(drain(&mut rx), vec!["CAP END"]);
        // Registration still proceeds to completion
        dispatcher
            .dispatch(Message::parse(":server 001 magpie :Welcome").unwrap())
            .await
            .unwrap();
        assert!(dispatcher.state().is_registered());
    }
}

//! Plugin capability interface and host.
//!
//! Plugins are polymorphic over a fixed capability set with default
//! no-op implementations, so every plugin speaks the same interface
//! regardless of which hooks it overrides. The host invokes hooks
//! sequentially in registration order with per-plugin fault isolation:
//! a failing plugin is logged with its identity and skipped, and can
//! never prevent delivery to subsequent plugins.
//!
//! Dynamic discovery is replaced by an explicit registration table
//! (identifier to constructor) built once at startup; the config
//! selects which entries load and in what order.

pub mod cookie;
pub mod hello;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::db::Database;
use crate::outbox::Outbox;

/// Handles a plugin needs to talk back to the world.
pub struct PluginContext<'a> {
    /// Outgoing message queue.
    pub out: &'a Outbox,
    /// Persistent store (channel set, counters).
    pub db: &'a Database,
    /// Immutable bot configuration.
    pub config: &'a Config,
}

/// Result type for plugin hooks.
pub type PluginResult<T> = anyhow::Result<T>;

/// A loaded bot capability.
///
/// Every hook is optional; the defaults do nothing. Hooks run
/// synchronously on the dispatch path and must not block indefinitely.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier, used in config and log messages.
    fn name(&self) -> &'static str;

    /// Called for every chat message.
    async fn on_message(
        &mut self,
        _ctx: &PluginContext<'_>,
        _nick: &str,
        _target: &str,
        _text: &str,
    ) -> PluginResult<()> {
        Ok(())
    }

    /// Called for a bot command no built-in handled.
    ///
    /// Return `Ok(true)` to stop resolution at this plugin.
    async fn on_command(
        &mut self,
        _ctx: &PluginContext<'_>,
        _nick: &str,
        _target: &str,
        _name: &str,
        _args: &[String],
    ) -> PluginResult<bool> {
        Ok(false)
    }

    /// Called once registration with the server completes.
    async fn on_connect(&mut self, _ctx: &PluginContext<'_>) -> PluginResult<()> {
        Ok(())
    }

    /// Called when the connection is lost or the bot shuts down.
    async fn on_disconnect(&mut self, _ctx: &PluginContext<'_>) -> PluginResult<()> {
        Ok(())
    }
}

type Constructor = fn() -> Box<dyn Plugin>;

/// Registration table: identifier to constructor.
const REGISTRY: &[(&str, Constructor)] = &[
    ("hello", hello::construct),
    ("cookie", cookie::construct),
];

/// Ordered collection of loaded plugins.
pub struct PluginHost {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginHost {
    /// Build the host from the config's plugin list.
    ///
    /// An unknown identifier is a configuration fault and fatal at
    /// startup.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut plugins = Vec::new();
        for name in &config.plugins.enabled {
            let constructor = REGISTRY
                .iter()
                .find(|(id, _)| id == name)
                .map(|(_, build)| build)
                .ok_or_else(|| ConfigError::UnknownPlugin(name.clone()))?;
            plugins.push(constructor());
        }
        info!(count = plugins.len(), "loaded plugins");
        Ok(Self { plugins })
    }

    /// Build a host from explicit plugin instances.
    pub fn with_plugins(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Build an empty host.
    pub fn empty() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Number of loaded plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether any plugins are loaded.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Deliver a chat message to every plugin.
    pub async fn dispatch_message(
        &mut self,
        ctx: &PluginContext<'_>,
        nick: &str,
        target: &str,
        text: &str,
    ) {
        for plugin in &mut self.plugins {
            if let Err(e) = plugin.on_message(ctx, nick, target, text).await {
                warn!(plugin = plugin.name(), error = %e, "plugin message hook failed");
            }
        }
    }

    /// Offer a command to plugins in registration order.
    ///
    /// Stops at the first plugin that reports success; returns whether
    /// any did.
    pub async fn dispatch_command(
        &mut self,
        ctx: &PluginContext<'_>,
        nick: &str,
        target: &str,
        name: &str,
        args: &[String],
    ) -> bool {
        for plugin in &mut self.plugins {
            match plugin.on_command(ctx, nick, target, name, args).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(plugin = plugin.name(), error = %e, "plugin command hook failed");
                }
            }
        }
        false
    }

    /// Notify every plugin that registration completed.
    pub async fn dispatch_connect(&mut self, ctx: &PluginContext<'_>) {
        for plugin in &mut self.plugins {
            if let Err(e) = plugin.on_connect(ctx).await {
                warn!(plugin = plugin.name(), error = %e, "plugin connect hook failed");
            }
        }
    }

    /// Notify every plugin that the connection ended.
    pub async fn dispatch_disconnect(&mut self, ctx: &PluginContext<'_>) {
        for plugin in &mut self.plugins {
            if let Err(e) = plugin.on_disconnect(ctx).await {
                warn!(plugin = plugin.name(), error = %e, "plugin disconnect hook failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl Plugin for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        async fn on_message(
            &mut self,
            _ctx: &PluginContext<'_>,
            _nick: &str,
            _target: &str,
            _text: &str,
        ) -> PluginResult<()> {
            anyhow::bail!("boom")
        }

        async fn on_command(
            &mut self,
            _ctx: &PluginContext<'_>,
            _nick: &str,
            _target: &str,
            _name: &str,
            _args: &[String],
        ) -> PluginResult<bool> {
            anyhow::bail!("boom")
        }
    }

    struct Recorder;

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn on_message(
            &mut self,
            ctx: &PluginContext<'_>,
            nick: &str,
            _target: &str,
            _text: &str,
        ) -> PluginResult<()> {
            ctx.out.privmsg("#log", format!("saw {}", nick))?;
            Ok(())
        }

        async fn on_command(
            &mut self,
            ctx: &PluginContext<'_>,
            _nick: &str,
            target: &str,
            name: &str,
            _args: &[String],
        ) -> PluginResult<bool> {
            if name == "record" {
                ctx.out.privmsg(target, "recorded")?;
                return Ok(true);
            }
            Ok(false)
        }
    }

    async fn test_fixture() -> (Config, Database) {
        let config: Config = toml::from_str(
            r#"
            [connection]
            hostname = "irc.example.net"
            port = 6667
            nick = "magpie"
            ident = "magpie"
            realname = "Magpie Bot"

            [database]
            path = ":memory:"
            "#,
        )
        .unwrap();
        let db = Database::new(":memory:").await.unwrap();
        (config, db)
    }

    #[tokio::test]
    async fn test_failing_plugin_does_not_block_later_plugins() {
        let (config, db) = test_fixture().await;
        let (out, mut rx) = Outbox::new();
        let ctx = PluginContext {
            out: &out,
            db: &db,
            config: &config,
        };

        let mut host =
            PluginHost::with_plugins(vec![Box::new(AlwaysFails), Box::new(Recorder)]);

        host.dispatch_message(&ctx, "alice", "#chan", "hi").await;
        assert_eq!(rx.try_recv().unwrap().args[1], "saw alice");

        let handled = host
            .dispatch_command(&ctx, "alice", "#chan", "record", &[])
            .await;
        assert!(handled);
        assert_eq!(rx.try_recv().unwrap().args[1], "recorded");
    }

    #[tokio::test]
    async fn test_unhandled_command_returns_false() {
        let (config, db) = test_fixture().await;
        let (out, _rx) = Outbox::new();
        let ctx = PluginContext {
            out: &out,
            db: &db,
            config: &config,
        };

        let mut host = PluginHost::with_plugins(vec![Box::new(Recorder)]);
        assert!(
            !host
                .dispatch_command(&ctx, "alice", "#chan", "nosuch", &[])
                .await
        );
    }

    #[test]
    fn test_registry_rejects_unknown_plugin() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            hostname = "irc.example.net"
            port = 6667
            nick = "magpie"
            ident = "magpie"
            realname = "Magpie Bot"

            [database]
            path = ":memory:"

            [plugins]
            enabled = ["nope"]
            "#,
        )
        .unwrap();
        assert!(matches!(
            PluginHost::from_config(&config),
            Err(ConfigError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn test_registry_loads_in_config_order() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            hostname = "irc.example.net"
            port = 6667
            nick = "magpie"
            ident = "magpie"
            realname = "Magpie Bot"

            [database]
            path = ":memory:"

            [plugins]
            enabled = ["cookie", "hello"]
            "#,
        )
        .unwrap();
        let host = PluginHost::from_config(&config).unwrap();
        assert_eq!(host.len(), 2);
        assert_eq!(host.plugins[0].name(), "cookie");
        assert_eq!(host.plugins[1].name(), "hello");
    }
}

//! Greeter plugin: waves back at anyone saying hello and provides an
//! `echo` command.

use async_trait::async_trait;
use tracing::debug;

use super::{Plugin, PluginContext, PluginResult};

pub(crate) fn construct() -> Box<dyn Plugin> {
    Box::new(HelloPlugin)
}

pub struct HelloPlugin;

#[async_trait]
impl Plugin for HelloPlugin {
    fn name(&self) -> &'static str {
        "hello"
    }

    async fn on_message(
        &mut self,
        ctx: &PluginContext<'_>,
        nick: &str,
        target: &str,
        text: &str,
    ) -> PluginResult<()> {
        if text.to_lowercase().contains("hello") {
            ctx.out.privmsg(target, format!("Hello {}!", nick))?;
        }
        Ok(())
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext<'_>,
        nick: &str,
        target: &str,
        name: &str,
        args: &[String],
    ) -> PluginResult<bool> {
        if name.eq_ignore_ascii_case("echo") && !args.is_empty() {
            ctx.out
                .privmsg(target, format!("{}: {}", nick, args.join(" ")))?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn on_connect(&mut self, _ctx: &PluginContext<'_>) -> PluginResult<()> {
        debug!("hello plugin ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::outbox::Outbox;

    async fn fixture() -> (Config, Database) {
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
        (config, Database::new(":memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_greets_on_hello() {
        let (config, db) = fixture().await;
        let (out, mut rx) = Outbox::new();
        let ctx = PluginContext {
            out: &out,
            db: &db,
            config: &config,
        };

        let mut plugin = HelloPlugin;
        plugin
            .on_message(&ctx, "alice", "#chan", "Hello everyone")
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().args, vec!["#chan", "Hello alice!"]);

        plugin
            .on_message(&ctx, "alice", "#chan", "nothing relevant")
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_echo_command() {
        let (config, db) = fixture().await;
        let (out, mut rx) = Outbox::new();
        let ctx = PluginContext {
            out: &out,
            db: &db,
            config: &config,
        };

        let mut plugin = HelloPlugin;
        let handled = plugin
            .on_command(
                &ctx,
                "alice",
                "#chan",
                "echo",
                &["one".into(), "two".into()],
            )
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(rx.try_recv().unwrap().args, vec!["#chan", "alice: one two"]);

        // No args: fall through to the next handler
        assert!(!plugin
            .on_command(&ctx, "alice", "#chan", "echo", &[])
            .await
            .unwrap());
    }
}

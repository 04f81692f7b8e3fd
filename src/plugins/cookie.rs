//! Cookie counter plugin.
//!
//! `&cookie` hands the sender a cookie and tracks a running total per
//! nick in the counter store; `&cookie <nick>` reports someone else's
//! hoard.

use async_trait::async_trait;

use super::{Plugin, PluginContext, PluginResult};

pub(crate) fn construct() -> Box<dyn Plugin> {
    Box::new(CookiePlugin)
}

pub struct CookiePlugin;

fn counter_key(nick: &str) -> String {
    format!("cookie:{}", nick.to_lowercase())
}

fn pluralize(count: i64) -> String {
    match count {
        0 => "no cookies".to_string(),
        1 => "1 cookie".to_string(),
        n => format!("{} cookies", n),
    }
}

#[async_trait]
impl Plugin for CookiePlugin {
    fn name(&self) -> &'static str {
        "cookie"
    }

    async fn on_command(
        &mut self,
        ctx: &PluginContext<'_>,
        nick: &str,
        target: &str,
        name: &str,
        args: &[String],
    ) -> PluginResult<bool> {
        if !name.eq_ignore_ascii_case("cookie") {
            return Ok(false);
        }

        match args.first() {
            None => {
                let counters = ctx.db.counters();
                let key = counter_key(nick);
                let total = counters.get(&key).await?.unwrap_or(0) + 1;
                counters.set(&key, total).await?;
                ctx.out.privmsg(
                    target,
                    format!("{}: om nom nom. You now have {}.", nick, pluralize(total)),
                )?;
            }
            Some(other) => {
                match ctx.db.counters().get(&counter_key(other)).await? {
                    Some(count) => {
                        ctx.out.privmsg(
                            target,
                            format!("{} currently has {}.", other, pluralize(count)),
                        )?;
                    }
                    None => {
                        ctx.out.privmsg(
                            target,
                            format!(
                                "I've looked everywhere for {}, but I couldn't find them.",
                                other
                            ),
                        )?;
                    }
                }
            }
        }

        Ok(true)
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
    async fn test_cookie_accumulates() {
        let (config, db) = fixture().await;
        let (out, mut rx) = Outbox::new();
        let ctx = PluginContext {
            out: &out,
            db: &db,
            config: &config,
        };

        let mut plugin = CookiePlugin;
        for _ in 0..2 {
            assert!(plugin
                .on_command(&ctx, "Alice", "#chan", "cookie", &[])
                .await
                .unwrap());
        }

        assert_eq!(
            rx.try_recv().unwrap().args[1],
            "Alice: om nom nom. You now have 1 cookie."
        );
        assert_eq!(
            rx.try_recv().unwrap().args[1],
            "Alice: om nom nom. You now have 2 cookies."
        );
        // Nick lookup is case-insensitive through the counter key
        assert_eq!(db.counters().get("cookie:alice").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_cookie_lookup() {
        let (config, db) = fixture().await;
        let (out, mut rx) = Outbox::new();
        let ctx = PluginContext {
            out: &out,
            db: &db,
            config: &config,
        };

        db.counters().set("cookie:bob", 3).await.unwrap();

        let mut plugin = CookiePlugin;
        plugin
            .on_command(&ctx, "alice", "#chan", "cookie", &["bob".into()])
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().args[1], "bob currently has 3 cookies.");

        plugin
            .on_command(&ctx, "alice", "#chan", "cookie", &["ghost".into()])
            .await
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap().args[1],
            "I've looked everywhere for ghost, but I couldn't find them."
        );
    }

    #[tokio::test]
    async fn test_other_commands_fall_through() {
        let (config, db) = fixture().await;
        let (out, _rx) = Outbox::new();
        let ctx = PluginContext {
            out: &out,
            db: &db,
            config: &config,
        };

        let mut plugin = CookiePlugin;
        assert!(!plugin
            .on_command(&ctx, "alice", "#chan", "brownie", &[])
            .await
            .unwrap());
    }
}

//! Connection lifecycle: connect (optionally TLS), the timed read
//! loop, the keepalive task, reconnection with exponential backoff,
//! and graceful shutdown.
//!
//! One read loop drives the connection; one periodic task drives the
//! keepalive probe. The only state they share is the connection-live
//! flag and the outgoing queue handle. Everything that can go wrong at
//! runtime feeds back into the retry loop; nothing here is fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use magpie_proto::{Message, Transport};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{rustls, TlsConnector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::Config;
use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::error::{BotError, Result};
use crate::outbox::Outbox;
use crate::plugins::{PluginContext, PluginHost};
use crate::state::ConnectionState;

/// Grace period for the QUIT notification to flush on shutdown.
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// What the select loop decided to do next.
enum Step {
    /// A message arrived and needs dispatching.
    Incoming(Message),
    /// A queued message needs writing to the transport.
    Outgoing(Message),
    /// The connection is dead; reconnect.
    Dead(&'static str),
    /// Shutdown was requested; quit and stop.
    Shutdown,
}

/// The bot: owns the long-lived pieces and the retry loop.
pub struct Bot {
    config: Arc<Config>,
    db: Database,
    plugins: PluginHost,
}

impl Bot {
    /// Assemble the bot from its long-lived parts.
    pub fn new(config: Arc<Config>, db: Database, plugins: PluginHost) -> Self {
        Bot {
            config,
            db,
            plugins,
        }
    }

    /// Run until `shutdown` fires, reconnecting with backoff.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let mut backoff = Backoff::new(
            Duration::from_secs(self.config.backoff.initial),
            Duration::from_secs(self.config.backoff.max),
        );

        while !shutdown.is_cancelled() {
            let transport = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.connect() => match result {
                    Ok(transport) => {
                        backoff.reset();
                        transport
                    }
                    Err(e) => {
                        let delay = backoff.failure_delay();
                        warn!(error = %e, retry_secs = delay.as_secs(), "connection attempt failed");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = sleep(delay) => {}
                        }
                        continue;
                    }
                },
            };

            info!(
                host = %self.config.connection.hostname,
                port = self.config.connection.port.number,
                tls = transport.is_tls(),
                "connected"
            );

            self.drive(transport, &shutdown).await;

            if !shutdown.is_cancelled() {
                info!("connection lost; reconnecting");
            }
        }

        info!("bot stopped");
        Ok(())
    }

    /// Open the transport, upgrading to TLS when the port carries the
    /// `+` marker.
    async fn connect(&self) -> Result<Transport> {
        let conn = &self.config.connection;
        let stream = TcpStream::connect((conn.hostname.as_str(), conn.port.number)).await?;

        if !conn.port.tls {
            return Ok(Transport::tcp(stream));
        }

        let mut roots = rustls::RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!(error = %error, "skipping unreadable native root certificate");
        }
        for cert in native.certs {
            if let Err(e) = roots.add(cert) {
                debug!(error = %e, "rejected native root certificate");
            }
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = ServerName::try_from(conn.hostname.clone())
            .map_err(|_| BotError::InvalidServerName(conn.hostname.clone()))?;

        let tls_stream = connector.connect(server_name, stream).await?;
        Ok(Transport::tls(tls_stream))
    }

    /// Drive one established connection until it dies or shutdown.
    async fn drive(&mut self, mut transport: Transport, shutdown: &CancellationToken) {
        let (out, mut rx) = Outbox::new();
        let live = Arc::new(AtomicBool::new(true));

        let keepalive = spawn_keepalive(
            out.clone(),
            Arc::clone(&live),
            self.config.timeouts.keepalive_interval(),
            self.config.connection.hostname.clone(),
        );

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&self.config),
            self.db.clone(),
            &mut self.plugins,
            out.clone(),
        );

        let mut quitting = false;
        if dispatcher.start_registration().is_err() {
            warn!("outgoing queue closed before registration");
        } else {
            let read_timeout = self.config.timeouts.read_timeout();
            let mut read_deadline = Instant::now() + read_timeout;

            loop {
                let step = tokio::select! {
                    result = timeout_at(read_deadline, transport.read_message()) => match result {
                        Err(_) => Step::Dead("read timeout"),
                        Ok(Ok(None)) => Step::Dead("connection closed by server"),
                        Ok(Err(e)) => {
                            warn!(error = %e, "read error");
                            Step::Dead("read error")
                        }
                        Ok(Ok(Some(msg))) => Step::Incoming(msg),
                    },
                    maybe = rx.recv() => match maybe {
                        Some(msg) => Step::Outgoing(msg),
                        None => Step::Dead("outgoing queue closed"),
                    },
                    _ = shutdown.cancelled() => Step::Shutdown,
                };

                match step {
                    Step::Incoming(msg) => {
                        read_deadline = Instant::now() + read_timeout;
                        if let Err(e) = dispatcher.dispatch(msg).await {
                            warn!(error = %e, "dispatch failed");
                            break;
                        }
                        if dispatcher.state() == ConnectionState::Disconnected {
                            break;
                        }
                    }
                    Step::Outgoing(msg) => {
                        debug!(line = %msg, "sending");
                        if let Err(e) = transport.write_message(&msg).await {
                            warn!(error = %e, "write error");
                            break;
                        }
                    }
                    Step::Dead(reason) => {
                        warn!(reason = %reason, "connection dead");
                        break;
                    }
                    Step::Shutdown => {
                        quitting = true;
                        break;
                    }
                }
            }
        }

        drop(dispatcher);
        live.store(false, Ordering::Release);
        keepalive.abort();

        // Disconnect hooks fire on every teardown, not just shutdown.
        let ctx = PluginContext {
            out: &out,
            db: &self.db,
            config: &self.config,
        };
        self.plugins.dispatch_disconnect(&ctx).await;

        if quitting {
            // Best-effort farewell; failures only get logged.
            if let Err(e) = transport
                .write_message(&Message::quit("magpie shutting down"))
                .await
            {
                debug!(error = %e, "failed to send QUIT");
            }
            sleep(QUIT_GRACE).await;
        }
        if let Err(e) = transport.close().await {
            debug!(error = %e, "failed to close transport");
        }
    }
}

/// Periodic liveness probe.
///
/// Sends a PING into the outgoing queue every interval while the
/// connection is marked live; a failed send marks it dead and exits.
fn spawn_keepalive(
    out: Outbox,
    live: Arc<AtomicBool>,
    interval: Duration,
    hostname: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately; skip it.
        timer.tick().await;
        loop {
            timer.tick().await;
            if !live.load(Ordering::Acquire) {
                break;
            }
            if out.send(Message::ping(hostname.clone())).is_err() {
                live.store(false, Ordering::Release);
                break;
            }
        }
    })
}

//! Framed IRC transport over TCP and client-side TLS.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_util::codec::Framed;

use crate::error::Result;
use crate::irc::IrcCodec;
use crate::message::Message;

/// Maximum IRC line length in bytes (including the terminator).
pub const MAX_IRC_LINE_LEN: usize = 512;

/// IRC transport over a connected stream.
///
/// Wraps the stream in the message codec. The caller decides between
/// plain TCP and TLS when establishing the connection and hands the
/// finished stream here.
#[allow(clippy::large_enum_variant)]
#[non_exhaustive]
pub enum Transport {
    /// Plain TCP transport.
    Tcp {
        /// The framed codec for TCP.
        framed: Framed<TcpStream, IrcCodec>,
    },
    /// Client-side TLS-encrypted transport.
    Tls {
        /// The framed codec for client-side TLS.
        framed: Framed<ClientTlsStream<TcpStream>, IrcCodec>,
    },
}

impl Transport {
    /// Create a new TCP transport from a connected stream.
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp {
            framed: Framed::new(stream, IrcCodec::new()),
        }
    }

    /// Create a new TLS transport from an established TLS stream.
    pub fn tls(stream: ClientTlsStream<TcpStream>) -> Self {
        Self::Tls {
            framed: Framed::new(stream, IrcCodec::new()),
        }
    }

    /// Check if this transport is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    /// Read the next IRC message from the transport.
    ///
    /// Returns `Ok(None)` when the connection is closed.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        macro_rules! read_framed {
            ($framed:expr) => {
                match $framed.next().await {
                    Some(Ok(msg)) => Ok(Some(msg)),
                    Some(Err(e)) => Err(e),
                    None => Ok(None),
                }
            };
        }

        match self {
            Transport::Tcp { framed } => read_framed!(framed),
            Transport::Tls { framed } => read_framed!(framed),
        }
    }

    /// Write an IRC message to the transport.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        match self {
            Transport::Tcp { framed } => framed.send(message.clone()).await,
            Transport::Tls { framed } => framed.send(message.clone()).await,
        }
    }

    /// Flush and close the transport, best-effort.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            Transport::Tcp { framed } => framed.close().await,
            Transport::Tls { framed } => framed.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"PING :abc\r\n").await.unwrap();

            let mut buf = [0u8; 64];
            let n = tokio::io::AsyncReadExt::read(&mut sock, &mut buf)
                .await
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut transport = Transport::tcp(stream);
        assert!(!transport.is_tls());

        let msg = transport.read_message().await.unwrap().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["abc"]);

        transport.write_message(&Message::pong("abc")).await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received, "PONG abc\r\n");
    }

    #[tokio::test]
    async fn test_read_message_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut transport = Transport::tcp(stream);
        assert!(transport.read_message().await.unwrap().is_none());
    }
}

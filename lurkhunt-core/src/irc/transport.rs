//! The socket side of the chat client.
//!
//! [`IrcConnection`] is the seam the listener is written against; the TCP
//! implementation speaks the platform's chat endpoint with the `chat:read`
//! scope. Tests drive the listener with a scripted implementation instead.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};

use super::FetcherError;

/// Inbound chat lines are short; anything longer than this is hostile.
const MAX_LINE_LENGTH: usize = 8192;

/// How long to wait for the welcome numeric after authenticating.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

type ChatFramed = Framed<TcpStream, LinesCodec>;

/// Minimal connection surface the channel listener needs.
#[async_trait]
pub trait IrcConnection: Send + Sync {
    async fn send_join(&self, channel: &str) -> Result<(), FetcherError>;
    async fn send_part(&self, channel: &str) -> Result<(), FetcherError>;

    /// Next inbound frame, or `None` when the server closed the stream.
    async fn next_line(&self) -> Result<Option<String>, FetcherError>;
}

/// A live chat connection over TCP.
///
/// Reader and writer halves carry their own guards so the listener's reader
/// task can block on inbound frames while channel tasks send JOIN/PART.
pub struct TcpIrcConnection {
    reader: Mutex<SplitStream<ChatFramed>>,
    writer: Mutex<SplitSink<ChatFramed, String>>,
}

impl TcpIrcConnection {
    /// Connect, authenticate with the access token, request the membership
    /// capability (without it the server omits other chatters from 353s),
    /// and wait for the welcome numeric.
    pub async fn connect(
        host: &str,
        port: u16,
        nick: &str,
        access_token: &str,
    ) -> Result<Self, FetcherError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| FetcherError::Transport(format!("connect failed: {e}")))?;
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

        send(&mut framed, format!("PASS oauth:{access_token}")).await?;
        send(&mut framed, format!("NICK {nick}")).await?;
        send(&mut framed, "CAP REQ :twitch.tv/membership".to_string()).await?;

        await_ready(&mut framed).await?;
        tracing::info!(nick, "Chat connection ready");

        let (writer, reader) = framed.split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }
}

async fn send(framed: &mut ChatFramed, line: String) -> Result<(), FetcherError> {
    framed
        .send(line)
        .await
        .map_err(|e| FetcherError::Transport(format!("send failed: {e}")))
}

/// Drain the post-login banner until the welcome numeric (001) arrives.
/// A login rejection comes back as a NOTICE instead.
async fn await_ready(framed: &mut ChatFramed) -> Result<(), FetcherError> {
    let wait = async {
        while let Some(line) = framed.next().await {
            let line = line.map_err(|e| FetcherError::Transport(format!("read failed: {e}")))?;
            if line.contains(" 001 ") {
                return Ok(());
            }
            if line.contains("Login authentication failed")
                || line.contains("Improperly formatted auth")
            {
                return Err(FetcherError::Auth(line));
            }
        }
        Err(FetcherError::Transport(
            "connection closed during login".to_string(),
        ))
    };

    tokio::time::timeout(READY_TIMEOUT, wait)
        .await
        .map_err(|_| FetcherError::Transport("timed out waiting for welcome".to_string()))?
}

#[async_trait]
impl IrcConnection for TcpIrcConnection {
    async fn send_join(&self, channel: &str) -> Result<(), FetcherError> {
        let mut writer = self.writer.lock().await;
        writer
            .send(format!("JOIN #{channel}"))
            .await
            .map_err(|e| FetcherError::Join(e.to_string()))
    }

    async fn send_part(&self, channel: &str) -> Result<(), FetcherError> {
        let mut writer = self.writer.lock().await;
        writer
            .send(format!("PART #{channel}"))
            .await
            .map_err(|e| FetcherError::Part(e.to_string()))
    }

    async fn next_line(&self) -> Result<Option<String>, FetcherError> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(line)) => {
                    // Keepalive is answered here so callers never see it.
                    if let Some(payload) = line.strip_prefix("PING") {
                        let mut writer = self.writer.lock().await;
                        writer
                            .send(format!("PONG{payload}"))
                            .await
                            .map_err(|e| FetcherError::Transport(e.to_string()))?;
                        continue;
                    }
                    return Ok(Some(line));
                }
                Some(Err(e)) => {
                    return Err(FetcherError::Transport(format!("read failed: {e}")));
                }
                None => return Ok(None),
            }
        }
    }
}

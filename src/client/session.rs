//! The live event connection, owned by the login session.
//!
//! Constructed on login, torn down on logout; nothing here is global
//! state. While logged in, the session keeps one socket to the server,
//! decodes incoming frames into [`ChannelEvent`]s for the cache/UI, and
//! reconnects with bounded exponential backoff. Once the attempt cap is
//! exhausted the status turns [`ConnectionStatus::Offline`] and the caller
//! falls back to plain REST polling; missed events are recovered by
//! re-fetching, which is always the source of truth.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::websocket::events::{ChannelEvent, InboundFrame};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Channel endpoint, e.g. `ws://host:3000/api/v1/ws`.
    pub ws_url: String,
    pub token: String,
    pub backoff_base: Duration,
    pub max_attempts: u32,
}

impl SessionConfig {
    pub fn new(ws_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            token: token.into(),
            backoff_base: Duration::from_millis(250),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted; the session is done and the caller
    /// should poll over REST (or build a fresh session).
    Offline,
}

pub struct ChannelSession {
    status_rx: watch::Receiver<ConnectionStatus>,
    outbound_tx: mpsc::UnboundedSender<InboundFrame>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ChannelSession {
    /// Open the session. Returns the handle plus the stream of decoded
    /// server events; dropping the receiver shuts the session down.
    pub fn connect(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_loop(config, event_tx, status_tx, outbound_rx, shutdown_rx));

        (
            Self {
                status_rx,
                outbound_tx,
                shutdown_tx,
                task,
            },
            event_rx,
        )
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Watchable status stream for the UI's connected/reconnecting badge.
    pub fn status_stream(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Best-effort typing signals; silently dropped while disconnected.
    pub fn typing_start(&self, conversation_id: Uuid) {
        let _ = self
            .outbound_tx
            .send(InboundFrame::TypingStart { conversation_id });
    }

    pub fn typing_stop(&self, conversation_id: Uuid) {
        let _ = self
            .outbound_tx
            .send(InboundFrame::TypingStop { conversation_id });
    }

    /// Tear the session down (logout). Waits for the socket task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

/// Delay before reconnect `attempt` (1-based): doubling from the base with
/// 80-120% jitter so a fleet of clients does not reconnect in lockstep.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let delay = base.saturating_mul(1u32 << exp);
    let factor = rand::thread_rng().gen_range(0.8..1.2);
    delay.mul_f64(factor)
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Shutdown,
    Disconnected,
}

async fn run_loop(
    config: SessionConfig,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut outbound_rx: mpsc::UnboundedReceiver<InboundFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let url = format!("{}?token={}", config.ws_url, config.token);
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let stream = tokio::select! {
            result = connect_async(url.clone()) => match result {
                Ok((stream, _)) => Some(stream),
                Err(e) => {
                    tracing::debug!(error = %e, "channel connect failed");
                    None
                }
            },
            _ = shutdown_rx.changed() => return,
        };

        if let Some(stream) = stream {
            attempt = 0;
            let _ = status_tx.send(ConnectionStatus::Connected);
            tracing::info!("channel connected");
            let exit =
                drive_connection(stream, &event_tx, &mut outbound_rx, &mut shutdown_rx).await;
            if exit == Exit::Shutdown {
                return;
            }
            tracing::info!("channel connection lost");
        }

        attempt += 1;
        if attempt > config.max_attempts {
            let _ = status_tx.send(ConnectionStatus::Offline);
            tracing::warn!("channel reconnect attempts exhausted");
            return;
        }
        let _ = status_tx.send(ConnectionStatus::Reconnecting { attempt });
        let delay = backoff_delay(config.backoff_base, attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => return,
        }
    }
}

async fn drive_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event_tx: &mpsc::UnboundedSender<ChannelEvent>,
    outbound_rx: &mut mpsc::UnboundedReceiver<InboundFrame>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Exit {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(msg)) => {
                    if let Ok(text) = msg.to_text() {
                        if text.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ChannelEvent>(text) {
                            Ok(event) => {
                                // Receiver gone means the owner is done with us.
                                if event_tx.send(event).is_err() {
                                    return Exit::Shutdown;
                                }
                            }
                            Err(_) => tracing::debug!("unrecognized channel frame skipped"),
                        }
                    }
                }
                Some(Err(_)) | None => return Exit::Disconnected,
            },
            frame = outbound_rx.recv() => match frame {
                Some(frame) => match serde_json::to_string(&frame) {
                    Ok(text) => {
                        if sink.send(WsMessage::Text(text)).await.is_err() {
                            return Exit::Disconnected;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to serialize outbound frame"),
                },
                None => return Exit::Shutdown,
            },
            _ = shutdown_rx.changed() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return Exit::Shutdown;
            }
        }
    }
}

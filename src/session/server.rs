use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info};

use super::actor::{SessionCommand, SessionHandle, session_actor};
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnectionId, Outbound, OutboundMessage};
use crate::config::ServerConfig;

/// WebSocket front end for the single game table
pub struct GameServer {
    listener: TcpListener,
    handle: SessionHandle,
    config: ServerConfig,
}

impl GameServer {
    /// Bind the listener and start the session actor.
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!("Game server listening on {}", listener.local_addr()?);

        let (tx, rx) = mpsc::channel::<SessionCommand>(1024);
        tokio::spawn(session_actor(rx));

        Ok(Self {
            listener,
            handle: SessionHandle { tx },
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, config).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

/// Last ping went unanswered
#[derive(Debug, Error)]
#[error("no pong within {0:?}")]
pub(crate) struct PongTimeout(Duration);

/// Ping schedule for one connection. At most one ping is outstanding.
pub(crate) struct Keepalive {
    interval: Interval,
    pong_timeout: Duration,
    awaiting_pong: Option<Instant>,
}

impl Keepalive {
    pub(crate) fn new(config: &ServerConfig) -> Self {
        let mut interval =
            tokio::time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            pong_timeout: config.pong_timeout,
            awaiting_pong: None,
        }
    }

    /// Resolves when the next ping is due, or fails once the outstanding
    /// ping has waited longer than the pong timeout. Cancel safe.
    pub(crate) async fn due(&mut self) -> Result<(), PongTimeout> {
        if let Some(deadline) = self.awaiting_pong {
            tokio::time::sleep_until(deadline).await;
            return Err(PongTimeout(self.pong_timeout));
        }
        self.interval.tick().await;
        self.awaiting_pong = Some(Instant::now() + self.pong_timeout);
        Ok(())
    }

    pub(crate) fn pong(&mut self) {
        self.awaiting_pong = None;
    }
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Drains the outbound queue into the socket until a close is sent or
/// the socket fails.
async fn forward_outbound(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        let closing = matches!(item, Outbound::Close);
        let frame = match item {
            Outbound::Text(msg) => Message::Text(msg.into_inner()),
            Outbound::Ping => Message::Ping(Bytes::new()),
            Outbound::Close => Message::Close(None),
        };
        if sink.send(frame).await.is_err() || closing {
            break;
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: SessionHandle,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (sink, mut frames) = ws_stream.split();

    let conn = ConnectionId::generate();
    info!("{} opened from {}", conn, addr);

    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
    let mut writer = tokio::spawn(forward_outbound(sink, rx));
    let mut keepalive = Keepalive::new(&config);

    // Seat or reject before reading anything from the client.
    handle.connect(conn, tx.clone()).await?;

    let reason = loop {
        tokio::select! {
            _ = &mut writer => break "outbound closed".to_string(),

            due = keepalive.due() => match due {
                Ok(()) => {
                    if tx.send(Outbound::Ping).is_err() {
                        break "outbound closed".to_string();
                    }
                    debug!("Ping queued for {}", conn);
                }
                Err(e) => break e.to_string(),
            },

            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_text_message(&text, conn, &tx, &handle).await {
                        break format!("handler failed: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => keepalive.pong(),
                Some(Ok(Message::Close(_))) | None => break "closed by peer".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("read failed: {}", e),
            },
        }
    };

    handle.disconnect(conn).await?;
    writer.abort();
    info!("{} from {} disconnected: {}", conn, addr, reason);

    Ok(())
}

async fn handle_text_message(
    text: &str,
    conn: ConnectionId,
    tx: &mpsc::UnboundedSender<Outbound>,
    handle: &SessionHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let err = ServerMessage::Error {
                message: format!("Invalid message: {}", e),
            };
            let json = serde_json::to_string(&err)?;
            let _ = tx.send(Outbound::Text(OutboundMessage::from(json)));
            return Ok(());
        }
    };

    match client_msg {
        ClientMessage::MakeMove { index } => handle.make_move(conn, index).await?,
        ClientMessage::ResetGame => handle.reset(conn).await?,
    }

    Ok(())
}

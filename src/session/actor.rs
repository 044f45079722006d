use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::coordinator::{Effect, Event, Phase, Session};
use super::messages::ServerMessage;
use super::types::{ConnectionId, Outbound, OutboundMessage, PlayerInfo, SessionError};
use crate::game::GameState;

/// Commands sent to the session actor
pub(crate) enum SessionCommand {
    Connect {
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<Outbound>,
    },
    Event(Event),
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Point-in-time view of the table
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: GameState,
    pub phase: Phase,
    pub players: Vec<PlayerInfo>,
    /// Open connections, seated or not
    pub connections: usize,
}

/// Owns the [`Session`] and every open connection's outbound queue.
/// Each command runs to completion, effects included, before the next.
pub(crate) async fn session_actor(mut rx: mpsc::Receiver<SessionCommand>) {
    let mut session = Session::new();
    let mut connections: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::Connect { conn, tx } => {
                connections.insert(conn, tx);
                let effects = session.dispatch(Event::Connect { conn });
                apply_effects(&mut connections, effects);
            }

            SessionCommand::Event(event) => {
                match event {
                    Event::Disconnect { conn } => {
                        connections.remove(&conn);
                    }
                    // Rejected or already-closed connections may still have frames in flight.
                    Event::Move { conn, .. } | Event::Reset { conn }
                        if !connections.contains_key(&conn) =>
                    {
                        debug!("Dropping {:?} from closed connection", event);
                        continue;
                    }
                    _ => {}
                }
                let effects = session.dispatch(event);
                apply_effects(&mut connections, effects);
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot {
                    state: session.state(),
                    phase: session.phase(),
                    players: session.player_list(),
                    connections: connections.len(),
                });
            }
        }
    }
}

fn apply_effects(
    connections: &mut HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
    effects: Vec<Effect>,
) {
    for effect in effects {
        match effect {
            Effect::Send { to, message } => {
                let (Some(tx), Some(msg)) = (connections.get(&to), encode(&message)) else {
                    continue;
                };
                let _ = tx.send(Outbound::Text(msg));
            }

            Effect::Broadcast(message) => {
                let Some(msg) = encode(&message) else {
                    continue;
                };
                debug!("Broadcasting to {} connections", connections.len());
                for tx in connections.values() {
                    let _ = tx.send(Outbound::Text(msg.clone()));
                }
            }

            Effect::Close(conn) => {
                if let Some(tx) = connections.remove(&conn) {
                    let _ = tx.send(Outbound::Close);
                }
            }
        }
    }
}

fn encode(message: &ServerMessage) -> Option<OutboundMessage> {
    match serde_json::to_string(message) {
        Ok(json) => Some(OutboundMessage::from(json)),
        Err(e) => {
            error!("Failed to serialize {:?}: {}", message, e);
            None
        }
    }
}

/// Handle to communicate with the session actor
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Register a freshly opened connection; it is seated or rejected.
    pub async fn connect(
        &self,
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::Connect { conn, tx }).await
    }

    pub async fn make_move(&self, conn: ConnectionId, index: usize) -> Result<(), SessionError> {
        self.send(SessionCommand::Event(Event::Move { conn, index }))
            .await
    }

    pub async fn reset(&self, conn: ConnectionId) -> Result<(), SessionError> {
        self.send(SessionCommand::Event(Event::Reset { conn })).await
    }

    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), SessionError> {
        self.send(SessionCommand::Event(Event::Disconnect { conn }))
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply: reply_tx })
            .await?;
        reply_rx.await.map_err(|_| SessionError::ActorClosed)
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::ActorClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::coordinator::GAME_FULL_MESSAGE;
    use crate::session::types::Slot;

    fn spawn_actor() -> SessionHandle {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(session_actor(rx));
        SessionHandle { tx }
    }

    fn decode(item: Outbound) -> ServerMessage {
        match item {
            Outbound::Text(msg) => serde_json::from_str(msg.as_str()).unwrap(),
            other => panic!("Expected text, got {:?}", other),
        }
    }

    async fn join(
        handle: &SessionHandle,
        raw: u32,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let conn = ConnectionId::from_raw(raw);
        let (tx, rx) = mpsc::unbounded_channel();
        handle.connect(conn, tx).await.unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn connect_sends_assignment_then_state() {
        let handle = spawn_actor();
        let (conn, mut rx) = join(&handle, 1).await;

        assert_eq!(
            decode(rx.recv().await.unwrap()),
            ServerMessage::PlayerAssignment {
                slot: Slot::First,
                your_id: conn,
            }
        );
        assert_eq!(
            decode(rx.recv().await.unwrap()),
            ServerMessage::from(GameState::initial())
        );
    }

    #[tokio::test]
    async fn third_connection_is_rejected_then_closed() {
        let handle = spawn_actor();
        let _a = join(&handle, 1).await;
        let _b = join(&handle, 2).await;
        let (_, mut rx) = join(&handle, 3).await;

        assert_eq!(
            decode(rx.recv().await.unwrap()),
            ServerMessage::RejectConnection {
                message: GAME_FULL_MESSAGE.to_string(),
            }
        );
        assert!(matches!(rx.recv().await, Some(Outbound::Close)));
        // The actor dropped its sender after closing.
        assert!(rx.recv().await.is_none());

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.connections, 2);
    }

    #[tokio::test]
    async fn rejected_connection_cannot_reset_or_move() {
        let handle = spawn_actor();
        let (a, _rx_a) = join(&handle, 1).await;
        let _b = join(&handle, 2).await;
        handle.make_move(a, 0).await.unwrap();
        let (rejected, _rx) = join(&handle, 3).await;

        let before = handle.snapshot().await.unwrap();
        handle.reset(rejected).await.unwrap();
        handle.make_move(rejected, 4).await.unwrap();

        let after = handle.snapshot().await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.players.len(), 2);
        assert_eq!(after.state.board.get(0), Some(Some(crate::game::Mark::X)));
    }

    #[tokio::test]
    async fn reset_from_never_connected_id_is_ignored() {
        let handle = spawn_actor();
        let (a, _rx_a) = join(&handle, 1).await;
        handle.make_move(a, 4).await.unwrap();

        handle.reset(ConnectionId::from_raw(42)).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, Phase::WaitingForSecond);
        assert_ne!(snapshot.state, GameState::initial());
    }

    #[tokio::test]
    async fn move_is_broadcast_to_every_connection() {
        let handle = spawn_actor();
        let (a, mut rx_a) = join(&handle, 1).await;
        let (_, mut rx_b) = join(&handle, 2).await;
        for _ in 0..2 {
            rx_a.recv().await.unwrap();
            rx_b.recv().await.unwrap();
        }

        handle.make_move(a, 4).await.unwrap();
        let expected = ServerMessage::from(GameState::initial().apply(4));
        assert_eq!(decode(rx_a.recv().await.unwrap()), expected);
        assert_eq!(decode(rx_b.recv().await.unwrap()), expected);
    }

    #[tokio::test]
    async fn reset_reaches_unseated_connections() {
        let handle = spawn_actor();
        let (a, mut rx_a) = join(&handle, 1).await;
        rx_a.recv().await.unwrap();
        rx_a.recv().await.unwrap();

        handle.reset(a).await.unwrap();
        handle.reset(a).await.unwrap();
        for _ in 0..2 {
            assert_eq!(
                decode(rx_a.recv().await.unwrap()),
                ServerMessage::from(GameState::initial())
            );
            assert_eq!(decode(rx_a.recv().await.unwrap()), ServerMessage::GameReset);
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, Phase::Empty);
        assert_eq!(snapshot.connections, 1);
    }

    #[tokio::test]
    async fn disconnect_drops_connection_and_seat() {
        let handle = spawn_actor();
        let (a, _rx_a) = join(&handle, 1).await;
        let (_b, _rx_b) = join(&handle, 2).await;

        handle.disconnect(a).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, Phase::WaitingForSecond);
        assert_eq!(snapshot.connections, 1);
        assert_eq!(snapshot.players[0].slot, Slot::Second);
    }

    #[tokio::test]
    async fn handle_reports_closed_actor() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = SessionHandle { tx };
        assert!(matches!(
            handle.snapshot().await,
            Err(SessionError::ActorClosed)
        ));
    }
}

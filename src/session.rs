//! Game table coordination and its WebSocket transport

mod actor;
mod coordinator;
mod messages;
mod server;
mod types;

pub use actor::{SessionHandle, SessionSnapshot};
pub use coordinator::{Effect, Event, GAME_FULL_MESSAGE, Phase, Session};
pub use messages::{ClientMessage, ServerMessage};
pub use server::GameServer;
pub use types::{
    ConnectionId, MAX_PLAYERS, Outbound, OutboundMessage, PlayerInfo, PlayerRegistry,
    SessionError, Slot,
};

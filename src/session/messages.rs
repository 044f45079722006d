use serde::{Deserialize, Serialize};

use super::types::{ConnectionId, PlayerInfo, Slot};
use crate::game::{Board, GameState, Mark};

/// Messages sent from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Place the sender's mark on cell `index` (0-8, row-major)
    #[serde(rename = "make_move")]
    MakeMove { index: usize },

    /// Clear the board and every seat
    #[serde(rename = "reset_game")]
    ResetGame,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Seat granted to the receiving connection
    #[serde(rename = "player_assignment")]
    PlayerAssignment { slot: Slot, your_id: ConnectionId },

    /// Current board and turn
    #[serde(rename = "game_state")]
    GameState { board: Board, x_is_next: bool },

    /// Table is full; the connection is closed right after
    #[serde(rename = "reject_connection")]
    RejectConnection { message: String },

    /// A move ended the game. `winner` is `None` on a draw.
    #[serde(rename = "game_end")]
    GameEnd {
        winner: Option<Mark>,
        players: Vec<PlayerInfo>,
    },

    /// Board and seats were cleared
    #[serde(rename = "game_reset")]
    GameReset,

    /// Frame could not be understood
    #[serde(rename = "error")]
    Error { message: String },
}

impl From<GameState> for ServerMessage {
    fn from(state: GameState) -> Self {
        ServerMessage::GameState {
            board: state.board,
            x_is_next: state.x_is_next,
        }
    }
}

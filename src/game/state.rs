use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::board::{Board, CELL_COUNT, Mark, Outcome};

/// Why a move was ignored. Never sent to clients, only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("connection holds no seat")]
    NotSeated,

    #[error("game is already over")]
    GameOver,

    #[error("cell {0} is off the board")]
    OutOfRange(usize),

    #[error("cell {0} is already marked")]
    Occupied(usize),

    #[error("it is {0}'s turn")]
    NotYourTurn(Mark),
}

/// Board plus whose turn it is; the unit pushed to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub board: Board,
    pub x_is_next: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self::initial()
    }
}

impl GameState {
    /// Empty board, X to move.
    pub fn initial() -> Self {
        Self {
            board: Board::empty(),
            x_is_next: true,
        }
    }

    pub fn next_mark(&self) -> Mark {
        if self.x_is_next { Mark::X } else { Mark::O }
    }

    pub fn outcome(&self) -> Outcome {
        self.board.outcome()
    }

    /// Snapshot following a move at `index` by the mark whose turn it is.
    ///
    /// The move must already have passed [`validate_move`].
    pub fn apply(&self, index: usize) -> Self {
        Self {
            board: self.board.with_mark(index, self.next_mark()),
            x_is_next: !self.x_is_next,
        }
    }
}

/// Checks a move by the player controlling `mover` (`None` when unseated).
///
/// Preconditions are checked in order: seated, game not over, cell on the
/// board, cell empty, mover's turn.
pub fn validate_move(
    state: &GameState,
    mover: Option<Mark>,
    index: usize,
) -> Result<(), MoveRejection> {
    let mover = mover.ok_or(MoveRejection::NotSeated)?;

    if state.outcome().is_terminal() {
        return Err(MoveRejection::GameOver);
    }
    if index >= CELL_COUNT {
        return Err(MoveRejection::OutOfRange(index));
    }
    if !state.board.is_empty_cell(index) {
        return Err(MoveRejection::Occupied(index));
    }
    if mover != state.next_mark() {
        return Err(MoveRejection::NotYourTurn(state.next_mark()));
    }

    Ok(())
}

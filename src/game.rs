//! Board rules: marks, win detection and move validation

mod board;
mod state;

pub use board::{Board, CELL_COUNT, LINES, Mark, Outcome};
pub use state::{GameState, MoveRejection, validate_move};

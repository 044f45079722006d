//! Two-player networked tic-tac-toe: one authoritative game table behind a
//! WebSocket server.

pub mod config;
pub mod game;
pub mod session;

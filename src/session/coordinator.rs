use tracing::{debug, info};

use super::messages::ServerMessage;
use super::types::{ConnectionId, PlayerInfo, PlayerRegistry, Slot};
use crate::game::{GameState, Outcome, validate_move};

/// Text sent with `reject_connection` when both seats are taken
pub const GAME_FULL_MESSAGE: &str = "Game is full. Please wait for the game to reset.";

/// Everything that can happen to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Connect { conn: ConnectionId },
    Move { conn: ConnectionId, index: usize },
    Reset { conn: ConnectionId },
    Disconnect { conn: ConnectionId },
}

/// What the transport must do after an event
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send {
        to: ConnectionId,
        message: ServerMessage,
    },
    Broadcast(ServerMessage),
    Close(ConnectionId),
}

/// Table lifecycle as seen from seat occupancy and board outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    WaitingForSecond,
    Active,
    Finished,
}

/// Authoritative state of the one game table.
///
/// Events are applied one at a time; each returns the effects the transport
/// has to carry out before the next event is handled.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: GameState,
    players: PlayerRegistry,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn phase(&self) -> Phase {
        match self.players.len() {
            0 => Phase::Empty,
            1 => Phase::WaitingForSecond,
            _ if self.state.outcome().is_terminal() => Phase::Finished,
            _ => Phase::Active,
        }
    }

    pub fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Connect { conn } => self.connect(conn),
            Event::Move { conn, index } => self.make_move(conn, index),
            Event::Reset { conn } => self.reset(conn),
            Event::Disconnect { conn } => self.disconnect(conn),
        }
    }

    fn connect(&mut self, conn: ConnectionId) -> Vec<Effect> {
        let Some(slot) = self.players.seat(conn) else {
            info!("Rejecting {}: table full", conn);
            return vec![
                Effect::Send {
                    to: conn,
                    message: ServerMessage::RejectConnection {
                        message: GAME_FULL_MESSAGE.to_string(),
                    },
                },
                Effect::Close(conn),
            ];
        };

        info!("{} seated in slot {} as {}", conn, slot, slot.mark());
        vec![
            Effect::Send {
                to: conn,
                message: ServerMessage::PlayerAssignment { slot, your_id: conn },
            },
            Effect::Send {
                to: conn,
                message: self.state.into(),
            },
        ]
    }

    fn make_move(&mut self, conn: ConnectionId, index: usize) -> Vec<Effect> {
        let mover = self.players.slot_of(&conn).map(Slot::mark);
        if let Err(reason) = validate_move(&self.state, mover, index) {
            debug!("Ignoring move {} from {}: {}", index, conn, reason);
            return Vec::new();
        }

        self.state = self.state.apply(index);
        info!("{} played {} at {}", conn, self.state.next_mark().other(), index);

        let mut effects = vec![Effect::Broadcast(self.state.into())];
        let winner = match self.state.outcome() {
            Outcome::InProgress => return effects,
            Outcome::Won(mark) => Some(mark),
            Outcome::Draw => None,
        };

        match winner {
            Some(mark) => info!("Game over: {} wins", mark),
            None => info!("Game over: draw"),
        }
        effects.push(Effect::Broadcast(ServerMessage::GameEnd {
            winner,
            players: self.players.players(),
        }));
        effects
    }

    fn reset(&mut self, conn: ConnectionId) -> Vec<Effect> {
        info!("{} reset the game", conn);
        self.state = GameState::initial();
        self.players.clear();
        vec![
            Effect::Broadcast(self.state.into()),
            Effect::Broadcast(ServerMessage::GameReset),
        ]
    }

    fn disconnect(&mut self, conn: ConnectionId) -> Vec<Effect> {
        if let Some(slot) = self.players.unseat(&conn) {
            info!("{} left slot {}", conn, slot);
        }
        Vec::new()
    }

    /// Registry entries, ordered by slot.
    pub fn player_list(&self) -> Vec<PlayerInfo> {
        self.players.players()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Board, Mark};

    fn conn(raw: u32) -> ConnectionId {
        ConnectionId::from_raw(raw)
    }

    fn seated_pair() -> (Session, ConnectionId, ConnectionId) {
        let mut session = Session::new();
        let (a, b) = (conn(1), conn(2));
        session.dispatch(Event::Connect { conn: a });
        session.dispatch(Event::Connect { conn: b });
        (session, a, b)
    }

    fn play(session: &mut Session, moves: &[(ConnectionId, usize)]) {
        for &(conn, index) in moves {
            session.dispatch(Event::Move { conn, index });
        }
    }

    #[test]
    fn new_session_is_empty() {
        let session = Session::new();
        assert_eq!(session.phase(), Phase::Empty);
        assert_eq!(session.state(), GameState::initial());
        assert_eq!(session.player_count(), 0);
    }

    #[test]
    fn first_connect_gets_slot_zero_and_state() {
        let mut session = Session::new();
        let a = conn(1);
        let effects = session.dispatch(Event::Connect { conn: a });
        assert_eq!(
            effects,
            vec![
                Effect::Send {
                    to: a,
                    message: ServerMessage::PlayerAssignment {
                        slot: Slot::First,
                        your_id: a,
                    },
                },
                Effect::Send {
                    to: a,
                    message: GameState::initial().into(),
                },
            ]
        );
        assert_eq!(session.phase(), Phase::WaitingForSecond);
    }

    #[test]
    fn second_connect_gets_slot_one() {
        let (session, a, b) = seated_pair();
        assert_eq!(session.players().slot_of(&a), Some(Slot::First));
        assert_eq!(session.players().slot_of(&b), Some(Slot::Second));
        assert_eq!(session.phase(), Phase::Active);
    }

    #[test]
    fn third_connect_is_rejected_and_closed() {
        let (mut session, _, _) = seated_pair();
        let c = conn(3);
        let effects = session.dispatch(Event::Connect { conn: c });
        assert_eq!(
            effects,
            vec![
                Effect::Send {
                    to: c,
                    message: ServerMessage::RejectConnection {
                        message: GAME_FULL_MESSAGE.to_string(),
                    },
                },
                Effect::Close(c),
            ]
        );
        assert_eq!(session.player_count(), 2);
        assert_eq!(session.players().slot_of(&c), None);
    }

    #[test]
    fn accepted_move_broadcasts_new_state() {
        let (mut session, a, _) = seated_pair();
        let effects = session.dispatch(Event::Move { conn: a, index: 4 });
        let expected = GameState::initial().apply(4);
        assert_eq!(effects, vec![Effect::Broadcast(expected.into())]);
        assert_eq!(session.state(), expected);
        assert!(!session.state().x_is_next);
    }

    #[test]
    fn occupied_then_valid_move_scenario() {
        let (mut session, a, b) = seated_pair();
        session.dispatch(Event::Move { conn: a, index: 4 });

        let before = session.state();
        let effects = session.dispatch(Event::Move { conn: b, index: 4 });
        assert!(effects.is_empty());
        assert_eq!(session.state(), before);

        session.dispatch(Event::Move { conn: b, index: 0 });
        let board = session.state().board;
        assert_eq!(board.get(4), Some(Some(Mark::X)));
        assert_eq!(board.get(0), Some(Some(Mark::O)));
        assert!(session.state().x_is_next);
    }

    #[test]
    fn rejected_moves_leave_state_unchanged() {
        let (mut session, a, b) = seated_pair();
        let stranger = conn(99);
        let before = session.state();

        for event in [
            Event::Move { conn: b, index: 0 },
            Event::Move { conn: stranger, index: 0 },
            Event::Move { conn: a, index: 9 },
            Event::Move { conn: a, index: usize::MAX },
        ] {
            assert!(session.dispatch(event).is_empty(), "{:?}", event);
            assert_eq!(session.state(), before);
        }
    }

    #[test]
    fn same_player_cannot_move_twice() {
        let (mut session, a, _) = seated_pair();
        session.dispatch(Event::Move { conn: a, index: 0 });
        let effects = session.dispatch(Event::Move { conn: a, index: 1 });
        assert!(effects.is_empty());
    }

    #[test]
    fn winning_move_broadcasts_state_then_game_end() {
        let (mut session, a, b) = seated_pair();
        play(&mut session, &[(a, 0), (b, 4), (a, 1), (b, 5)]);

        let effects = session.dispatch(Event::Move { conn: a, index: 2 });
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0], Effect::Broadcast(session.state().into()));
        assert_eq!(
            effects[1],
            Effect::Broadcast(ServerMessage::GameEnd {
                winner: Some(Mark::X),
                players: vec![
                    PlayerInfo { id: a, slot: Slot::First },
                    PlayerInfo { id: b, slot: Slot::Second },
                ],
            })
        );
        assert_eq!(session.phase(), Phase::Finished);
    }

    #[test]
    fn moves_after_a_win_are_ignored_until_reset() {
        let (mut session, a, b) = seated_pair();
        play(&mut session, &[(a, 0), (b, 4), (a, 1), (b, 5), (a, 2)]);
        let finished = session.state();

        assert!(session.dispatch(Event::Move { conn: b, index: 3 }).is_empty());
        assert!(session.dispatch(Event::Move { conn: a, index: 8 }).is_empty());
        assert_eq!(session.state(), finished);
    }

    #[test]
    fn filling_the_board_without_a_winner_ends_in_a_draw() {
        let (mut session, a, b) = seated_pair();
        // X O X / X O O / O X X
        play(
            &mut session,
            &[(a, 0), (b, 1), (a, 2), (b, 4), (a, 3), (b, 5), (a, 7), (b, 6)],
        );
        let effects = session.dispatch(Event::Move { conn: a, index: 8 });
        assert!(session.state().board.is_full());
        assert_eq!(
            effects.last(),
            Some(&Effect::Broadcast(ServerMessage::GameEnd {
                winner: None,
                players: session.player_list(),
            }))
        );
        assert_eq!(session.phase(), Phase::Finished);
    }

    #[test]
    fn reset_restores_initial_state_and_clears_seats() {
        let (mut session, a, b) = seated_pair();
        play(&mut session, &[(a, 0), (b, 4)]);

        let effects = session.dispatch(Event::Reset { conn: b });
        assert_eq!(
            effects,
            vec![
                Effect::Broadcast(GameState::initial().into()),
                Effect::Broadcast(ServerMessage::GameReset),
            ]
        );
        assert_eq!(session.state(), GameState::initial());
        assert_eq!(session.player_count(), 0);
        assert_eq!(session.phase(), Phase::Empty);
    }

    #[test]
    fn reset_unseats_the_requester_too() {
        let (mut session, a, _) = seated_pair();
        session.dispatch(Event::Reset { conn: a });
        assert!(session.dispatch(Event::Move { conn: a, index: 0 }).is_empty());

        let c = conn(3);
        let effects = session.dispatch(Event::Connect { conn: c });
        assert!(matches!(
            effects[0],
            Effect::Send {
                message: ServerMessage::PlayerAssignment { slot: Slot::First, .. },
                ..
            }
        ));
    }

    #[test]
    fn reset_from_unseated_connection_is_allowed() {
        let (mut session, a, _) = seated_pair();
        session.dispatch(Event::Move { conn: a, index: 0 });
        session.dispatch(Event::Reset { conn: conn(42) });
        assert_eq!(session.state(), GameState::initial());
    }

    #[test]
    fn disconnect_frees_the_seat_but_keeps_the_board() {
        let (mut session, a, b) = seated_pair();
        session.dispatch(Event::Move { conn: a, index: 0 });
        let board = session.state();

        let effects = session.dispatch(Event::Disconnect { conn: a });
        assert!(effects.is_empty());
        assert_eq!(session.state(), board);
        assert_eq!(session.player_count(), 1);
        assert_eq!(session.phase(), Phase::WaitingForSecond);
        assert_eq!(session.players().slot_of(&b), Some(Slot::Second));
    }

    #[test]
    fn reconnect_takes_the_freed_slot() {
        let (mut session, a, b) = seated_pair();
        session.dispatch(Event::Disconnect { conn: a });
        let c = conn(3);
        session.dispatch(Event::Connect { conn: c });
        assert_eq!(session.players().slot_of(&c), Some(Slot::First));
        assert_eq!(session.players().slot_of(&b), Some(Slot::Second));
    }

    #[test]
    fn disconnect_of_unknown_connection_is_noop() {
        let (mut session, _, _) = seated_pair();
        session.dispatch(Event::Disconnect { conn: conn(77) });
        assert_eq!(session.player_count(), 2);
    }

    #[test]
    fn connect_after_finish_receives_finished_board() {
        let (mut session, a, b) = seated_pair();
        play(&mut session, &[(a, 0), (b, 4), (a, 1), (b, 5), (a, 2)]);
        session.dispatch(Event::Disconnect { conn: b });

        let c = conn(3);
        let effects = session.dispatch(Event::Connect { conn: c });
        let Effect::Send {
            message: ServerMessage::GameState { board, .. },
            ..
        } = &effects[1]
        else {
            panic!("Expected game state");
        };
        assert_eq!(board.winner(), Some(Mark::X));
        assert_ne!(*board, Board::empty());
    }
}

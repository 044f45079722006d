use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::game::Mark;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session actor is gone")]
    ActorClosed,
}

/// Maximum number of seated players
pub const MAX_PLAYERS: usize = 2;

const CONNECTION_ID_PREFIX: &str = "conn_";

/// Opaque per-connection identity, rendered as `conn_` + 8 hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:08x}", CONNECTION_ID_PREFIX, self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix(CONNECTION_ID_PREFIX).unwrap_or(s);
        u32::from_str_radix(hex, 16).map(Self)
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(&s), &"conn_ + 8 hex digits"))
    }
}

/// A player's seat. Slot 0 plays X and moves first, slot 1 plays O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub const ALL: [Slot; MAX_PLAYERS] = [Slot::First, Slot::Second];

    pub fn index(self) -> u8 {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }

    pub fn mark(self) -> Mark {
        match self {
            Slot::First => Mark::X,
            Slot::Second => Mark::O,
        }
    }
}

impl TryFrom<u8> for Slot {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Slot::First),
            1 => Ok(Slot::Second),
            other => Err(other),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.index())
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Slot::try_from(raw).map_err(|v| {
            de::Error::invalid_value(Unexpected::Unsigned(v.into()), &"slot 0 or 1")
        })
    }
}

/// One registry entry as published in `game_end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: ConnectionId,
    pub slot: Slot,
}

/// Connection-to-slot assignments; at most [`MAX_PLAYERS`] entries, slots unique.
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    seats: HashMap<ConnectionId, Slot>,
}

impl PlayerRegistry {
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= MAX_PLAYERS
    }

    pub fn slot_of(&self, conn: &ConnectionId) -> Option<Slot> {
        self.seats.get(conn).copied()
    }

    /// Seats `conn` in the lowest free slot. `None` when the table is full
    /// or `conn` is already seated.
    pub(crate) fn seat(&mut self, conn: ConnectionId) -> Option<Slot> {
        if self.is_full() || self.seats.contains_key(&conn) {
            return None;
        }
        let slot = Slot::ALL
            .into_iter()
            .find(|slot| !self.seats.values().any(|taken| taken == slot))?;
        self.seats.insert(conn, slot);
        Some(slot)
    }

    pub(crate) fn unseat(&mut self, conn: &ConnectionId) -> Option<Slot> {
        self.seats.remove(conn)
    }

    pub(crate) fn clear(&mut self) {
        self.seats.clear();
    }

    /// Entries ordered by slot.
    pub fn players(&self) -> Vec<PlayerInfo> {
        let mut players: Vec<PlayerInfo> = self
            .seats
            .iter()
            .map(|(&id, &slot)| PlayerInfo { id, slot })
            .collect();
        players.sort_by_key(|p| p.slot);
        players
    }
}

/// Serialized frame ready for the socket. Cloning is O(1), so a broadcast
/// serializes once and hands the same bytes to every connection.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// Item on a connection's outbound queue
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(OutboundMessage),
    /// Keepalive probe
    Ping,
    /// Send a close frame and end the connection
    Close,
}

//! Wire message types and serialization.
//!
//! All messages are serialized with [`postcard`] and prefixed with a wire
//! version byte. Use [`serialize_message`] and [`deserialize_message`] for
//! encoding/decoding.
//!
//! Two separate streams share one connection: the hot state stream
//! ([`ServerMessage::StateFull`] / [`ServerMessage::StateDelta`]) and the
//! rare, high-value identity channel ([`ServerMessage::PlayerJoined`] /
//! [`ServerMessage::PlayerUpdated`]). Identity changes never ride inside
//! state payloads — mixing them would bloat the hot path.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use slipstream_state::{RoomState, RoomStateDelta};

/// Current wire-format version. Prepended to every serialized message.
pub const WIRE_VERSION: u8 = 1;

/// Application protocol version negotiated in [`JoinRoom`]. The server
/// rejects joins carrying a different value.
pub const PROTOCOL_VERSION: u16 = 3;

// ---------------------------------------------------------------------------
// Top-level enums
// ---------------------------------------------------------------------------

/// Messages sent by clients. The enum discriminant is the type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    /// Join (or re-join) a room.
    JoinRoom(JoinRoom),
    /// Request a fresh full snapshot after reconciliation failed.
    RequestStateFull {
        /// Last known room id.
        room_id: String,
    },
    /// Controller input for one frame.
    Input(InputFrame),
    /// Change the display name.
    UpdateUsername(PlayerUpdate),
    /// Cycle the room radio to the next station.
    RadioCycle {
        /// Room whose radio to cycle.
        room_id: String,
    },
}

/// Messages sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMessage {
    /// Room identity, roster, and track — sent once after a join, out of
    /// band from the position stream.
    RoomInfo(RoomInfoMsg),
    /// Complete room snapshot.
    StateFull(RoomState),
    /// Incremental update against the client's last full snapshot.
    StateDelta(RoomStateDelta),
    /// Identity channel: a player joined the room.
    PlayerJoined(PlayerUpdate),
    /// Identity channel: a player changed their name.
    PlayerUpdated(PlayerUpdate),
    /// Human-readable error report.
    ErrorMessage(ErrorMessage),
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// What a connection is for: watching the race or driving a car.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    /// Renders the room state.
    Viewer,
    /// Sends input for one car.
    Controller,
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinRoom {
    /// Viewer or controller.
    pub role: Role,
    /// Application protocol version the client speaks.
    pub protocol_version: u16,
    /// Room to join.
    pub room_id: String,
    /// The joining player's stable identity.
    pub player_id: String,
    /// Token from a previous session, for re-joining after a reconnect.
    pub session_token: Option<u64>,
}

/// Room identity and roster, the server's out-of-band reply to a join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomInfoMsg {
    /// Room identifier.
    pub room_id: String,
    /// The receiving player's identity within the room.
    pub player_id: String,
    /// The role the server granted.
    pub role: Role,
    /// Track the room races on.
    pub track_id: String,
    /// Current roster.
    pub players: Vec<PlayerEntry>,
    /// Token to present when re-joining.
    pub session_token: Option<u64>,
    /// Protocol version the server speaks.
    pub protocol_version: Option<u16>,
    /// Server build identifier, for diagnostics.
    pub server_version: Option<String>,
}

/// One roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntry {
    /// Stable player identity.
    pub player_id: String,
    /// Display name as announced (may be blank; consumers normalize).
    pub username: String,
}

/// Controller input for one frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputFrame {
    /// Room the input applies to.
    pub room_id: String,
    /// Car being driven.
    pub player_id: String,
    /// Steering, -1.0 (full left) to 1.0 (full right).
    pub steer: f64,
    /// Throttle, 0.0 to 1.0.
    pub throttle: f64,
    /// Brake, 0.0 to 1.0.
    pub brake: f64,
    /// One-shot actions triggered this frame.
    pub actions: Vec<InputAction>,
}

/// One-shot controller actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputAction {
    /// Spend a turbo charge.
    Turbo,
    /// Fire a missile.
    FireMissile,
}

/// Identity-channel payload for joins and username changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerUpdate {
    /// Room the player belongs to.
    pub room_id: String,
    /// Stable player identity.
    pub player_id: String,
    /// Display name.
    pub username: String,
}

/// Human-readable error report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorMessage {
    /// What went wrong.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during message deserialization.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload — no version byte")]
    EmptyPayload,

    /// The version byte does not match [`WIRE_VERSION`].
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard deserialization failed.
    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a message into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded body]`
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(WIRE_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload.
///
/// Returns an error if the version is unsupported or the payload is malformed.
pub fn deserialize_message<T: DeserializeOwned>(data: &[u8]) -> Result<T, MessageError> {
    if data.is_empty() {
        return Err(MessageError::EmptyPayload);
    }

    let version = data[0];
    if version != WIRE_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }

    let msg = postcard::from_bytes(&data[1..])?;
    Ok(msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Client protocol state machine.
//!
//! Drives one connection through `Disconnected → Connecting → Joined →
//! Synchronized`, maps decoded server messages onto the [`StateStore`], and
//! runs the delta reconciler. When reconciliation fails the machine emits a
//! fire-and-forget resync request and drops back to `Joined` until a fresh
//! full snapshot re-anchors it — there are no sequence numbers.
//!
//! This layer never retries or throttles anything: resync requests are not
//! rate limited (a flooding caller must limit itself), and after a
//! transport-level reconnect the caller must call [`ClientProtocol::connect`]
//! again — re-joining is not automatic here.

use slipstream_state::{RoomState, reconcile};
use slipstream_store::{PlayerInfo, StateStore};

use crate::messages::{ClientMessage, JoinRoom, PROTOCOL_VERSION, Role, ServerMessage};

/// Protocol position of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No transport, or the transport dropped.
    Disconnected,
    /// Join message sent, waiting for room info.
    Connecting,
    /// Room identity known; no usable snapshot yet.
    Joined,
    /// Holding a reconciled snapshot; deltas apply.
    Synchronized,
}

/// Per-connection protocol driver. Owns the last full snapshot used as the
/// reconciliation base; the merged result of every message is pushed into
/// the [`StateStore`] for consumers.
pub struct ClientProtocol {
    role: Role,
    room_id: String,
    player_id: String,
    session_token: Option<u64>,
    phase: ConnectionPhase,
    base: Option<RoomState>,
    resync_requests: u64,
}

impl ClientProtocol {
    /// Creates a protocol driver for one room membership.
    pub fn new(role: Role, room_id: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            role,
            room_id: room_id.into(),
            player_id: player_id.into(),
            session_token: None,
            phase: ConnectionPhase::Disconnected,
            base: None,
            resync_requests: 0,
        }
    }

    /// Current protocol phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Number of resync requests issued so far. Callers that want to rate
    /// limit resync storms watch this counter.
    pub fn resync_requests(&self) -> u64 {
        self.resync_requests
    }

    /// Begins (or restarts) the join handshake. Returns the join message to
    /// send. Any previously held snapshot is discarded — after a transport
    /// reconnect the first usable state is always a fresh full snapshot.
    pub fn connect(&mut self) -> ClientMessage {
        self.phase = ConnectionPhase::Connecting;
        self.base = None;
        ClientMessage::JoinRoom(JoinRoom {
            role: self.role,
            protocol_version: PROTOCOL_VERSION,
            room_id: self.room_id.clone(),
            player_id: self.player_id.clone(),
            session_token: self.session_token,
        })
    }

    /// Reports a transport-level disconnect. The caller is responsible for
    /// re-establishing the transport and calling [`connect`] again.
    ///
    /// [`connect`]: ClientProtocol::connect
    pub fn on_disconnect(&mut self) {
        tracing::info!(room = %self.room_id, "transport disconnected");
        self.phase = ConnectionPhase::Disconnected;
        self.base = None;
    }

    /// Handles one decoded server message, updating `store` and returning a
    /// message to send back, if any.
    pub fn handle_message(
        &mut self,
        msg: ServerMessage,
        store: &StateStore,
    ) -> Option<ClientMessage> {
        match msg {
            ServerMessage::RoomInfo(info) => {
                self.room_id = info.room_id.clone();
                if info.session_token.is_some() {
                    self.session_token = info.session_token;
                }
                if self.phase == ConnectionPhase::Connecting {
                    self.phase = ConnectionPhase::Joined;
                }
                store.set_room_info(
                    info.room_id,
                    info.player_id,
                    info.track_id,
                    info.players
                        .into_iter()
                        .map(|p| PlayerInfo::normalized(p.player_id, p.username))
                        .collect(),
                );
                None
            }

            ServerMessage::StateFull(state) => {
                // The full snapshot is the sole re-anchoring point.
                self.base = Some(state.clone());
                self.phase = ConnectionPhase::Synchronized;
                store.update_state(state);
                None
            }

            ServerMessage::StateDelta(delta) => match reconcile(self.base.as_ref(), &delta) {
                Some(next) => {
                    self.base = Some(next.clone());
                    store.update_state(next);
                    None
                }
                None => {
                    // No base to merge onto: ask for a full snapshot and
                    // wait. Fire-and-forget; no timeout or retry here.
                    self.resync_requests += 1;
                    if self.phase == ConnectionPhase::Synchronized {
                        self.phase = ConnectionPhase::Joined;
                    }
                    tracing::warn!(
                        room = %self.room_id,
                        requests = self.resync_requests,
                        "reconciliation failed, requesting full state"
                    );
                    Some(ClientMessage::RequestStateFull {
                        room_id: self.room_id.clone(),
                    })
                }
            },

            // Identity channel: roster only, never the state stream.
            ServerMessage::PlayerJoined(update) | ServerMessage::PlayerUpdated(update) => {
                store.upsert_player(&update.player_id, &update.username);
                None
            }

            ServerMessage::ErrorMessage(err) => {
                tracing::warn!(room = %self.room_id, "server error: {}", err.message);
                None
            }
        }
    }
}

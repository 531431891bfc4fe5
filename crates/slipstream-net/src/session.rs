//! Connection lifecycle and room membership on the server.
//!
//! Tracks the state machine for each connection: Connected → Joined →
//! Disconnecting → Removed. Provides timeout detection for stale sessions
//! and the room-membership lookups the broadcast path needs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::ConnectionId;
use crate::messages::{JoinRoom, PROTOCOL_VERSION, Role};

/// State machine for a client connection's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, waiting for a join message.
    Connected,
    /// Join accepted, member of a room.
    Joined,
    /// Disconnect initiated, cleaning up resources.
    Disconnecting,
    /// Cleanup complete, entry can be removed.
    Removed,
}

/// Per-connection session data.
pub struct Session {
    /// The underlying TCP connection identifier.
    pub connection_id: ConnectionId,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Room this connection joined (empty while `Connected`).
    pub room_id: String,
    /// Player identity within the room.
    pub player_id: String,
    /// Display name (may be blank until announced).
    pub username: String,
    /// Viewer or controller.
    pub role: Role,
    /// Token the client presents when re-joining after a reconnect.
    pub session_token: u64,
    /// Timestamp of the last received message, for timeout detection.
    pub last_activity: Instant,
}

/// Reasons a join is rejected.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// No session exists for the given connection.
    #[error("session not found for connection")]
    SessionNotFound,
    /// The session is not in a joinable state.
    #[error("invalid session state for join: {0:?}")]
    InvalidState(SessionState),
    /// The client speaks a different protocol version. Rejected rather
    /// than warned: a version-skewed viewer would silently desynchronize.
    #[error("protocol version mismatch: client {client}, server {server}")]
    ProtocolMismatch {
        /// Version the client announced.
        client: u16,
        /// Version this server speaks.
        server: u16,
    },
    /// The player id was empty.
    #[error("player id cannot be empty")]
    EmptyPlayerId,
}

/// Manages all active sessions and provides lifecycle operations.
pub struct SessionManager {
    /// Map from connection id to session.
    sessions: RwLock<HashMap<ConnectionId, Session>>,
    /// Map from (room_id, player_id) to connection id, for identity lookups.
    player_index: RwLock<HashMap<(String, String), ConnectionId>>,
    /// Monotonic session-token generator.
    next_token: AtomicU64,
}

impl SessionManager {
    /// Create a new empty session manager.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            player_index: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Called when a new TCP connection is accepted. Creates a session in
    /// the `Connected` state.
    pub async fn on_connect(&self, connection_id: ConnectionId) {
        let session = Session {
            connection_id,
            state: SessionState::Connected,
            room_id: String::new(),
            player_id: String::new(),
            username: String::new(),
            role: Role::Viewer,
            session_token: 0,
            last_activity: Instant::now(),
        };
        self.sessions.write().await.insert(connection_id, session);
    }

    /// Process a join message. Validates the protocol version and player
    /// id, binds the connection to the room, and returns the session token
    /// the client should present on a future re-join.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        join: &JoinRoom,
    ) -> Result<u64, JoinError> {
        if join.protocol_version != PROTOCOL_VERSION {
            return Err(JoinError::ProtocolMismatch {
                client: join.protocol_version,
                server: PROTOCOL_VERSION,
            });
        }
        if join.player_id.is_empty() {
            return Err(JoinError::EmptyPlayerId);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&connection_id)
            .ok_or(JoinError::SessionNotFound)?;

        if session.state != SessionState::Connected {
            return Err(JoinError::InvalidState(session.state));
        }

        // A presented token is honored as-is (re-join after reconnect);
        // otherwise a fresh one is issued.
        let token = join
            .session_token
            .unwrap_or_else(|| self.next_token.fetch_add(1, Ordering::Relaxed));

        session.state = SessionState::Joined;
        session.room_id = join.room_id.clone();
        session.player_id = join.player_id.clone();
        session.role = join.role;
        session.session_token = token;
        session.last_activity = Instant::now();

        drop(sessions);
        self.player_index
            .write()
            .await
            .insert((join.room_id.clone(), join.player_id.clone()), connection_id);

        Ok(token)
    }

    /// Initiate disconnect for a connection. Returns the (room, player)
    /// membership the connection held, if it had joined.
    pub async fn on_disconnect(&self, connection_id: ConnectionId) -> Option<(String, String)> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&connection_id)?;

        if session.state == SessionState::Removed {
            return None;
        }

        session.state = SessionState::Disconnecting;
        let membership = (!session.room_id.is_empty())
            .then(|| (session.room_id.clone(), session.player_id.clone()));

        tracing::info!(
            "connection {:?} (player '{}') disconnecting",
            connection_id,
            session.player_id
        );

        session.state = SessionState::Removed;
        sessions.remove(&connection_id);
        drop(sessions);

        if let Some(key) = &membership {
            let mut index = self.player_index.write().await;
            // Only remove if this connection still owns the entry; a
            // re-join from a new connection may have replaced it.
            if index.get(key) == Some(&connection_id) {
                index.remove(key);
            }
        }

        membership
    }

    /// Update the stored username for a joined connection.
    pub async fn set_username(&self, connection_id: &ConnectionId, username: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(connection_id) {
            session.username = username.to_string();
        }
    }

    /// Update the last-activity timestamp for a connection.
    pub async fn touch(&self, connection_id: &ConnectionId) {
        if let Some(session) = self.sessions.write().await.get_mut(connection_id) {
            session.last_activity = Instant::now();
        }
    }

    /// Get the current state of a session.
    pub async fn state(&self, connection_id: &ConnectionId) -> Option<SessionState> {
        self.sessions
            .read()
            .await
            .get(connection_id)
            .map(|s| s.state)
    }

    /// Room a connection has joined, if any.
    pub async fn room_of(&self, connection_id: &ConnectionId) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(connection_id)
            .filter(|s| s.state == SessionState::Joined)
            .map(|s| s.room_id.clone())
    }

    /// All joined connections that are members of `room_id`.
    pub async fn members_of_room(&self, room_id: &str) -> Vec<ConnectionId> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.state == SessionState::Joined && s.room_id == room_id)
            .map(|s| s.connection_id)
            .collect()
    }

    /// Connection currently bound to a (room, player) identity.
    pub async fn connection_for_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Option<ConnectionId> {
        self.player_index
            .read()
            .await
            .get(&(room_id.to_string(), player_id.to_string()))
            .copied()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan all sessions and disconnect any that have exceeded the timeout.
/// Returns the memberships that were dropped so the caller can update
/// rooms and close writers.
pub async fn timeout_check(
    session_manager: &SessionManager,
    timeout: Duration,
) -> Vec<(ConnectionId, String, String)> {
    let sessions = session_manager.sessions.read().await;
    let stale: Vec<ConnectionId> = sessions
        .iter()
        .filter(|(_, s)| s.state == SessionState::Joined && s.last_activity.elapsed() > timeout)
        .map(|(id, _)| *id)
        .collect();
    drop(sessions);

    let mut dropped = Vec::new();
    for id in stale {
        tracing::warn!("connection {:?} timed out", id);
        if let Some((room, player)) = session_manager.on_disconnect(id).await {
            dropped.push((id, room, player));
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join_msg(room: &str, player: &str) -> JoinRoom {
        JoinRoom {
            role: Role::Controller,
            protocol_version: PROTOCOL_VERSION,
            room_id: room.to_string(),
            player_id: player.to_string(),
            session_token: None,
        }
    }

    #[tokio::test]
    async fn test_new_connection_starts_connected() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;
        assert_eq!(sm.state(&cid).await, Some(SessionState::Connected));
    }

    #[tokio::test]
    async fn test_successful_join_transitions_to_joined() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;

        let token = sm.join(cid, &join_msg("r1", "a")).await.unwrap();
        assert!(token > 0);
        assert_eq!(sm.state(&cid).await, Some(SessionState::Joined));
        assert_eq!(sm.room_of(&cid).await.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_protocol_mismatch_rejected() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;

        let mut join = join_msg("r1", "a");
        join.protocol_version = PROTOCOL_VERSION + 1;
        let result = sm.join(cid, &join).await;
        assert!(matches!(result, Err(JoinError::ProtocolMismatch { .. })));
        assert_eq!(sm.state(&cid).await, Some(SessionState::Connected));
    }

    #[tokio::test]
    async fn test_empty_player_id_rejected() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;

        let result = sm.join(cid, &join_msg("r1", "")).await;
        assert!(matches!(result, Err(JoinError::EmptyPlayerId)));
    }

    #[tokio::test]
    async fn test_double_join_rejected() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;
        sm.join(cid, &join_msg("r1", "a")).await.unwrap();

        let result = sm.join(cid, &join_msg("r1", "a")).await;
        assert!(matches!(
            result,
            Err(JoinError::InvalidState(SessionState::Joined))
        ));
    }

    #[tokio::test]
    async fn test_presented_token_is_honored() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;

        let mut join = join_msg("r1", "a");
        join.session_token = Some(424242);
        let token = sm.join(cid, &join).await.unwrap();
        assert_eq!(token, 424242);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;
        sm.join(cid, &join_msg("r1", "a")).await.unwrap();

        let membership = sm.on_disconnect(cid).await;
        assert_eq!(
            membership,
            Some(("r1".to_string(), "a".to_string()))
        );
        assert_eq!(sm.state(&cid).await, None);
        assert_eq!(sm.connection_for_player("r1", "a").await, None);
    }

    #[tokio::test]
    async fn test_rejoin_from_new_connection_replaces_index() {
        let sm = SessionManager::new();

        let cid1 = ConnectionId(1);
        sm.on_connect(cid1).await;
        sm.join(cid1, &join_msg("r1", "a")).await.unwrap();

        // Same identity re-joins from a new connection (reconnect).
        let cid2 = ConnectionId(2);
        sm.on_connect(cid2).await;
        sm.join(cid2, &join_msg("r1", "a")).await.unwrap();
        assert_eq!(sm.connection_for_player("r1", "a").await, Some(cid2));

        // The old connection's disconnect must not evict the new binding.
        sm.on_disconnect(cid1).await;
        assert_eq!(sm.connection_for_player("r1", "a").await, Some(cid2));
    }

    #[tokio::test]
    async fn test_members_of_room() {
        let sm = SessionManager::new();
        for (i, (room, player)) in [("r1", "a"), ("r1", "b"), ("r2", "c")].iter().enumerate() {
            let cid = ConnectionId(i as u64 + 1);
            sm.on_connect(cid).await;
            sm.join(cid, &join_msg(room, player)).await.unwrap();
        }

        let mut members = sm.members_of_room("r1").await;
        members.sort_by_key(|c| c.0);
        assert_eq!(members, vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(sm.members_of_room("r2").await, vec![ConnectionId(3)]);
        assert!(sm.members_of_room("empty").await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_triggers_disconnect() {
        let sm = SessionManager::new();
        let cid = ConnectionId(1);
        sm.on_connect(cid).await;
        sm.join(cid, &join_msg("r1", "a")).await.unwrap();

        {
            let mut sessions = sm.sessions.write().await;
            if let Some(session) = sessions.get_mut(&cid) {
                session.last_activity = Instant::now() - Duration::from_secs(60);
            }
        }

        let dropped = timeout_check(&sm, Duration::from_secs(15)).await;
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].1, "r1");
        assert_eq!(sm.state(&cid).await, None);
    }
}

//! Client-side state store: the latest reconciled snapshot, room and roster
//! identity, and fan-out to render/UI consumers.
//!
//! Two independent observer registries (room-info, state) deliver values to
//! subscribers. Subscribing synchronously replays the last known value
//! *before* returning, then streams future values — a component mounted
//! after data already arrived still renders immediately. Notification
//! iterates a snapshot of the registry, so cancelling a subscription from
//! inside a callback is safe and never skips delivery to the remaining
//! listeners.
//!
//! The store is single-threaded by design: each peer runs one cooperative
//! frame loop, message handling is synchronous with respect to store
//! mutation and fan-out, and there is no shared mutable state across
//! execution contexts — hence `Rc`/`RefCell`, no locks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use slipstream_state::RoomState;

/// One known participant identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    /// Stable player identity.
    pub player_id: String,
    /// Display name; never blank (normalized to the id).
    pub username: String,
}

impl PlayerInfo {
    /// Builds an entry, defaulting a blank username to the player id.
    pub fn normalized(player_id: impl Into<String>, username: impl Into<String>) -> Self {
        let player_id = player_id.into();
        let username = username.into();
        let username = if username.trim().is_empty() {
            player_id.clone()
        } else {
            username
        };
        Self {
            player_id,
            username,
        }
    }
}

/// Room identity and roster as announced out-of-band at join time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomInfo {
    /// Room identifier.
    pub room_id: String,
    /// The local player's identity within the room.
    pub player_id: String,
    /// Track the room races on.
    pub track_id: String,
    /// Known participants.
    pub players: Vec<PlayerInfo>,
}

/// Handle returned by `on_room_info` / `on_state`. Call [`cancel`] to stop
/// receiving values; dropping the handle alone does not unsubscribe.
///
/// [`cancel`]: Subscription::cancel
#[derive(Debug, Clone)]
pub struct Subscription {
    active: Rc<Cell<bool>>,
}

impl Subscription {
    /// Deactivates the subscription. Safe to call from within a
    /// notification callback; the registry entry is pruned lazily.
    pub fn cancel(&self) {
        self.active.set(false);
    }

    /// Whether the subscription still receives values.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct RegistryEntry<T> {
    active: Rc<Cell<bool>>,
    callback: Callback<T>,
}

/// Observer registry for one topic.
struct Registry<T> {
    entries: RefCell<Vec<RegistryEntry<T>>>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> (Subscription, Callback<T>) {
        let active = Rc::new(Cell::new(true));
        let callback: Callback<T> = Rc::new(RefCell::new(callback));
        self.entries.borrow_mut().push(RegistryEntry {
            active: Rc::clone(&active),
            callback: Rc::clone(&callback),
        });
        (Subscription { active }, callback)
    }

    /// Delivers `value` to every listener that was subscribed when the
    /// notification began and is still active when its turn comes.
    fn notify(&self, value: &T) {
        // Stable snapshot: entries added or cancelled by a callback affect
        // later notifications, not this fan-out pass.
        let snapshot: Vec<(Rc<Cell<bool>>, Callback<T>)> = self
            .entries
            .borrow()
            .iter()
            .map(|e| (Rc::clone(&e.active), Rc::clone(&e.callback)))
            .collect();

        for (active, callback) in snapshot {
            if active.get() {
                (callback.borrow_mut())(value);
            }
        }

        self.entries.borrow_mut().retain(|e| e.active.get());
    }
}

/// Holds the current room snapshot plus identity metadata and publishes
/// both to subscribers. One store instance holds exactly one "current"
/// snapshot, replaced wholesale on each successful reconciliation.
pub struct StateStore {
    state: RefCell<Option<RoomState>>,
    room_info: RefCell<Option<RoomInfo>>,
    state_subs: Registry<RoomState>,
    room_subs: Registry<RoomInfo>,
}

impl StateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(None),
            room_info: RefCell::new(None),
            state_subs: Registry::new(),
            room_subs: Registry::new(),
        }
    }

    /// Replaces room identity and roster, normalizing each player entry,
    /// and notifies room-info subscribers.
    pub fn set_room_info(
        &self,
        room_id: impl Into<String>,
        player_id: impl Into<String>,
        track_id: impl Into<String>,
        players: Vec<PlayerInfo>,
    ) {
        let info = RoomInfo {
            room_id: room_id.into(),
            player_id: player_id.into(),
            track_id: track_id.into(),
            players: players
                .into_iter()
                .map(|p| PlayerInfo::normalized(p.player_id, p.username))
                .collect(),
        };
        tracing::debug!(
            room = %info.room_id,
            players = info.players.len(),
            "room info replaced"
        );
        *self.room_info.borrow_mut() = Some(info.clone());
        self.room_subs.notify(&info);
    }

    /// Replaces the held snapshot wholesale and notifies state subscribers.
    ///
    /// Identities appearing in the snapshot's car or race-entry lists that
    /// were never announced via room info (late-joining NPCs) are harvested
    /// into the roster first, with a room-info notification when the roster
    /// grows.
    pub fn update_state(&self, state: RoomState) {
        self.harvest_identities(&state);
        *self.state.borrow_mut() = Some(state);
        let state = self.state.borrow();
        if let Some(state) = state.as_ref() {
            self.state_subs.notify(state);
        }
    }

    /// Inserts or updates one roster entry (the identity channel:
    /// `player_joined` / `player_updated`) and notifies room-info
    /// subscribers.
    pub fn upsert_player(&self, player_id: &str, username: &str) {
        let entry = PlayerInfo::normalized(player_id, username);
        let updated = {
            let mut info = self.room_info.borrow_mut();
            let info = info.get_or_insert_with(RoomInfo::default);
            match info.players.iter_mut().find(|p| p.player_id == player_id) {
                Some(existing) if *existing == entry => None,
                Some(existing) => {
                    *existing = entry;
                    Some(info.clone())
                }
                None => {
                    info.players.push(entry);
                    Some(info.clone())
                }
            }
        };
        if let Some(info) = updated {
            self.room_subs.notify(&info);
        }
    }

    /// Subscribes to room-info values. The last known value, if any, is
    /// delivered synchronously before this returns.
    pub fn on_room_info(&self, callback: impl FnMut(&RoomInfo) + 'static) -> Subscription {
        let (subscription, callback) = self.room_subs.subscribe(callback);
        if let Some(info) = self.room_info.borrow().as_ref() {
            (callback.borrow_mut())(info);
        }
        subscription
    }

    /// Subscribes to snapshot values. The last known value, if any, is
    /// delivered synchronously before this returns.
    pub fn on_state(&self, callback: impl FnMut(&RoomState) + 'static) -> Subscription {
        let (subscription, callback) = self.state_subs.subscribe(callback);
        if let Some(state) = self.state.borrow().as_ref() {
            (callback.borrow_mut())(state);
        }
        subscription
    }

    /// The current snapshot, if one has been received.
    pub fn current_state(&self) -> Option<RoomState> {
        self.state.borrow().clone()
    }

    /// The current room info, if announced.
    pub fn current_room_info(&self) -> Option<RoomInfo> {
        self.room_info.borrow().clone()
    }

    fn harvest_identities(&self, state: &RoomState) {
        let announced = state
            .cars
            .iter()
            .map(|c| (c.player_id.as_str(), c.username.as_deref().unwrap_or("")))
            .chain(
                state
                    .race
                    .players
                    .iter()
                    .map(|p| (p.player_id.as_str(), p.username.as_deref().unwrap_or(""))),
            );

        let mut grown = None;
        {
            let mut info = self.room_info.borrow_mut();
            let info = info.get_or_insert_with(RoomInfo::default);
            for (player_id, username) in announced {
                if !info.players.iter().any(|p| p.player_id == player_id) {
                    tracing::debug!(player = player_id, "harvested unannounced identity");
                    info.players.push(PlayerInfo::normalized(player_id, username));
                    grown = Some(info.clone());
                }
            }
        }
        if let Some(info) = grown {
            self.room_subs.notify(&info);
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Snapshot types for one race room.
//!
//! Entity collections (`cars`, `missiles`, `items`) are keyed by a stable
//! identity string; key uniqueness within a collection is an invariant the
//! server maintains and [`crate::reconcile`] preserves. Collection order is
//! insignificant — consumers must never depend on it.
//!
//! All structs are `#[serde(default)]`: optional wire fields that are absent
//! deserialize to defaults. Payloads are not validated at the transport
//! boundary, so downstream consumers tolerate missing fields this way.

use serde::{Deserialize, Serialize};

/// Complete point-in-time state of one room, as broadcast by the server.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RoomState {
    /// Room identifier.
    pub room_id: String,
    /// Identifier of the track the race runs on.
    pub track_id: String,
    /// Server simulation time in seconds.
    pub server_time: f64,
    /// All cars, keyed by `player_id`.
    pub cars: Vec<CarState>,
    /// All in-flight missiles, keyed by `id`.
    pub missiles: Vec<MissileState>,
    /// All spawned pickup items, keyed by `id`.
    pub items: Vec<ItemState>,
    /// Current radio station state.
    pub radio: RadioState,
    /// Race progression state.
    pub race: RaceState,
}

impl RoomState {
    /// Returns the car with the given `player_id`, if present.
    pub fn car(&self, player_id: &str) -> Option<&CarState> {
        self.cars.iter().find(|c| c.player_id == player_id)
    }

    /// Mutable lookup of a car by `player_id`.
    pub fn car_mut(&mut self, player_id: &str) -> Option<&mut CarState> {
        self.cars.iter_mut().find(|c| c.player_id == player_id)
    }
}

/// One car on the track.
///
/// Positions are world units on the horizontal plane (`x`, `z`); `angle` is
/// the heading in radians; `speed` is signed, its magnitude bounded by the
/// simulation (not enforced here).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CarState {
    /// Stable identity of the controlling player (or NPC).
    pub player_id: String,
    /// Display name, if one has been announced.
    pub username: Option<String>,
    /// World X position.
    pub x: f64,
    /// World Z position.
    pub z: f64,
    /// Heading in radians.
    pub angle: f64,
    /// Signed speed in world units per second.
    pub speed: f64,
    /// `true` for server-driven cars with no connected controller.
    pub is_npc: bool,
    /// Whether a turbo boost is currently active.
    pub turbo_active: bool,
    /// Stored turbo charges.
    pub turbo_charges: u32,
    /// Progress toward the next turbo charge, 0.0–1.0.
    pub turbo_recharge: f64,
    /// Seconds of active turbo remaining.
    pub turbo_duration_left: f64,
    /// Stored missile charges.
    pub missile_charges: u32,
    /// Progress toward the next missile charge, 0.0–1.0.
    pub missile_recharge: f64,
    /// Seconds of impact spin-out remaining after being hit.
    pub impact_spin_time_left: f64,
}

/// One in-flight missile.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MissileState {
    /// Stable missile identity.
    pub id: String,
    /// `player_id` of the car that fired it.
    pub owner_id: String,
    /// World X position.
    pub x: f64,
    /// World Z position.
    pub z: f64,
    /// Heading in radians.
    pub angle: f64,
    /// Signed speed in world units per second.
    pub speed: f64,
    /// Car this missile is homing toward, if locked.
    pub target_id: Option<String>,
}

/// Pickup categories. Items are atomic spawn/pickup entities — they exist,
/// then they don't; no field of an item ever changes while it is spawned.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemKind {
    /// Grants a turbo charge.
    #[default]
    Nitro,
    /// Grants a missile charge.
    Shoot,
}

/// One pickup item on the track.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ItemState {
    /// Stable item identity.
    pub id: String,
    /// What picking this item up grants.
    pub kind: ItemKind,
    /// World X position.
    pub x: f64,
    /// World Z position.
    pub z: f64,
    /// Visual orientation in radians.
    pub angle: f64,
}

/// In-room radio state. Replaced whole-value by deltas, never merged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RadioState {
    /// Index of the active station.
    pub station: u32,
    /// Title of the currently playing track, for display.
    pub track_title: String,
}

/// Phase of the race lifecycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RacePhase {
    /// Waiting for players.
    #[default]
    Lobby,
    /// Countdown to the start.
    Countdown,
    /// Race in progress.
    Running,
    /// All participants finished or timed out.
    Finished,
}

/// Race progression, replaced whole-value by deltas.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RaceState {
    /// Current phase.
    pub phase: RacePhase,
    /// Seconds left on the start countdown (meaningful in `Countdown`).
    pub countdown: f64,
    /// Total laps in this race.
    pub laps_total: u32,
    /// Per-participant progression, keyed by `player_id`.
    pub players: Vec<RaceEntry>,
}

/// One participant's race progression.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RaceEntry {
    /// Stable identity of the participant.
    pub player_id: String,
    /// Display name, if announced.
    pub username: Option<String>,
    /// Current lap number (1-based once running).
    pub lap: u32,
    /// Whether this participant has crossed the final finish line.
    pub finished: bool,
    /// Best single-lap time in seconds, if any lap is complete.
    pub best_lap_time: Option<f64>,
}

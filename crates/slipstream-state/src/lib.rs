//! Replicated race state: the authoritative room snapshot, incremental
//! deltas, and the pure functions that produce and apply them.
//!
//! The server owns one [`RoomState`] per room and broadcasts either full
//! snapshots or [`RoomStateDelta`]s produced by [`diff`]. Clients rebuild a
//! consistent snapshot by merging deltas onto their last full snapshot with
//! [`reconcile`]; a failed merge is signalled by `None`, never an error.

pub mod delta;
pub mod diff;
pub mod reconcile;
pub mod state;

pub use delta::{CarPatch, CarSetDelta, ItemSetDelta, MissilePatch, MissileSetDelta, RoomStateDelta};
pub use diff::diff;
pub use reconcile::reconcile;
pub use state::{
    CarState, ItemKind, ItemState, MissileState, RaceEntry, RacePhase, RaceState, RadioState,
    RoomState,
};

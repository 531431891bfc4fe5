//! Incremental room-state deltas.
//!
//! A [`RoomStateDelta`] has the same top-level shape as
//! [`RoomState`](crate::RoomState) with every field optional: an absent
//! field means "unchanged", never "clear". The id-keyed collections carry
//! explicit added/updated/removed sets; `updated` entries are per-entity
//! patch types with one `Option` per mutable field and a named merge
//! function, so partial updates are a declared contract rather than implicit
//! structural spreading.
//!
//! Items carry only added/removed — they are atomic spawn/pickup entities
//! and are never partially mutated, unlike continuously-changing cars and
//! missiles.

use serde::{Deserialize, Serialize};

use crate::state::{CarState, ItemState, MissileState, RaceState, RadioState};

/// Incremental update against the last full snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RoomStateDelta {
    /// Replacement room id, if changed.
    pub room_id: Option<String>,
    /// Replacement track id, if changed.
    pub track_id: Option<String>,
    /// Replacement server time, if changed.
    pub server_time: Option<f64>,
    /// Car set changes.
    pub cars: Option<CarSetDelta>,
    /// Missile set changes.
    pub missiles: Option<MissileSetDelta>,
    /// Item set changes.
    pub items: Option<ItemSetDelta>,
    /// Whole-value radio replacement, if changed.
    pub radio: Option<RadioState>,
    /// Whole-value race replacement, if changed.
    pub race: Option<RaceState>,
}

impl RoomStateDelta {
    /// Returns `true` if applying this delta cannot change anything.
    pub fn is_empty(&self) -> bool {
        self.room_id.is_none()
            && self.track_id.is_none()
            && self.server_time.is_none()
            && self.cars.as_ref().is_none_or(CarSetDelta::is_empty)
            && self.missiles.as_ref().is_none_or(MissileSetDelta::is_empty)
            && self.items.as_ref().is_none_or(ItemSetDelta::is_empty)
            && self.radio.is_none()
            && self.race.is_none()
    }
}

/// Changes to the car collection.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CarSetDelta {
    /// Cars to insert or overwrite unconditionally.
    pub added: Vec<CarState>,
    /// Partial-field updates for existing cars.
    pub updated: Vec<CarPatch>,
    /// `player_id`s to delete.
    pub removed: Vec<String>,
}

impl CarSetDelta {
    /// Returns `true` if no change is carried.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Changes to the missile collection.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MissileSetDelta {
    /// Missiles to insert or overwrite unconditionally.
    pub added: Vec<MissileState>,
    /// Partial-field updates for existing missiles.
    pub updated: Vec<MissilePatch>,
    /// Missile `id`s to delete.
    pub removed: Vec<String>,
}

impl MissileSetDelta {
    /// Returns `true` if no change is carried.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Changes to the item collection. No `updated` set — items are atomic.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ItemSetDelta {
    /// Items to insert or overwrite unconditionally.
    pub added: Vec<ItemState>,
    /// Item `id`s to delete.
    pub removed: Vec<String>,
}

impl ItemSetDelta {
    /// Returns `true` if no change is carried.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Partial update for one car. `None` means "leave the field as it is".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CarPatch {
    /// Identity of the car being patched (always present).
    pub player_id: String,
    /// New display name, if changed.
    pub username: Option<String>,
    /// New X position.
    pub x: Option<f64>,
    /// New Z position.
    pub z: Option<f64>,
    /// New heading in radians.
    pub angle: Option<f64>,
    /// New signed speed.
    pub speed: Option<f64>,
    /// New NPC flag.
    pub is_npc: Option<bool>,
    /// New turbo-active flag.
    pub turbo_active: Option<bool>,
    /// New turbo charge count.
    pub turbo_charges: Option<u32>,
    /// New turbo recharge progress.
    pub turbo_recharge: Option<f64>,
    /// New remaining turbo duration.
    pub turbo_duration_left: Option<f64>,
    /// New missile charge count.
    pub missile_charges: Option<u32>,
    /// New missile recharge progress.
    pub missile_recharge: Option<f64>,
    /// New remaining spin-out time.
    pub impact_spin_time_left: Option<f64>,
}

impl CarPatch {
    /// Merges this patch onto an existing car, field by field.
    pub fn apply(&self, car: &mut CarState) {
        if let Some(v) = &self.username {
            car.username = Some(v.clone());
        }
        if let Some(v) = self.x {
            car.x = v;
        }
        if let Some(v) = self.z {
            car.z = v;
        }
        if let Some(v) = self.angle {
            car.angle = v;
        }
        if let Some(v) = self.speed {
            car.speed = v;
        }
        if let Some(v) = self.is_npc {
            car.is_npc = v;
        }
        if let Some(v) = self.turbo_active {
            car.turbo_active = v;
        }
        if let Some(v) = self.turbo_charges {
            car.turbo_charges = v;
        }
        if let Some(v) = self.turbo_recharge {
            car.turbo_recharge = v;
        }
        if let Some(v) = self.turbo_duration_left {
            car.turbo_duration_left = v;
        }
        if let Some(v) = self.missile_charges {
            car.missile_charges = v;
        }
        if let Some(v) = self.missile_recharge {
            car.missile_recharge = v;
        }
        if let Some(v) = self.impact_spin_time_left {
            car.impact_spin_time_left = v;
        }
    }

    /// Materializes the patch as a standalone car: patched fields take their
    /// patch values, everything else defaults. Used when an update arrives
    /// for an id the base snapshot does not contain.
    pub fn into_state(self) -> CarState {
        let mut car = CarState {
            player_id: self.player_id.clone(),
            ..CarState::default()
        };
        self.apply(&mut car);
        car
    }
}

/// Partial update for one missile. `None` means "leave the field as it is".
/// An absent `target_id` means unchanged — a lock can be retargeted but
/// never cleared through a patch.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MissilePatch {
    /// Identity of the missile being patched (always present).
    pub id: String,
    /// New owner, if changed.
    pub owner_id: Option<String>,
    /// New X position.
    pub x: Option<f64>,
    /// New Z position.
    pub z: Option<f64>,
    /// New heading in radians.
    pub angle: Option<f64>,
    /// New signed speed.
    pub speed: Option<f64>,
    /// New homing target.
    pub target_id: Option<String>,
}

impl MissilePatch {
    /// Merges this patch onto an existing missile, field by field.
    pub fn apply(&self, missile: &mut MissileState) {
        if let Some(v) = &self.owner_id {
            missile.owner_id = v.clone();
        }
        if let Some(v) = self.x {
            missile.x = v;
        }
        if let Some(v) = self.z {
            missile.z = v;
        }
        if let Some(v) = self.angle {
            missile.angle = v;
        }
        if let Some(v) = self.speed {
            missile.speed = v;
        }
        if let Some(v) = &self.target_id {
            missile.target_id = Some(v.clone());
        }
    }

    /// Materializes the patch as a standalone missile, defaults elsewhere.
    pub fn into_state(self) -> MissileState {
        let mut missile = MissileState {
            id: self.id.clone(),
            ..MissileState::default()
        };
        self.apply(&mut missile);
        missile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut car = CarState {
            player_id: "a".to_string(),
            x: 0.0,
            z: 0.0,
            angle: 1.0,
            speed: 5.0,
            ..CarState::default()
        };
        let patch = CarPatch {
            player_id: "a".to_string(),
            x: Some(1.0),
            ..CarPatch::default()
        };
        patch.apply(&mut car);
        assert_eq!(car.x, 1.0);
        assert_eq!(car.angle, 1.0, "absent field must stay unchanged");
        assert_eq!(car.speed, 5.0, "absent field must stay unchanged");
    }

    #[test]
    fn test_patch_into_state_uses_defaults() {
        let patch = CarPatch {
            player_id: "ghost".to_string(),
            x: Some(7.0),
            speed: Some(2.0),
            ..CarPatch::default()
        };
        let car = patch.into_state();
        assert_eq!(car.player_id, "ghost");
        assert_eq!(car.x, 7.0);
        assert_eq!(car.speed, 2.0);
        assert_eq!(car.z, 0.0);
        assert_eq!(car.angle, 0.0);
    }

    #[test]
    fn test_empty_delta_is_empty() {
        assert!(RoomStateDelta::default().is_empty());

        let with_empty_sets = RoomStateDelta {
            cars: Some(CarSetDelta::default()),
            items: Some(ItemSetDelta::default()),
            ..RoomStateDelta::default()
        };
        assert!(with_empty_sets.is_empty());

        let with_removal = RoomStateDelta {
            cars: Some(CarSetDelta {
                removed: vec!["a".to_string()],
                ..CarSetDelta::default()
            }),
            ..RoomStateDelta::default()
        };
        assert!(!with_removal.is_empty());
    }

    #[test]
    fn test_missile_patch_cannot_clear_target() {
        let mut missile = MissileState {
            id: "m".to_string(),
            target_id: Some("a".to_string()),
            ..MissileState::default()
        };
        let patch = MissilePatch {
            id: "m".to_string(),
            x: Some(3.0),
            ..MissilePatch::default()
        };
        patch.apply(&mut missile);
        assert_eq!(missile.target_id.as_deref(), Some("a"));
    }
}

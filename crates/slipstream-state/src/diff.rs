//! Server-side delta production: the inverse of [`crate::reconcile`].
//!
//! `diff(base, next)` emits the minimal [`RoomStateDelta`] such that
//! `reconcile(base, diff(base, next))` equals `next` up to key-set equality
//! and collection order. Unchanged entities and scalars are omitted
//! entirely; changed entities become per-field patches.
//!
//! Patches cannot express clearing an `Option` field (absence means
//! "unchanged" on the wire). The rare transition that would need one — a
//! username or homing target going away — is emitted as a full re-add
//! instead, which overwrites unconditionally and keeps the round-trip
//! property intact.

use std::collections::HashMap;

use crate::delta::{
    CarPatch, CarSetDelta, ItemSetDelta, MissilePatch, MissileSetDelta, RoomStateDelta,
};
use crate::state::{CarState, ItemState, MissileState, RoomState};

/// Computes the delta that transforms `base` into `next`.
pub fn diff(base: &RoomState, next: &RoomState) -> RoomStateDelta {
    RoomStateDelta {
        room_id: changed(&base.room_id, &next.room_id),
        track_id: changed(&base.track_id, &next.track_id),
        server_time: (base.server_time != next.server_time).then_some(next.server_time),
        cars: diff_cars(&base.cars, &next.cars),
        missiles: diff_missiles(&base.missiles, &next.missiles),
        items: diff_items(&base.items, &next.items),
        radio: changed(&base.radio, &next.radio),
        race: changed(&base.race, &next.race),
    }
}

fn changed<T: Clone + PartialEq>(base: &T, next: &T) -> Option<T> {
    (base != next).then(|| next.clone())
}

fn diff_cars(base: &[CarState], next: &[CarState]) -> Option<CarSetDelta> {
    let base_by_id: HashMap<&str, &CarState> =
        base.iter().map(|c| (c.player_id.as_str(), c)).collect();
    let mut delta = CarSetDelta::default();

    for car in next {
        match base_by_id.get(car.player_id.as_str()) {
            None => delta.added.push(car.clone()),
            Some(&old) if old == car => {}
            Some(&old) => match car_patch(old, car) {
                Some(patch) => delta.updated.push(patch),
                // Option field cleared; patch can't express it.
                None => delta.added.push(car.clone()),
            },
        }
    }

    let next_ids: HashMap<&str, ()> = next.iter().map(|c| (c.player_id.as_str(), ())).collect();
    for car in base {
        if !next_ids.contains_key(car.player_id.as_str()) {
            delta.removed.push(car.player_id.clone());
        }
    }

    (!delta.is_empty()).then_some(delta)
}

/// Builds a per-field patch, or `None` if the change needs a full re-add.
fn car_patch(old: &CarState, new: &CarState) -> Option<CarPatch> {
    if new.username.is_none() && old.username.is_some() {
        return None;
    }
    Some(CarPatch {
        player_id: new.player_id.clone(),
        username: (old.username != new.username)
            .then(|| new.username.clone())
            .flatten(),
        x: (old.x != new.x).then_some(new.x),
        z: (old.z != new.z).then_some(new.z),
        angle: (old.angle != new.angle).then_some(new.angle),
        speed: (old.speed != new.speed).then_some(new.speed),
        is_npc: (old.is_npc != new.is_npc).then_some(new.is_npc),
        turbo_active: (old.turbo_active != new.turbo_active).then_some(new.turbo_active),
        turbo_charges: (old.turbo_charges != new.turbo_charges).then_some(new.turbo_charges),
        turbo_recharge: (old.turbo_recharge != new.turbo_recharge).then_some(new.turbo_recharge),
        turbo_duration_left: (old.turbo_duration_left != new.turbo_duration_left)
            .then_some(new.turbo_duration_left),
        missile_charges: (old.missile_charges != new.missile_charges)
            .then_some(new.missile_charges),
        missile_recharge: (old.missile_recharge != new.missile_recharge)
            .then_some(new.missile_recharge),
        impact_spin_time_left: (old.impact_spin_time_left != new.impact_spin_time_left)
            .then_some(new.impact_spin_time_left),
    })
}

fn diff_missiles(base: &[MissileState], next: &[MissileState]) -> Option<MissileSetDelta> {
    let base_by_id: HashMap<&str, &MissileState> =
        base.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut delta = MissileSetDelta::default();

    for missile in next {
        match base_by_id.get(missile.id.as_str()) {
            None => delta.added.push(missile.clone()),
            Some(&old) if old == missile => {}
            Some(&old) => match missile_patch(old, missile) {
                Some(patch) => delta.updated.push(patch),
                None => delta.added.push(missile.clone()),
            },
        }
    }

    let next_ids: HashMap<&str, ()> = next.iter().map(|m| (m.id.as_str(), ())).collect();
    for missile in base {
        if !next_ids.contains_key(missile.id.as_str()) {
            delta.removed.push(missile.id.clone());
        }
    }

    (!delta.is_empty()).then_some(delta)
}

fn missile_patch(old: &MissileState, new: &MissileState) -> Option<MissilePatch> {
    if new.target_id.is_none() && old.target_id.is_some() {
        return None;
    }
    Some(MissilePatch {
        id: new.id.clone(),
        owner_id: changed(&old.owner_id, &new.owner_id),
        x: (old.x != new.x).then_some(new.x),
        z: (old.z != new.z).then_some(new.z),
        angle: (old.angle != new.angle).then_some(new.angle),
        speed: (old.speed != new.speed).then_some(new.speed),
        target_id: (old.target_id != new.target_id)
            .then(|| new.target_id.clone())
            .flatten(),
    })
}

fn diff_items(base: &[ItemState], next: &[ItemState]) -> Option<ItemSetDelta> {
    let base_by_id: HashMap<&str, &ItemState> = base.iter().map(|i| (i.id.as_str(), i)).collect();
    let mut delta = ItemSetDelta::default();

    for item in next {
        match base_by_id.get(item.id.as_str()) {
            // Items never mutate in place, but a changed entry under the
            // same id still round-trips: added overwrites on insert.
            Some(old) if *old == item => {}
            _ => delta.added.push(item.clone()),
        }
    }

    let next_ids: HashMap<&str, ()> = next.iter().map(|i| (i.id.as_str(), ())).collect();
    for item in base {
        if !next_ids.contains_key(item.id.as_str()) {
            delta.removed.push(item.id.clone());
        }
    }

    (!delta.is_empty()).then_some(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;
    use crate::state::{ItemKind, RacePhase};

    /// Order-independent snapshot equality: collections compared as keyed
    /// sets, everything else directly.
    fn states_equal(a: &RoomState, b: &RoomState) -> bool {
        let keyed = |s: &RoomState| {
            (
                s.cars
                    .iter()
                    .map(|c| (c.player_id.clone(), c.clone()))
                    .collect::<HashMap<_, _>>(),
                s.missiles
                    .iter()
                    .map(|m| (m.id.clone(), m.clone()))
                    .collect::<HashMap<_, _>>(),
                s.items
                    .iter()
                    .map(|i| (i.id.clone(), i.clone()))
                    .collect::<HashMap<_, _>>(),
            )
        };
        keyed(a) == keyed(b)
            && a.room_id == b.room_id
            && a.track_id == b.track_id
            && a.server_time == b.server_time
            && a.radio == b.radio
            && a.race == b.race
    }

    fn sample_base() -> RoomState {
        RoomState {
            room_id: "r1".to_string(),
            track_id: "canyon".to_string(),
            server_time: 10.0,
            cars: vec![
                CarState {
                    player_id: "a".to_string(),
                    x: 1.0,
                    z: 2.0,
                    speed: 5.0,
                    ..CarState::default()
                },
                CarState {
                    player_id: "b".to_string(),
                    x: -3.0,
                    z: 0.5,
                    turbo_charges: 2,
                    ..CarState::default()
                },
            ],
            missiles: vec![MissileState {
                id: "m1".to_string(),
                owner_id: "a".to_string(),
                x: 1.5,
                ..MissileState::default()
            }],
            items: vec![ItemState {
                id: "i1".to_string(),
                kind: ItemKind::Nitro,
                x: 4.0,
                ..ItemState::default()
            }],
            ..RoomState::default()
        }
    }

    #[test]
    fn test_diff_of_identical_states_is_empty() {
        let base = sample_base();
        assert!(diff(&base, &base).is_empty());
    }

    #[test]
    fn test_diff_emits_only_changed_fields() {
        let base = sample_base();
        let mut next = base.clone();
        next.car_mut("a").unwrap().x = 2.0;

        let delta = diff(&base, &next);
        let cars = delta.cars.unwrap();
        assert_eq!(cars.updated.len(), 1);
        assert!(cars.added.is_empty());
        assert!(cars.removed.is_empty());

        let patch = &cars.updated[0];
        assert_eq!(patch.x, Some(2.0));
        assert_eq!(patch.z, None);
        assert_eq!(patch.speed, None);
        assert!(delta.missiles.is_none());
        assert!(delta.items.is_none());
    }

    #[test]
    fn test_round_trip_reconstructs_next() {
        // reconcile(A, diff(A, B)) == B for a delta touching every section.
        let base = sample_base();
        let mut next = base.clone();
        next.server_time = 10.5;
        next.car_mut("a").unwrap().x = 2.0;
        next.car_mut("a").unwrap().turbo_active = true;
        next.cars.retain(|c| c.player_id != "b");
        next.cars.push(CarState {
            player_id: "c".to_string(),
            x: 8.0,
            ..CarState::default()
        });
        next.missiles[0].x = 3.0;
        next.items.clear();
        next.items.push(ItemState {
            id: "i2".to_string(),
            kind: ItemKind::Shoot,
            ..ItemState::default()
        });
        next.race.phase = RacePhase::Running;

        let delta = diff(&base, &next);
        let rebuilt = reconcile(Some(&base), &delta).unwrap();
        assert!(states_equal(&rebuilt, &next));
    }

    #[test]
    fn test_reapplying_delta_is_idempotent() {
        let base = sample_base();
        let mut next = base.clone();
        next.car_mut("a").unwrap().speed = 7.5;
        next.missiles.clear();

        let delta = diff(&base, &next);
        let once = reconcile(Some(&base), &delta).unwrap();
        let twice = reconcile(Some(&once), &delta).unwrap();
        assert!(states_equal(&once, &twice));
    }

    #[test]
    fn test_cleared_username_falls_back_to_readd() {
        let mut base = sample_base();
        base.car_mut("a").unwrap().username = Some("Ada".to_string());
        let mut next = base.clone();
        next.car_mut("a").unwrap().username = None;

        let delta = diff(&base, &next);
        let cars = delta.cars.as_ref().unwrap();
        assert_eq!(cars.added.len(), 1, "clear must be expressed as a re-add");
        assert!(cars.updated.is_empty());

        let rebuilt = reconcile(Some(&base), &delta).unwrap();
        assert!(states_equal(&rebuilt, &next));
    }

    #[test]
    fn test_scalar_only_change() {
        let base = sample_base();
        let mut next = base.clone();
        next.radio.station = 2;

        let delta = diff(&base, &next);
        assert!(delta.cars.is_none());
        assert_eq!(delta.radio.as_ref().unwrap().station, 2);

        let rebuilt = reconcile(Some(&base), &delta).unwrap();
        assert!(states_equal(&rebuilt, &next));
    }
}

//! Delta reconciliation: the pure merge that turns (last full snapshot,
//! incremental delta) into a new full snapshot.
//!
//! Application order within each keyed collection is a defined contract:
//! `removed` first, then `updated`, then `added`. An id listed in both
//! `removed` and `added` within one delta therefore ends up present — add
//! wins. Output collection order is unspecified; consumers must treat it as
//! insignificant.

use std::collections::HashMap;

use crate::delta::RoomStateDelta;
use crate::state::{CarState, ItemState, MissileState, RoomState};

/// Merges `delta` onto `base`, producing the next full snapshot.
///
/// Returns `None` when `base` is `None` — no prior full snapshot exists, so
/// the caller must request a full resync. A snapshot is never synthesized
/// from a delta alone.
pub fn reconcile(base: Option<&RoomState>, delta: &RoomStateDelta) -> Option<RoomState> {
    let base = base?;
    let mut next = RoomState {
        room_id: delta.room_id.clone().unwrap_or_else(|| base.room_id.clone()),
        track_id: delta
            .track_id
            .clone()
            .unwrap_or_else(|| base.track_id.clone()),
        server_time: delta.server_time.unwrap_or(base.server_time),
        cars: Vec::new(),
        missiles: Vec::new(),
        items: Vec::new(),
        radio: delta.radio.clone().unwrap_or_else(|| base.radio.clone()),
        race: delta.race.clone().unwrap_or_else(|| base.race.clone()),
    };

    next.cars = merge_cars(&base.cars, delta);
    next.missiles = merge_missiles(&base.missiles, delta);
    next.items = merge_items(&base.items, delta);

    Some(next)
}

fn merge_cars(base: &[CarState], delta: &RoomStateDelta) -> Vec<CarState> {
    let mut by_id: HashMap<String, CarState> = base
        .iter()
        .map(|c| (c.player_id.clone(), c.clone()))
        .collect();

    if let Some(d) = &delta.cars {
        for id in &d.removed {
            by_id.remove(id);
        }
        for patch in &d.updated {
            match by_id.get_mut(&patch.player_id) {
                Some(car) => patch.apply(car),
                None => {
                    by_id.insert(patch.player_id.clone(), patch.clone().into_state());
                }
            }
        }
        for car in &d.added {
            by_id.insert(car.player_id.clone(), car.clone());
        }
    }

    by_id.into_values().collect()
}

fn merge_missiles(base: &[MissileState], delta: &RoomStateDelta) -> Vec<MissileState> {
    let mut by_id: HashMap<String, MissileState> =
        base.iter().map(|m| (m.id.clone(), m.clone())).collect();

    if let Some(d) = &delta.missiles {
        for id in &d.removed {
            by_id.remove(id);
        }
        for patch in &d.updated {
            match by_id.get_mut(&patch.id) {
                Some(missile) => patch.apply(missile),
                None => {
                    by_id.insert(patch.id.clone(), patch.clone().into_state());
                }
            }
        }
        for missile in &d.added {
            by_id.insert(missile.id.clone(), missile.clone());
        }
    }

    by_id.into_values().collect()
}

fn merge_items(base: &[ItemState], delta: &RoomStateDelta) -> Vec<ItemState> {
    let mut by_id: HashMap<String, ItemState> =
        base.iter().map(|i| (i.id.clone(), i.clone())).collect();

    if let Some(d) = &delta.items {
        for id in &d.removed {
            by_id.remove(id);
        }
        for item in &d.added {
            by_id.insert(item.id.clone(), item.clone());
        }
    }

    by_id.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{CarPatch, CarSetDelta, ItemSetDelta};
    use crate::state::{ItemKind, RadioState};

    fn base_with_one_car() -> RoomState {
        RoomState {
            room_id: "r1".to_string(),
            cars: vec![CarState {
                player_id: "a".to_string(),
                x: 0.0,
                z: 0.0,
                angle: 0.0,
                speed: 5.0,
                ..CarState::default()
            }],
            ..RoomState::default()
        }
    }

    #[test]
    fn test_no_base_yields_none() {
        let delta = RoomStateDelta {
            server_time: Some(1.0),
            ..RoomStateDelta::default()
        };
        assert!(reconcile(None, &delta).is_none());
    }

    #[test]
    fn test_partial_update_preserves_untouched_fields() {
        // Base car {a, x:0, z:0, angle:0, speed:5}; delta moves x to 1.
        // Result must be {a, x:1, z:0, angle:0, speed:5}.
        let base = base_with_one_car();
        let delta = RoomStateDelta {
            cars: Some(CarSetDelta {
                updated: vec![CarPatch {
                    player_id: "a".to_string(),
                    x: Some(1.0),
                    ..CarPatch::default()
                }],
                ..CarSetDelta::default()
            }),
            ..RoomStateDelta::default()
        };

        let next = reconcile(Some(&base), &delta).unwrap();
        let car = next.car("a").unwrap();
        assert_eq!(car.x, 1.0);
        assert_eq!(car.z, 0.0);
        assert_eq!(car.angle, 0.0);
        assert_eq!(car.speed, 5.0);
    }

    #[test]
    fn test_add_wins_over_remove_in_same_delta() {
        // "a" is removed while "b" is added in the same delta: the result
        // contains only "b", regardless of where each appears in the delta.
        let base = base_with_one_car();
        let delta = RoomStateDelta {
            cars: Some(CarSetDelta {
                added: vec![CarState {
                    player_id: "b".to_string(),
                    x: 9.0,
                    ..CarState::default()
                }],
                removed: vec!["a".to_string()],
                ..CarSetDelta::default()
            }),
            ..RoomStateDelta::default()
        };

        let next = reconcile(Some(&base), &delta).unwrap();
        assert!(next.car("a").is_none());
        assert_eq!(next.car("b").unwrap().x, 9.0);
        assert_eq!(next.cars.len(), 1);
    }

    #[test]
    fn test_same_id_removed_and_added_ends_present() {
        // Removal applies before add, so the re-added entry survives with
        // the added fields, not the base ones.
        let base = base_with_one_car();
        let delta = RoomStateDelta {
            cars: Some(CarSetDelta {
                added: vec![CarState {
                    player_id: "a".to_string(),
                    x: 42.0,
                    ..CarState::default()
                }],
                removed: vec!["a".to_string()],
                ..CarSetDelta::default()
            }),
            ..RoomStateDelta::default()
        };

        let next = reconcile(Some(&base), &delta).unwrap();
        let car = next.car("a").unwrap();
        assert_eq!(car.x, 42.0);
        assert_eq!(car.speed, 0.0, "base fields must not leak into the re-add");
    }

    #[test]
    fn test_update_for_unknown_id_inserts_as_is() {
        let base = base_with_one_car();
        let delta = RoomStateDelta {
            cars: Some(CarSetDelta {
                updated: vec![CarPatch {
                    player_id: "late".to_string(),
                    x: Some(2.0),
                    ..CarPatch::default()
                }],
                ..CarSetDelta::default()
            }),
            ..RoomStateDelta::default()
        };

        let next = reconcile(Some(&base), &delta).unwrap();
        assert_eq!(next.car("late").unwrap().x, 2.0);
        assert_eq!(next.cars.len(), 2);
    }

    #[test]
    fn test_items_spawn_and_pickup() {
        let mut base = base_with_one_car();
        base.items.push(ItemState {
            id: "i1".to_string(),
            kind: ItemKind::Nitro,
            x: 1.0,
            ..ItemState::default()
        });

        let delta = RoomStateDelta {
            items: Some(ItemSetDelta {
                added: vec![ItemState {
                    id: "i2".to_string(),
                    kind: ItemKind::Shoot,
                    x: 2.0,
                    ..ItemState::default()
                }],
                removed: vec!["i1".to_string()],
            }),
            ..RoomStateDelta::default()
        };

        let next = reconcile(Some(&base), &delta).unwrap();
        assert_eq!(next.items.len(), 1);
        assert_eq!(next.items[0].id, "i2");
    }

    #[test]
    fn test_absent_scalars_are_unchanged() {
        let mut base = base_with_one_car();
        base.radio = RadioState {
            station: 3,
            track_title: "midnight run".to_string(),
        };
        base.server_time = 10.0;

        let delta = RoomStateDelta {
            server_time: Some(11.0),
            ..RoomStateDelta::default()
        };

        let next = reconcile(Some(&base), &delta).unwrap();
        assert_eq!(next.server_time, 11.0);
        assert_eq!(next.radio.station, 3, "absent radio means unchanged");
        assert_eq!(next.room_id, "r1");
    }

    #[test]
    fn test_empty_delta_is_identity_up_to_order() {
        let base = base_with_one_car();
        let next = reconcile(Some(&base), &RoomStateDelta::default()).unwrap();
        assert_eq!(next.cars.len(), base.cars.len());
        assert_eq!(next.car("a"), base.car("a"));
        assert_eq!(next.room_id, base.room_id);
    }
}

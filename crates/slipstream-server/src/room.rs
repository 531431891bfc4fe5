//! One authoritative race room.
//!
//! The room owns the canonical [`RoomState`], applies queued controller
//! inputs each tick, and rebuilds a [`SpatialHash`] over car positions to
//! answer the proximity questions of the tick: item pickups and missile
//! hits. The broad phase only supplies candidates — every candidate is
//! confirmed with an exact distance check before anything happens to it.
//!
//! Input application is kinematic: steering and throttle integrate heading
//! and speed directly. Force/impulse resolution belongs to a dedicated
//! physics layer, not this one.

use std::collections::HashMap;

use slipstream_net::{InputAction, InputFrame, ServerMessage};
use slipstream_spatial::SpatialHash;
use slipstream_state::{
    CarState, ItemKind, ItemState, MissileState, RaceEntry, RacePhase, RoomState, diff,
};

// ---------------------------------------------------------------------------
// Tuning constants
// ---------------------------------------------------------------------------

/// Maximum forward speed in world units per second.
const MAX_SPEED: f64 = 40.0;

/// Maximum reverse speed in world units per second.
const MAX_REVERSE_SPEED: f64 = 10.0;

/// Forward acceleration at full throttle.
const ACCELERATION: f64 = 18.0;

/// Deceleration at full brake.
const BRAKE_DECELERATION: f64 = 30.0;

/// Passive drag applied to speed every second.
const DRAG: f64 = 0.6;

/// Steering rate in radians per second at full lock.
const STEER_RATE: f64 = 1.8;

/// Speed bonus multiplier while turbo is active.
const TURBO_MULTIPLIER: f64 = 1.5;

/// Seconds one turbo charge lasts.
const TURBO_DURATION: f64 = 2.5;

/// Turbo recharge progress per second.
const TURBO_RECHARGE_RATE: f64 = 0.1;

/// Missile recharge progress per second.
const MISSILE_RECHARGE_RATE: f64 = 0.15;

/// Maximum stored charges of either kind.
const MAX_CHARGES: u32 = 3;

/// Missile flight speed.
const MISSILE_SPEED: f64 = 60.0;

/// Missile homing turn rate in radians per second.
const MISSILE_TURN_RATE: f64 = 2.2;

/// Seconds a missile flies before expiring.
const MISSILE_LIFETIME: f64 = 6.0;

/// Radius within which a missile locks onto a target at launch.
const MISSILE_LOCK_RADIUS: f64 = 60.0;

/// Radius within which a missile detonates against a car.
const MISSILE_HIT_RADIUS: f64 = 2.5;

/// Seconds a hit car spins out.
const IMPACT_SPIN_DURATION: f64 = 1.8;

/// Radius within which a car collects an item.
const ITEM_PICKUP_RADIUS: f64 = 3.0;

/// Ticks before a collected item respawns at its spawn point.
const ITEM_RESPAWN_TICKS: u64 = 200;

/// Radius of the ring item spawn points sit on.
const ITEM_RING_RADIUS: f64 = 45.0;

/// Number of item spawn points.
const ITEM_SPAWN_COUNT: usize = 8;

/// Seconds of start countdown.
const COUNTDOWN_SECONDS: f64 = 3.0;

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// What a finished tick wants broadcast to the room's members.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastPayload {
    /// Periodic re-anchor: the complete state.
    Full(ServerMessage),
    /// The usual case: an incremental delta.
    Delta(ServerMessage),
}

impl BroadcastPayload {
    /// The wire message either way.
    pub fn message(&self) -> &ServerMessage {
        match self {
            Self::Full(msg) | Self::Delta(msg) => msg,
        }
    }
}

struct ItemSpawn {
    x: f64,
    z: f64,
    angle: f64,
    kind: ItemKind,
    /// Tick at which the item respawns; `None` while it is on the track.
    respawn_at: Option<u64>,
}

/// One authoritative room: state, index, queued inputs, broadcast shadow.
pub struct Room {
    state: RoomState,
    /// State as of the last broadcast, the diff base.
    last_broadcast: Option<RoomState>,
    spatial: SpatialHash,
    /// Latest input per player. Inputs are last-write-wins within a tick.
    inputs: HashMap<String, InputFrame>,
    /// One-shot actions fired since the last tick.
    actions: Vec<(String, InputAction)>,
    item_spawns: Vec<ItemSpawn>,
    tick: u64,
    full_interval: u32,
    next_entity: u64,
    query_buf: Vec<u32>,
}

impl Room {
    /// Creates a room with its item ring laid out and radio at station 0.
    pub fn new(room_id: &str, track_id: &str, cell_size: f64, full_interval: u32) -> Self {
        let mut room = Self {
            state: RoomState {
                room_id: room_id.to_string(),
                track_id: track_id.to_string(),
                ..RoomState::default()
            },
            last_broadcast: None,
            spatial: SpatialHash::new(cell_size),
            inputs: HashMap::new(),
            actions: Vec::new(),
            item_spawns: Vec::new(),
            tick: 0,
            full_interval: full_interval.max(1),
            next_entity: 1,
            query_buf: Vec::new(),
        };
        room.lay_out_items();
        room
    }

    /// Read access to the authoritative state.
    pub fn state(&self) -> &RoomState {
        &self.state
    }

    /// Current tick number.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    fn lay_out_items(&mut self) {
        for i in 0..ITEM_SPAWN_COUNT {
            let theta = std::f64::consts::TAU * (i as f64) / (ITEM_SPAWN_COUNT as f64);
            let kind = if i % 2 == 0 {
                ItemKind::Nitro
            } else {
                ItemKind::Shoot
            };
            self.item_spawns.push(ItemSpawn {
                x: ITEM_RING_RADIUS * theta.cos(),
                z: ITEM_RING_RADIUS * theta.sin(),
                angle: theta,
                kind,
                respawn_at: Some(0),
            });
        }
    }

    // -- membership --------------------------------------------------------

    /// Adds a car (and race entry) for a player. A re-join keeps the
    /// existing car.
    pub fn add_player(&mut self, player_id: &str, username: &str, is_npc: bool) {
        if self.state.car(player_id).is_some() {
            return;
        }
        let slot = self.state.cars.len() as f64;
        self.state.cars.push(CarState {
            player_id: player_id.to_string(),
            username: (!username.is_empty()).then(|| username.to_string()),
            x: -30.0,
            z: slot * 4.0,
            angle: 0.0,
            is_npc,
            turbo_charges: 1,
            missile_charges: 1,
            ..CarState::default()
        });
        self.state.race.players.push(RaceEntry {
            player_id: player_id.to_string(),
            username: (!username.is_empty()).then(|| username.to_string()),
            ..RaceEntry::default()
        });

        if self.state.race.phase == RacePhase::Lobby {
            self.state.race.phase = RacePhase::Countdown;
            self.state.race.countdown = COUNTDOWN_SECONDS;
        }
    }

    /// Removes a player's car, race entry, queued input, and missiles.
    pub fn remove_player(&mut self, player_id: &str) {
        self.state.cars.retain(|c| c.player_id != player_id);
        self.state.race.players.retain(|p| p.player_id != player_id);
        self.state.missiles.retain(|m| m.owner_id != player_id);
        self.inputs.remove(player_id);
        self.actions.retain(|(owner, _)| owner != player_id);
    }

    /// Updates the display name on the car and race entry.
    pub fn set_username(&mut self, player_id: &str, username: &str) {
        if let Some(car) = self.state.car_mut(player_id) {
            car.username = Some(username.to_string());
        }
        if let Some(entry) = self
            .state
            .race
            .players
            .iter_mut()
            .find(|p| p.player_id == player_id)
        {
            entry.username = Some(username.to_string());
        }
    }

    /// Roster snapshot for a room-info reply.
    pub fn roster(&self) -> Vec<(String, String)> {
        self.state
            .cars
            .iter()
            .map(|c| {
                (
                    c.player_id.clone(),
                    c.username.clone().unwrap_or_else(|| c.player_id.clone()),
                )
            })
            .collect()
    }

    // -- input -------------------------------------------------------------

    /// Queues a controller input. The axes are last-write-wins within a
    /// tick; one-shot actions accumulate.
    pub fn apply_input(&mut self, input: InputFrame) {
        for action in &input.actions {
            self.actions.push((input.player_id.clone(), *action));
        }
        self.inputs.insert(input.player_id.clone(), input);
    }

    /// Advances the room radio to the next station.
    pub fn cycle_radio(&mut self) {
        self.state.radio.station = self.state.radio.station.wrapping_add(1);
        self.state.radio.track_title = format!("station {}", self.state.radio.station);
    }

    // -- tick --------------------------------------------------------------

    /// Runs one simulation tick of `dt` seconds.
    pub fn advance_tick(&mut self, dt: f64) {
        self.tick += 1;
        self.state.server_time += dt;

        self.advance_race(dt);
        if self.state.race.phase == RacePhase::Running {
            self.drive_cars(dt);
            self.fire_actions();
            self.advance_missiles(dt);
        }

        // Full rebuild every tick; indices are positions in `cars` and are
        // meaningless after this pass.
        self.spatial.reset(None);
        for (i, car) in self.state.cars.iter().enumerate() {
            self.spatial.insert(i as u32, car.x, car.z);
        }

        self.resolve_missile_hits();
        self.resolve_item_pickups();
        self.respawn_items();
        self.actions.clear();
    }

    /// The message this tick wants broadcast: a periodic full snapshot, an
    /// incremental delta, or nothing when the state did not change.
    pub fn broadcast_payload(&mut self) -> Option<BroadcastPayload> {
        let due_full = self.last_broadcast.is_none()
            || self.tick % u64::from(self.full_interval) == 0;
        if due_full {
            self.last_broadcast = Some(self.state.clone());
            return Some(BroadcastPayload::Full(ServerMessage::StateFull(
                self.state.clone(),
            )));
        }

        let base = self.last_broadcast.as_ref()?;
        let delta = diff(base, &self.state);
        if delta.is_empty() {
            return None;
        }
        self.last_broadcast = Some(self.state.clone());
        Some(BroadcastPayload::Delta(ServerMessage::StateDelta(delta)))
    }

    /// Builds the full snapshot reply for an explicit resync request.
    pub fn full_state_message(&self) -> ServerMessage {
        ServerMessage::StateFull(self.state.clone())
    }

    fn advance_race(&mut self, dt: f64) {
        if self.state.race.phase == RacePhase::Countdown {
            self.state.race.countdown = (self.state.race.countdown - dt).max(0.0);
            if self.state.race.countdown == 0.0 {
                self.state.race.phase = RacePhase::Running;
            }
        }
    }

    fn drive_cars(&mut self, dt: f64) {
        for car in &mut self.state.cars {
            let (steer, throttle, brake) = if car.impact_spin_time_left > 0.0 {
                // Spinning out: no control.
                (0.0, 0.0, 0.0)
            } else if car.is_npc {
                // NPCs hold a gentle left turn at part throttle.
                (0.35, 0.6, 0.0)
            } else {
                match self.inputs.get(&car.player_id) {
                    Some(input) => (
                        input.steer.clamp(-1.0, 1.0),
                        input.throttle.clamp(0.0, 1.0),
                        input.brake.clamp(0.0, 1.0),
                    ),
                    None => (0.0, 0.0, 0.0),
                }
            };

            if car.impact_spin_time_left > 0.0 {
                car.impact_spin_time_left = (car.impact_spin_time_left - dt).max(0.0);
                car.angle += 4.0 * std::f64::consts::TAU * dt / IMPACT_SPIN_DURATION;
                car.speed -= car.speed * 2.0 * dt;
            } else {
                car.angle += steer * STEER_RATE * dt;
                car.speed += (throttle * ACCELERATION - brake * BRAKE_DECELERATION) * dt;
                car.speed -= car.speed * DRAG * dt;
            }

            if car.turbo_active {
                car.turbo_duration_left = (car.turbo_duration_left - dt).max(0.0);
                if car.turbo_duration_left == 0.0 {
                    car.turbo_active = false;
                }
            }
            let max = if car.turbo_active {
                MAX_SPEED * TURBO_MULTIPLIER
            } else {
                MAX_SPEED
            };
            car.speed = car.speed.clamp(-MAX_REVERSE_SPEED, max);

            car.x += car.angle.cos() * car.speed * dt;
            car.z += car.angle.sin() * car.speed * dt;

            if car.turbo_charges < MAX_CHARGES {
                car.turbo_recharge += TURBO_RECHARGE_RATE * dt;
                if car.turbo_recharge >= 1.0 {
                    car.turbo_recharge = 0.0;
                    car.turbo_charges += 1;
                }
            }
            if car.missile_charges < MAX_CHARGES {
                car.missile_recharge += MISSILE_RECHARGE_RATE * dt;
                if car.missile_recharge >= 1.0 {
                    car.missile_recharge = 0.0;
                    car.missile_charges += 1;
                }
            }
        }
    }

    fn fire_actions(&mut self) {
        let actions = std::mem::take(&mut self.actions);
        for (player_id, action) in &actions {
            match action {
                InputAction::Turbo => {
                    if let Some(car) = self.state.car_mut(player_id)
                        && car.turbo_charges > 0
                        && !car.turbo_active
                    {
                        car.turbo_charges -= 1;
                        car.turbo_active = true;
                        car.turbo_duration_left = TURBO_DURATION;
                    }
                }
                InputAction::FireMissile => self.fire_missile(player_id),
            }
        }
    }

    fn fire_missile(&mut self, owner_id: &str) {
        let Some(owner) = self.state.car(owner_id) else {
            return;
        };
        if owner.missile_charges == 0 {
            return;
        }
        let (ox, oz, oangle) = (owner.x, owner.z, owner.angle);

        // Lock onto the nearest other car within range. Broad-phase
        // candidates first, exact distances after.
        let mut buf = std::mem::take(&mut self.query_buf);
        self.spatial.query_indices(ox, oz, MISSILE_LOCK_RADIUS, &mut buf);
        let mut target: Option<(String, f64)> = None;
        for &idx in &buf {
            let Some(candidate) = self.state.cars.get(idx as usize) else {
                continue;
            };
            if candidate.player_id == owner_id {
                continue;
            }
            let dist = ((candidate.x - ox).powi(2) + (candidate.z - oz).powi(2)).sqrt();
            if dist <= MISSILE_LOCK_RADIUS
                && target.as_ref().is_none_or(|(_, best)| dist < *best)
            {
                target = Some((candidate.player_id.clone(), dist));
            }
        }
        self.query_buf = buf;

        let id = format!("m{}", self.next_entity);
        self.next_entity += 1;
        self.state.missiles.push(MissileState {
            id,
            owner_id: owner_id.to_string(),
            x: ox + oangle.cos() * 2.0,
            z: oz + oangle.sin() * 2.0,
            angle: oangle,
            speed: MISSILE_SPEED,
            target_id: target.map(|(id, _)| id),
        });

        if let Some(car) = self.state.car_mut(owner_id) {
            car.missile_charges -= 1;
        }
    }

    fn advance_missiles(&mut self, dt: f64) {
        let targets: HashMap<String, (f64, f64)> = self
            .state
            .cars
            .iter()
            .map(|c| (c.player_id.clone(), (c.x, c.z)))
            .collect();

        for missile in &mut self.state.missiles {
            if let Some(target_id) = &missile.target_id
                && let Some(&(tx, tz)) = targets.get(target_id)
            {
                let desired = (tz - missile.z).atan2(tx - missile.x);
                let mut delta = desired - missile.angle;
                while delta > std::f64::consts::PI {
                    delta -= std::f64::consts::TAU;
                }
                while delta < -std::f64::consts::PI {
                    delta += std::f64::consts::TAU;
                }
                let max_turn = MISSILE_TURN_RATE * dt;
                missile.angle += delta.clamp(-max_turn, max_turn);
            }
            missile.x += missile.angle.cos() * missile.speed * dt;
            missile.z += missile.angle.sin() * missile.speed * dt;
        }

        // Expire missiles that have left the reachable area. Flight range
        // bounds flight time without needing a per-missile timestamp.
        let bound = MISSILE_SPEED * MISSILE_LIFETIME;
        self.state
            .missiles
            .retain(|m| m.x.abs() < bound && m.z.abs() < bound);
    }

    fn resolve_missile_hits(&mut self) {
        let mut hits: Vec<(String, String)> = Vec::new();
        let mut buf = std::mem::take(&mut self.query_buf);

        for missile in &self.state.missiles {
            self.spatial
                .query_indices(missile.x, missile.z, MISSILE_HIT_RADIUS, &mut buf);
            for &idx in &buf {
                let Some(car) = self.state.cars.get(idx as usize) else {
                    continue;
                };
                if car.player_id == missile.owner_id {
                    continue;
                }
                // Candidates over-approximate; confirm with the true distance.
                let dist_sq =
                    (car.x - missile.x).powi(2) + (car.z - missile.z).powi(2);
                if dist_sq <= MISSILE_HIT_RADIUS * MISSILE_HIT_RADIUS {
                    hits.push((missile.id.clone(), car.player_id.clone()));
                    break;
                }
            }
        }
        self.query_buf = buf;

        for (missile_id, victim_id) in hits {
            self.state.missiles.retain(|m| m.id != missile_id);
            if let Some(car) = self.state.car_mut(&victim_id) {
                car.impact_spin_time_left = IMPACT_SPIN_DURATION;
                car.turbo_active = false;
                tracing::debug!(victim = %victim_id, "missile hit");
            }
        }
    }

    fn resolve_item_pickups(&mut self) {
        let mut picked: Vec<(String, ItemKind, u32)> = Vec::new();
        let mut buf = std::mem::take(&mut self.query_buf);

        for item in &self.state.items {
            self.spatial
                .query_indices(item.x, item.z, ITEM_PICKUP_RADIUS, &mut buf);
            for &idx in &buf {
                let Some(car) = self.state.cars.get(idx as usize) else {
                    continue;
                };
                let dist_sq = (car.x - item.x).powi(2) + (car.z - item.z).powi(2);
                if dist_sq <= ITEM_PICKUP_RADIUS * ITEM_PICKUP_RADIUS {
                    picked.push((item.id.clone(), item.kind, idx));
                    break;
                }
            }
        }
        self.query_buf = buf;

        for (item_id, kind, car_idx) in picked {
            self.state.items.retain(|i| i.id != item_id);
            if let Some(spawn_idx) = item_spawn_index(&item_id)
                && let Some(spawn) = self.item_spawns.get_mut(spawn_idx)
            {
                spawn.respawn_at = Some(self.tick + ITEM_RESPAWN_TICKS);
            }
            if let Some(car) = self.state.cars.get_mut(car_idx as usize) {
                match kind {
                    ItemKind::Nitro => {
                        car.turbo_charges = (car.turbo_charges + 1).min(MAX_CHARGES);
                    }
                    ItemKind::Shoot => {
                        car.missile_charges = (car.missile_charges + 1).min(MAX_CHARGES);
                    }
                }
                tracing::debug!(player = %car.player_id, ?kind, "item picked up");
            }
        }
    }

    fn respawn_items(&mut self) {
        for (i, spawn) in self.item_spawns.iter_mut().enumerate() {
            if let Some(at) = spawn.respawn_at
                && self.tick >= at
            {
                spawn.respawn_at = None;
                self.state.items.push(ItemState {
                    id: format!("item-{i}"),
                    kind: spawn.kind,
                    x: spawn.x,
                    z: spawn.z,
                    angle: spawn.angle,
                });
            }
        }
    }
}

/// Spawn-point index encoded in an item id (`item-<n>`).
fn item_spawn_index(item_id: &str) -> Option<usize> {
    item_id.strip_prefix("item-")?.parse().ok()
}

//! Slipstream server binary.
//!
//! Wires configuration, logging, the TCP accept loop, session lifecycle,
//! and the per-room tick loop. Network events are drained once per tick,
//! so message handling is synchronous with respect to room mutation and
//! broadcast — the transport tasks only decode and queue.

mod room;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use slipstream_config::{CliArgs, Config};
use slipstream_log::init_logging;
use slipstream_net::{
    ClientMessage, CompressionConfig, ConnectionId, ErrorMessage, FrameConfig, PROTOCOL_VERSION,
    PlayerEntry, PlayerUpdate, RaceServer, RoomInfoMsg, ServerConfig, ServerEvent, ServerMessage,
    SessionManager, WIRE_VERSION, timeout_check,
};

use crate::room::Room;

/// Track every room runs until track selection is wired to room creation.
const DEFAULT_TRACK: &str = "canyon";

/// NPC drivers seeded into every new room so viewers always see motion.
const NPC_DRIVERS: &[(&str, &str)] = &[("npc-pacer", "Pacer"), ("npc-drifter", "Drifter")];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = Config::load_or_create(&config_dir)?;
    config.apply_cli_overrides(&args);

    init_logging(
        Some(Path::new("./logs")),
        cfg!(debug_assertions),
        Some(&config),
    );
    tracing::info!(
        wire = WIRE_VERSION,
        protocol = PROTOCOL_VERSION,
        "slipstream server starting"
    );

    let bind_addr: SocketAddr = format!(
        "{}:{}",
        config.network.server_address, config.network.server_port
    )
    .parse()?;

    let (server, events) = RaceServer::new(ServerConfig {
        bind_addr,
        max_connections: config.network.max_connections,
        frame: FrameConfig {
            max_payload_size: config.network.max_payload_size,
        },
        compression: CompressionConfig::default(),
    });
    let server = Arc::new(server);
    let sessions = Arc::new(SessionManager::new());

    let accept_server = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(err) = accept_server.run().await {
            tracing::error!("accept loop failed: {err}");
        }
    });

    run_rooms(server, sessions, events, config).await;
    Ok(())
}

/// The tick loop: drain network events, advance every room, broadcast.
async fn run_rooms(
    server: Arc<RaceServer>,
    sessions: Arc<SessionManager>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    config: Config,
) {
    let tick_rate = config.network.tick_rate.max(1);
    let dt = 1.0 / f64::from(tick_rate);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(dt));
    let session_timeout = Duration::from_secs(u64::from(config.network.timeout_seconds));

    let mut rooms: HashMap<String, Room> = HashMap::new();
    let mut ticks_since_timeout_scan = 0u32;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                while let Ok(event) = events.try_recv() {
                    handle_event(&server, &sessions, &mut rooms, &config, event).await;
                }

                for (room_id, room) in &mut rooms {
                    room.advance_tick(dt);
                    if let Some(payload) = room.broadcast_payload() {
                        let members = sessions.members_of_room(room_id).await;
                        if !members.is_empty() {
                            server.broadcast(&members, payload.message()).await;
                        }
                    }
                }

                ticks_since_timeout_scan += 1;
                if ticks_since_timeout_scan >= tick_rate {
                    ticks_since_timeout_scan = 0;
                    for (id, room_id, player_id) in
                        timeout_check(&sessions, session_timeout).await
                    {
                        if let Some(room) = rooms.get_mut(&room_id) {
                            room.remove_player(&player_id);
                        }
                        server.connections.remove(&id).await;
                    }
                    // Drop rooms whose last human member left.
                    rooms.retain(|room_id, room| {
                        let alive = room.state().cars.iter().any(|c| !c.is_npc);
                        if !alive {
                            tracing::info!(room = %room_id, "room emptied, dropping");
                        }
                        alive
                    });
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                server.shutdown();
                break;
            }
        }
    }
}

async fn handle_event(
    server: &RaceServer,
    sessions: &SessionManager,
    rooms: &mut HashMap<String, Room>,
    config: &Config,
    event: ServerEvent,
) {
    match event {
        ServerEvent::Connected(id) => {
            sessions.on_connect(id).await;
        }

        ServerEvent::Message(id, msg) => {
            sessions.touch(&id).await;
            handle_message(server, sessions, rooms, config, id, msg).await;
        }

        ServerEvent::Disconnected(id) => {
            if let Some((room_id, player_id)) = sessions.on_disconnect(id).await {
                if let Some(room) = rooms.get_mut(&room_id) {
                    room.remove_player(&player_id);
                }
                tracing::info!(room = %room_id, player = %player_id, "left room");
            }
        }
    }
}

async fn handle_message(
    server: &RaceServer,
    sessions: &SessionManager,
    rooms: &mut HashMap<String, Room>,
    config: &Config,
    id: ConnectionId,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::JoinRoom(join) => match sessions.join(id, &join).await {
            Ok(token) => {
                let room = rooms.entry(join.room_id.clone()).or_insert_with(|| {
                    let mut room = Room::new(
                        &join.room_id,
                        DEFAULT_TRACK,
                        config.spatial.cell_size,
                        config.sync.full_snapshot_interval,
                    );
                    for (npc_id, npc_name) in NPC_DRIVERS {
                        room.add_player(npc_id, npc_name, true);
                    }
                    tracing::info!(room = %join.room_id, "room created");
                    room
                });
                room.add_player(&join.player_id, "", false);

                let info = ServerMessage::RoomInfo(RoomInfoMsg {
                    room_id: join.room_id.clone(),
                    player_id: join.player_id.clone(),
                    role: join.role,
                    track_id: DEFAULT_TRACK.to_string(),
                    players: room
                        .roster()
                        .into_iter()
                        .map(|(player_id, username)| PlayerEntry {
                            player_id,
                            username,
                        })
                        .collect(),
                    session_token: Some(token),
                    protocol_version: Some(PROTOCOL_VERSION),
                    server_version: Some(env!("CARGO_PKG_VERSION").to_string()),
                });
                let _ = server.send_to(id, &info).await;

                // The first state a client sees is always a full snapshot.
                let _ = server.send_to(id, &room.full_state_message()).await;

                let joined = ServerMessage::PlayerJoined(PlayerUpdate {
                    room_id: join.room_id.clone(),
                    player_id: join.player_id.clone(),
                    username: join.player_id.clone(),
                });
                let members: Vec<ConnectionId> = sessions
                    .members_of_room(&join.room_id)
                    .await
                    .into_iter()
                    .filter(|m| *m != id)
                    .collect();
                server.broadcast(&members, &joined).await;
            }
            Err(err) => {
                tracing::warn!("join rejected for {id:?}: {err}");
                let _ = server
                    .send_to(
                        id,
                        &ServerMessage::ErrorMessage(ErrorMessage {
                            message: err.to_string(),
                        }),
                    )
                    .await;
            }
        },

        ClientMessage::Input(input) => {
            // Only the session's own room takes its input.
            if sessions.room_of(&id).await.as_deref() == Some(input.room_id.as_str())
                && let Some(room) = rooms.get_mut(&input.room_id)
            {
                room.apply_input(input);
            }
        }

        ClientMessage::RequestStateFull { room_id } => {
            if let Some(room) = rooms.get(&room_id) {
                let _ = server.send_to(id, &room.full_state_message()).await;
            }
        }

        ClientMessage::UpdateUsername(update) => {
            if sessions.room_of(&id).await.as_deref() == Some(update.room_id.as_str()) {
                sessions.set_username(&id, &update.username).await;
                if let Some(room) = rooms.get_mut(&update.room_id) {
                    room.set_username(&update.player_id, &update.username);
                }
                let members = sessions.members_of_room(&update.room_id).await;
                server
                    .broadcast(&members, &ServerMessage::PlayerUpdated(update))
                    .await;
            }
        }

        ClientMessage::RadioCycle { room_id } => {
            if let Some(room) = rooms.get_mut(&room_id) {
                room.cycle_radio();
            }
        }
    }
}

//! Networking for slipstream: wire messages and codec, TCP framing,
//! payload compression, the client protocol state machine, server-side
//! session lifecycle, and the tokio TCP client/server glue.
//!
//! In-order delivery of messages within one connection is an *assumption*
//! inherited from TCP, not a protocol invariant — there are no sequence
//! numbers or acknowledgments; the full snapshot is the sole point of
//! re-anchoring after any desynchronization.

pub mod compression;
pub mod framing;
pub mod messages;
pub mod protocol;
pub mod session;
pub mod tcp_client;
pub mod tcp_server;

pub use compression::{CompressionConfig, CompressionError, compress_payload, decompress_payload};
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use messages::{
    ClientMessage, ErrorMessage, InputAction, InputFrame, JoinRoom, MessageError, PROTOCOL_VERSION,
    PlayerEntry, PlayerUpdate, Role, RoomInfoMsg, ServerMessage, WIRE_VERSION, deserialize_message,
    serialize_message,
};
pub use protocol::{ClientProtocol, ConnectionPhase};
pub use session::{JoinError, Session, SessionManager, SessionState, timeout_check};
pub use tcp_client::{ConnectionState, ConnectionStateWatch, RaceClient, SendError};
pub use tcp_server::{
    ConnectionId, ConnectionLimitReached, ConnectionMap, IdGenerator, RaceServer, ServerConfig,
    ServerEvent,
};

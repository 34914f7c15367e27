//! Real-time room transport
//!
//! # Architecture
//!
//! - **Authenticator**: handshake checks run before a socket joins a room
//! - **Consumer**: one per admitted socket, relays between socket and group
//! - **Bus**: group-addressed fan-out, in-process or across processes via Redis
//! - **Handler**: Axum WebSocket route handler

pub mod authenticator;
pub mod bus;
pub mod consumer;
pub mod handler;
pub mod redis_bus;

pub use authenticator::{
    ConnectionAuthenticator, ConnectionContext, HandshakeQuery, Rejection, CLOSE_FORBIDDEN,
    CLOSE_INTERNAL, CLOSE_INVALID,
};
pub use bus::{BroadcastBus, BusError, GroupMember, LocalBus};
pub use consumer::{ConsumerState, RoomConsumer};
pub use handler::ws_handler;
pub use redis_bus::RedisBus;

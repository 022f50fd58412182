//! `agent_client`
//!
//! Autonomous agent for an authority-partitioned simulation:
//! - Session lifecycle: connect with bounded retries, request an agent
//!   entity, track authority over it, tear down on disconnect
//! - Liveness tracking from heartbeat ping/pong round trips
//! - Periodic behaviours (ping, direction change, status) on a tick scheduler
//! - Wandering movement validated against the cached tile map
//! - Transports: length-prefixed JSON over TCP, plus an in-memory loopback

pub mod args;
pub mod liveness;
pub mod movement;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use session::{Session, SessionError, SessionState};
pub use transport::{Connector, LoopbackTransport, TcpConnector, TcpTransport, Transport};

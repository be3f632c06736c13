//! USB serial link core for a telepresence robot
//!
//! Discovers a supported USB serial controller, walks the host permission
//! handshake, opens the port at 9600 8-N-1 and exposes a fire-and-forget
//! command gateway plus a telemetry notice stream. All lifecycle events are
//! serialized through a single state-machine task.

pub mod error;
pub mod gateway;
pub mod link;
pub mod registry;
pub mod transport;
pub mod watch;

#[cfg(test)]
mod testutil;

pub use error::LinkError;
pub use gateway::CommandGateway;
pub use link::{LinkConfig, LinkHandle, LinkNotice, LinkState, LinkStatus, SerialLink};

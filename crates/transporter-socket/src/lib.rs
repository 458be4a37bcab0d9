//! Connection-oriented envelope over a raw duplex port (§4.7), and the
//! server that accepts such connections on a shared message target
//! (§4.8).
//!
//! A [`Socket`] wraps one port: handshake, heartbeat, send-buffer and
//! graceful close. A [`server::SocketServer`] listens for `Connect`
//! messages on a shared target and spawns one [`Socket`] per accepted
//! client. Neither type knows about [`transporter_session::Session`] or
//! RPC semantics — a socket's public receive stream is exactly the
//! application [`transporter_protocol::Envelope`]s a session would want
//! to route, which is exactly what `transporter-session`'s `input`
//! parameter expects.

mod error;
mod options;
mod server;
mod socket;
mod state;

pub use error::SocketError;
pub use options::{BufferLimit, BufferOverflowStrategy, SocketOptions};
pub use server::{ClientPort, ConnectAttempt, ConnectFilter, SocketServer};
pub use socket::{Socket, SocketRole};
pub use state::SocketState;

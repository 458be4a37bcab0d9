//! Stateless unicast request/response overlay for connectionless
//! transports (§4.9), e.g. a service worker message target. No
//! handshake, no heartbeat, no send buffer and no state machine — just a
//! request posted and its reply correlated by id.

mod client;
mod codec;
mod error;
mod server;

pub use client::{RequestClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::RequestError;
pub use server::{RequestHandler, RequestServer};
pub use transporter_protocol::{RequestMessage, ResponseMessage};

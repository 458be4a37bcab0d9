//! Wire types shared by every Transporter crate: the message envelope,
//! the reference-encoding marker, the subprotocol descriptor, and the
//! stateless request/response frames.
//!
//! This crate defines shapes only — no behavior. The codec
//! (`transporter-codec`), agents (`transporter-agent`), and socket
//! (`transporter-socket`) crates give these types meaning.

mod envelope;
mod reference;
mod rr_messages;
mod subprotocol;

pub use envelope::{current_version, Envelope, MessageBody, MessageId, VersionCompat, PROTOCOL_NAME};
pub use reference::Marker;
pub use rr_messages::{RequestMessage, ResponseMessage};
pub use subprotocol::{ConnectionMode, OperationMode, Subprotocol, TransmissionMode};

pub use semver::Version;
pub use transporter_address::Address;

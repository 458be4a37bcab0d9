use serde::{Deserialize, Serialize};
use transporter_address::Address;

/// A stateless unicast request (§4.9, §6 "Request/Response messages").
///
/// Unlike [`crate::Envelope`], request/response frames have no protocol
/// version and no handshake: they are a thin overlay for transports that
/// are inherently connectionless (e.g. a service worker message target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: String,
    pub address: Address,
    /// Filled in by the server from the transport-supplied origin on
    /// receipt; absent on transports with no notion of origin.
    pub origin: Option<String>,
    pub body: serde_json::Value,
}

/// The reply to a [`RequestMessage`], correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub id: String,
    pub body: serde_json::Value,
}

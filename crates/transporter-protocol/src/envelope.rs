use semver::Version;
use serde::{Deserialize, Serialize};
use transporter_address::Address;

/// The wire constant every envelope carries in its `protocol` field.
pub const PROTOCOL_NAME: &str = "transporter";

/// The version this build of the crate speaks.
///
/// Compatibility (see [`Version::same_release_line`]) is major+minor,
/// matching §6: "accept iff (msg.major, msg.minor) == (self.major,
/// self.minor); otherwise warn-and-accept."
pub fn current_version() -> Version {
    Version::new(1, 0, 0)
}

/// Extension trait carrying the envelope's compatibility rule.
pub trait VersionCompat {
    fn same_release_line(&self, other: &Version) -> bool;
}

impl VersionCompat for Version {
    fn same_release_line(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

/// A correlation id, fresh per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The message envelope (§3 "Message").
///
/// Every message that crosses a transport carries these five fields plus
/// the variant-specific payload in [`MessageBody`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    pub version: Version,
    pub address: Address,
    pub id: MessageId,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Envelope {
    pub fn new(address: Address, id: MessageId, body: MessageBody) -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: current_version(),
            address,
            id,
            body,
        }
    }

    /// Whether this message belongs to the socket's control plane (§4.7
    /// "Public receive ... filters out all control messages") rather than
    /// being application/RPC traffic that a session's input stream should
    /// observe.
    pub fn is_control(&self) -> bool {
        matches!(
            self.body,
            MessageBody::Connect { .. }
                | MessageBody::Connected
                | MessageBody::Disconnect
                | MessageBody::Disconnected
                | MessageBody::Ping { .. }
                | MessageBody::Pong { .. }
        )
    }
}

/// The tagged-union body of a [`Envelope`] (§3 "Message" variants).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageBody {
    /// Invoke the function at `path` with `args`.
    Call {
        path: Vec<String>,
        args: serde_json::Value,
        #[serde(rename = "noReply")]
        no_reply: bool,
    },
    /// A successful reply carrying the encoded return value.
    Set { value: serde_json::Value },
    /// A failure reply carrying the encoded thrown value.
    Error { error: serde_json::Value },
    /// Notifies a server agent that its client-side proxy was finalized.
    GarbageCollect,
    /// Socket heartbeat probe.
    Ping { id: String },
    /// Socket heartbeat response.
    Pong { id: String },
    /// Socket handshake: client requests a connection to `address`.
    Connect { address: Address },
    /// Socket handshake: server accepted the connection.
    Connected,
    /// Socket teardown: either side initiates a graceful close.
    Disconnect,
    /// Socket teardown: the peer acknowledges the close.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let env = Envelope::new(
            Address::new("srv-1"),
            MessageId::new(),
            MessageBody::Call {
                path: vec!["foo".into(), "bar".into()],
                args: serde_json::json!([1, "x"]),
                no_reply: false,
            },
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"Call\""));
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.address, env.address);
        assert!(matches!(back.body, MessageBody::Call { no_reply: false, .. }));
    }

    #[test]
    fn version_compat_ignores_patch() {
        let a = Version::new(1, 2, 3);
        let b = Version::new(1, 2, 9);
        let c = Version::new(1, 3, 0);
        assert!(a.same_release_line(&b));
        assert!(!a.same_release_line(&c));
    }

    #[test]
    fn control_messages_are_classified() {
        let control = Envelope::new(Address::root(), MessageId::new(), MessageBody::Ping { id: "1".into() });
        assert!(control.is_control());
        let app = Envelope::new(Address::root(), MessageId::new(), MessageBody::GarbageCollect);
        assert!(!app.is_control());
    }
}

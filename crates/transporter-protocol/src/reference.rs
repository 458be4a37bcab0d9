use serde::{Deserialize, Serialize};
use transporter_address::Address;

/// The reference-encoding rule (§3 "Reference encoding", §6): inside any
/// payload, a function or an explicit proxy container is replaced on the
/// wire by this marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Marker {
    Proxy { address: Address },
    /// `undefined` in a payload is preserved via this explicit sentinel
    /// when the transport's clone would otherwise drop it (§4.2 edge-case
    /// policy). `serde_json::Value::Null` maps to JSON `null`/JS `null`,
    /// which is a distinct value from `undefined` in the original host —
    /// this marker keeps that distinction on the wire.
    Undefined,
}

impl Marker {
    pub fn proxy(address: Address) -> serde_json::Value {
        serde_json::to_value(Marker::Proxy { address }).expect("Marker serializes infallibly")
    }

    pub fn undefined() -> serde_json::Value {
        serde_json::to_value(Marker::Undefined).expect("Marker serializes infallibly")
    }

    /// Recognize a marker if `value` is shaped like one, without
    /// consuming it.
    pub fn try_from_value(value: &serde_json::Value) -> Option<Marker> {
        serde_json::from_value(value.clone()).ok()
    }
}

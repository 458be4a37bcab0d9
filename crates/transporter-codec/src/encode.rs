use transporter_address::Address;

use crate::payload::{ExposedFn, Payload, ProxyHandleRef};
use std::sync::Arc;

/// What `encode` found at a leaf that needs a fresh address (§4.2
/// "function or proxy-container -> call makeRef(node)").
pub enum EncodeTarget {
    Function(Arc<ExposedFn>),
    Proxy(ProxyHandleRef),
}

/// `encode` failed partway through a traversal.
///
/// Per §4.2's invariant and §9 Open Question (ii) (resolved in
/// `SPEC_FULL.md` §12 to apply uniformly): every reference successfully
/// encoded *before* the failing node must be rolled back by the caller.
/// `created` carries exactly those addresses so the session can terminate
/// the server agents it already spawned for them.
pub struct EncodeFailure<E> {
    pub created: Vec<Address>,
    pub source: E,
}

impl<E: std::fmt::Debug> std::fmt::Debug for EncodeFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeFailure")
            .field("created", &self.created)
            .field("source", &self.source)
            .finish()
    }
}

impl<E: std::fmt::Display> std::fmt::Display for EncodeFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "encode failed after creating {} reference(s): {}", self.created.len(), self.source)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for EncodeFailure<E> {}

/// Recursively traverse `payload`, replacing every function or proxy
/// container with `{"type":"Proxy","address":...}` (§4.2, §6).
///
/// `make_ref` is invoked exactly once per reference encountered, in
/// traversal order; it is the session's job (§4.5 "Encode hook") to spawn
/// a server agent and return its freshly claimed address.
pub fn encode<E>(
    payload: &Payload,
    make_ref: &mut dyn FnMut(EncodeTarget) -> Result<Address, E>,
) -> Result<serde_json::Value, EncodeFailure<E>> {
    let mut created = Vec::new();
    match encode_node(payload, make_ref, &mut created) {
        Ok(value) => Ok(value),
        Err(source) => Err(EncodeFailure { created, source }),
    }
}

fn encode_node<E>(
    payload: &Payload,
    make_ref: &mut dyn FnMut(EncodeTarget) -> Result<Address, E>,
    created: &mut Vec<Address>,
) -> Result<serde_json::Value, E> {
    match payload {
        Payload::Null => Ok(serde_json::Value::Null),
        Payload::Undefined => Ok(transporter_protocol::Marker::undefined()),
        Payload::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Payload::Number(n) => Ok(serde_json::Value::Number(n.clone())),
        Payload::String(s) => Ok(serde_json::Value::String(s.clone())),
        Payload::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_node(item, make_ref, created)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        Payload::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), encode_node(v, make_ref, created)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        Payload::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let ek = encode_node(k, make_ref, created)?;
                let ev = encode_node(v, make_ref, created)?;
                out.push(serde_json::json!([ek, ev]));
            }
            Ok(serde_json::json!({ "type": "Map", "entries": out }))
        }
        Payload::Set(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encode_node(item, make_ref, created)?);
            }
            Ok(serde_json::json!({ "type": "Set", "values": out }))
        }
        Payload::Function(f) => {
            let address = make_ref(EncodeTarget::Function(f.clone()))?;
            created.push(address.clone());
            Ok(transporter_protocol::Marker::proxy(address))
        }
        Payload::Proxy(p) => {
            let address = make_ref(EncodeTarget::Proxy(p.clone()))?;
            created.push(address.clone());
            Ok(transporter_protocol::Marker::proxy(address))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn plain_values_pass_through_unchanged() {
        let payload = Payload::Array(vec![
            Payload::from(1i64),
            Payload::from("x"),
            Payload::Bool(true),
            Payload::Null,
        ]);
        let mut make_ref = |_: EncodeTarget| -> Result<Address, Infallible> {
            panic!("no references expected")
        };
        let value = encode(&payload, &mut make_ref).unwrap();
        assert_eq!(value, serde_json::json!([1, "x", true, null]));
    }

    #[test]
    fn function_becomes_a_proxy_marker() {
        let f = ExposedFn::new(Arc::new(|_args| Box::pin(async { Ok(Payload::Null) })));
        let payload = Payload::Object(
            [("cb".to_string(), Payload::Function(f))].into_iter().collect(),
        );
        let mut n = 0;
        let mut make_ref = |_: EncodeTarget| -> Result<Address, Infallible> {
            n += 1;
            Ok(Address::new(format!("srv-{n}")))
        };
        let value = encode(&payload, &mut make_ref).unwrap();
        assert_eq!(value["cb"]["type"], "Proxy");
        assert_eq!(value["cb"]["address"], "srv-1");
        assert_eq!(n, 1);
    }

    #[test]
    fn undefined_encodes_to_its_own_sentinel_not_null() {
        let mut make_ref = |_: EncodeTarget| -> Result<Address, Infallible> {
            panic!("no references expected")
        };
        let value = encode(&Payload::Undefined, &mut make_ref).unwrap();
        assert_ne!(value, serde_json::Value::Null);
        assert_eq!(value["type"], "Undefined");
    }

    #[test]
    fn failure_reports_addresses_already_created_for_rollback() {
        let f_ok = ExposedFn::new(Arc::new(|_| Box::pin(async { Ok(Payload::Null) })));
        let f_bad = ExposedFn::new(Arc::new(|_| Box::pin(async { Ok(Payload::Null) })));
        let payload = Payload::Array(vec![Payload::Function(f_ok), Payload::Function(f_bad)]);
        let mut seen = 0;
        let mut make_ref = |_: EncodeTarget| -> Result<Address, &'static str> {
            seen += 1;
            if seen == 1 {
                Ok(Address::new("srv-1"))
            } else {
                Err("boom")
            }
        };
        let err = encode(&payload, &mut make_ref).unwrap_err();
        assert_eq!(err.created, vec![Address::new("srv-1")]);
        assert_eq!(err.source, "boom");
    }
}

use indexmap::IndexMap;
use transporter_address::Address;
use transporter_protocol::Marker;

/// The dual of [`crate::Payload`]: what `decode` rebuilds from wire JSON,
/// parameterized over `P`, the concrete proxy handle type the caller's
/// `make_proxy` hook constructs (typically `transporter_agent::Proxy`).
///
/// The codec crate never names that type directly — it sits above codec
/// in the dependency graph — which is why `decode` is generic over it.
#[derive(Debug, Clone)]
pub enum Decoded<P> {
    Null,
    /// The decoded dual of [`crate::Payload::Undefined`] — kept distinct
    /// from `Null` so a round trip through the wire doesn't silently
    /// collapse `undefined` into `null` (§4.2 edge-case policy).
    Undefined,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Decoded<P>>),
    Object(IndexMap<String, Decoded<P>>),
    Map(Vec<(Decoded<P>, Decoded<P>)>),
    Set(Vec<Decoded<P>>),
    Proxy(P),
}

impl<P> Decoded<P> {
    /// Convenience accessor for callers that know the top-level value is a
    /// single materialized proxy (the common "the reply was a function"
    /// case is rare; this is mostly useful in tests).
    pub fn as_proxy(&self) -> Option<&P> {
        match self {
            Decoded::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Re-encode back into plain JSON, dropping proxy nodes down to
    /// whatever `to_value` produces for them (e.g. re-serializing the
    /// marker to forward a proxy somewhere without dereferencing it).
    pub fn into_json(self, proxy_to_value: &impl Fn(P) -> serde_json::Value) -> serde_json::Value {
        match self {
            Decoded::Null => serde_json::Value::Null,
            Decoded::Undefined => Marker::undefined(),
            Decoded::Bool(b) => serde_json::Value::Bool(b),
            Decoded::Number(n) => serde_json::Value::Number(n),
            Decoded::String(s) => serde_json::Value::String(s),
            Decoded::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(|i| i.into_json(proxy_to_value)).collect())
            }
            Decoded::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into_json(proxy_to_value))).collect(),
            ),
            Decoded::Map(entries) => {
                let entries: Vec<serde_json::Value> = entries
                    .into_iter()
                    .map(|(k, v)| serde_json::json!([k.into_json(proxy_to_value), v.into_json(proxy_to_value)]))
                    .collect();
                serde_json::json!({ "type": "Map", "entries": entries })
            }
            Decoded::Set(items) => {
                let values: Vec<serde_json::Value> =
                    items.into_iter().map(|i| i.into_json(proxy_to_value)).collect();
                serde_json::json!({ "type": "Set", "values": values })
            }
            Decoded::Proxy(p) => proxy_to_value(p),
        }
    }
}

/// Recursively traverse `value`, materializing a proxy wherever a
/// `{"type":"Proxy", address}` marker is found (§4.2, §6).
///
/// `make_proxy` is invoked exactly once per marker encountered, in
/// traversal order; it is the session's job (§4.5 "Decode hook") to spawn
/// a client agent for that address and register the resulting proxy for
/// finalization-driven GC.
pub fn decode<P, E>(
    value: &serde_json::Value,
    make_proxy: &mut dyn FnMut(Address) -> Result<P, E>,
) -> Result<Decoded<P>, E> {
    if let Some(marker) = Marker::try_from_value(value) {
        return match marker {
            Marker::Proxy { address } => Ok(Decoded::Proxy(make_proxy(address)?)),
            Marker::Undefined => Ok(Decoded::Undefined),
        };
    }
    if let Some(map_shape) = as_map_shape(value) {
        let mut entries = Vec::with_capacity(map_shape.len());
        for pair in map_shape {
            let k = pair.get(0).unwrap_or(&serde_json::Value::Null);
            let v = pair.get(1).unwrap_or(&serde_json::Value::Null);
            entries.push((decode(k, make_proxy)?, decode(v, make_proxy)?));
        }
        return Ok(Decoded::Map(entries));
    }
    if let Some(set_shape) = as_set_shape(value) {
        let mut out = Vec::with_capacity(set_shape.len());
        for item in set_shape {
            out.push(decode(item, make_proxy)?);
        }
        return Ok(Decoded::Set(out));
    }
    match value {
        serde_json::Value::Null => Ok(Decoded::Null),
        serde_json::Value::Bool(b) => Ok(Decoded::Bool(*b)),
        serde_json::Value::Number(n) => Ok(Decoded::Number(n.clone())),
        serde_json::Value::String(s) => Ok(Decoded::String(s.clone())),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(decode(item, make_proxy)?);
            }
            Ok(Decoded::Array(out))
        }
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), decode(v, make_proxy)?);
            }
            Ok(Decoded::Object(out))
        }
    }
}

fn as_map_shape(value: &serde_json::Value) -> Option<&Vec<serde_json::Value>> {
    let obj = value.as_object()?;
    if obj.get("type")?.as_str()? != "Map" {
        return None;
    }
    obj.get("entries")?.as_array()
}

fn as_set_shape(value: &serde_json::Value) -> Option<&Vec<serde_json::Value>> {
    let obj = value.as_object()?;
    if obj.get("type")?.as_str()? != "Set" {
        return None;
    }
    obj.get("values")?.as_array()
}

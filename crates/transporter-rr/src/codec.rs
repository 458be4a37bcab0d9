use std::convert::Infallible;

use indexmap::IndexMap;
use transporter_codec::{decode, encode, Decoded, Payload};

use crate::error::RequestError;

/// Encode a body with no reference support: any function or proxy inside
/// it is rejected rather than handed to a session that doesn't exist here.
pub fn encode_body(payload: &Payload) -> Result<serde_json::Value, RequestError> {
    encode(payload, &mut |_target| Err(RequestError::ReferencesUnsupported)).map_err(|failure| failure.source)
}

/// Decode a body with no reference support (see [`encode_body`]).
pub fn decode_body(value: &serde_json::Value) -> Result<Payload, RequestError> {
    let decoded: Decoded<Infallible> =
        decode(value, &mut |_address| Err(RequestError::ReferencesUnsupported))?;
    Ok(decoded_to_payload(decoded))
}

fn decoded_to_payload(decoded: Decoded<Infallible>) -> Payload {
    match decoded {
        Decoded::Null => Payload::Null,
        Decoded::Undefined => Payload::Undefined,
        Decoded::Bool(b) => Payload::Bool(b),
        Decoded::Number(n) => Payload::Number(n),
        Decoded::String(s) => Payload::String(s),
        Decoded::Array(items) => Payload::Array(items.into_iter().map(decoded_to_payload).collect()),
        Decoded::Object(map) => {
            Payload::Object(map.into_iter().map(|(k, v)| (k, decoded_to_payload(v))).collect::<IndexMap<_, _>>())
        }
        Decoded::Map(entries) => {
            Payload::Map(entries.into_iter().map(|(k, v)| (decoded_to_payload(k), decoded_to_payload(v))).collect())
        }
        Decoded::Set(items) => Payload::Set(items.into_iter().map(decoded_to_payload).collect()),
        Decoded::Proxy(never) => match never {},
    }
}

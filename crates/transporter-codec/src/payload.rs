use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use transporter_address::Address;

/// A boxed, type-erased invocation of a function discovered in a payload.
///
/// The server agent (`transporter-agent`) is the only consumer that ever
/// calls one of these; the codec treats it as an opaque leaf it must
/// replace with a [`crate::EncodeTarget::Function`] reference.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type Callable = Arc<
    dyn Fn(Vec<Payload>) -> BoxFuture<'static, Result<Payload, Payload>> + Send + Sync,
>;

/// A function discovered in a payload, together with the dependency-
/// injection tags the server agent must resolve before invoking it
/// (§4.4 "Inspect the target function for injected tags; produce the
/// dependency tuple from the injector").
pub struct ExposedFn {
    pub tags: Vec<String>,
    pub call: Callable,
}

impl ExposedFn {
    pub fn new(call: Callable) -> Arc<Self> {
        Arc::new(Self { tags: Vec::new(), call })
    }

    pub fn with_tags(tags: Vec<String>, call: Callable) -> Arc<Self> {
        Arc::new(Self { tags, call })
    }
}

/// A handle to a proxy already obtained from some client agent, found
/// sitting inside a payload about to be encoded (e.g. a callback handed
/// back to its own origin, or passed along to a third party).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHandleRef {
    pub address: Address,
    pub path: Vec<String>,
}

/// The codec's internal value representation (§4.2 "Codec").
///
/// Real application payloads in this host have no universal runtime
/// "plain record/array/map/set" representation the way a JS value does,
/// so the codec works over this explicit tree instead of raw Rust types.
/// Application code builds a `Payload` (directly, or via [`ToPayload`])
/// before handing it to `encode`, and receives a [`crate::Decoded`] tree
/// back from `decode`.
#[derive(Clone)]
pub enum Payload {
    Null,
    /// `undefined`, distinct from `Null` (§4.2 edge-case policy: "`undefined`
    /// in messages is preserved via an explicit sentinel when the
    /// transport's clone would drop it"). Application code that wants this
    /// distinction to survive the wire constructs it explicitly; nothing
    /// in this crate produces it implicitly.
    Undefined,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// A plain record. Key order is not semantically required (§4.2) but
    /// is preserved because `IndexMap` costs nothing extra to keep.
    Object(IndexMap<String, Payload>),
    Array(Vec<Payload>),
    /// A map keyed by payload values rather than strings — distinct from
    /// `Object` per §4.2 ("map/set -> map entries recursively").
    Map(Vec<(Payload, Payload)>),
    Set(Vec<Payload>),
    /// A function discovered in the payload; replaced by a `Proxy`
    /// reference marker on encode.
    Function(Arc<ExposedFn>),
    /// An existing proxy discovered in the payload (e.g. a callback being
    /// forwarded); also replaced by a `Proxy` reference marker on encode.
    Proxy(ProxyHandleRef),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Null => write!(f, "Null"),
            Payload::Undefined => write!(f, "Undefined"),
            Payload::Bool(b) => write!(f, "Bool({b})"),
            Payload::Number(n) => write!(f, "Number({n})"),
            Payload::String(s) => write!(f, "String({s:?})"),
            Payload::Object(o) => f.debug_map().entries(o.iter()).finish(),
            Payload::Array(a) => f.debug_list().entries(a.iter()).finish(),
            Payload::Map(m) => write!(f, "Map({} entries)", m.len()),
            Payload::Set(s) => write!(f, "Set({} entries)", s.len()),
            Payload::Function(exposed) => write!(f, "Function(tags={:?})", exposed.tags),
            Payload::Proxy(p) => write!(f, "Proxy({:?})", p.address),
        }
    }
}

impl From<serde_json::Value> for Payload {
    /// Opaque JSON values (already-encoded arguments, primitives) lift into
    /// `Payload` with no functions or proxies inside — the common case for
    /// args that were themselves decoded from the wire.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Payload::Null,
            serde_json::Value::Bool(b) => Payload::Bool(b),
            serde_json::Value::Number(n) => Payload::Number(n),
            serde_json::Value::String(s) => Payload::String(s),
            serde_json::Value::Array(a) => Payload::Array(a.into_iter().map(Payload::from).collect()),
            serde_json::Value::Object(o) => {
                Payload::Object(o.into_iter().map(|(k, v)| (k, Payload::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::String(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::String(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Number(value.into())
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(Payload::Number)
            .unwrap_or(Payload::Null)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(value: Vec<T>) -> Self {
        Payload::Array(value.into_iter().map(Into::into).collect())
    }
}

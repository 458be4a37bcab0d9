use std::sync::Arc;

use tokio::sync::mpsc;
use transporter_address::Address;
use transporter_codec::{Decoded, Payload};
use transporter_fiber::Fiber;
use transporter_protocol::{Envelope, MessageBody, MessageId};

use crate::client::Proxy;
use crate::error::AgentError;
use crate::hooks::{DecodeHook, EncodeHook};
use crate::outbox::Outbox;

/// Resolves the dependency-injection tags a function declares into
/// argument values prepended before the caller's own arguments (§4.4
/// "Inspect the target function for injected tags").
pub trait Injector: Send + Sync {
    fn provide(&self, tags: &[String]) -> Result<Vec<Payload>, AgentError>;
}

/// The injector used when `expose` is not given one: any function with
/// declared tags fails to resolve, since there is nothing to provide them.
pub struct NoopInjector;

impl Injector for NoopInjector {
    fn provide(&self, tags: &[String]) -> Result<Vec<Payload>, AgentError> {
        if tags.is_empty() {
            Ok(Vec::new())
        } else {
            Err(AgentError::Injection(format!(
                "no injector configured, but function declares tags {tags:?}"
            )))
        }
    }
}

/// Resolve `path` inside `value` (§4.4 step 1: "The leading prefix locates
/// the calling context; the trailing name identifies the function. If
/// `path` is empty the provided value itself is a function").
fn resolve_path<'a>(value: &'a Payload, path: &[String]) -> Result<&'a Payload, AgentError> {
    let mut current = value;
    for (i, key) in path.iter().enumerate() {
        match current {
            Payload::Object(map) => match map.get(key) {
                Some(next) => current = next,
                None => return Err(AgentError::PathNotFound(path[..=i].to_vec())),
            },
            Payload::Array(items) => {
                let idx: usize = key
                    .parse()
                    .map_err(|_| AgentError::PathNotFound(path[..=i].to_vec()))?;
                match items.get(idx) {
                    Some(next) => current = next,
                    None => return Err(AgentError::PathNotFound(path[..=i].to_vec())),
                }
            }
            _ => return Err(AgentError::PathNotFound(path[..=i].to_vec())),
        }
    }
    Ok(current)
}

struct ServerAgentShared {
    address: Address,
    fiber: Arc<Fiber>,
    output: Outbox,
    value: Payload,
    injector: Arc<dyn Injector>,
    encode: EncodeHook,
    decode: DecodeHook,
}

impl ServerAgentShared {
    async fn dispatch(self: &Arc<Self>, id: MessageId, path: Vec<String>, args: serde_json::Value, no_reply: bool) {
        let result = self.invoke(&path, args).await;
        if no_reply {
            return;
        }
        match result {
            Ok(payload) => match (self.encode)(&payload) {
                Ok(value) => self.output.send(Envelope::new(self.address.clone(), id, MessageBody::Set { value })),
                Err(failure) => {
                    tracing::warn!(address = %self.address, "failed to encode call result: {}", failure.source);
                    self.output.send(Envelope::new(
                        self.address.clone(),
                        id,
                        MessageBody::Error { error: serde_json::json!(failure.source.to_string()) },
                    ));
                }
            },
            Err(err) => {
                let encoded_error = self.encode_error(&err);
                self.output.send(Envelope::new(self.address.clone(), id, MessageBody::Error { error: encoded_error }));
            }
        }
    }

    /// §4.4 steps 1-4: resolve, inject, decode args, invoke, await.
    async fn invoke(&self, path: &[String], args: serde_json::Value) -> Result<Payload, AgentError> {
        let target = resolve_path(&self.value, path)?;
        let exposed = match target {
            Payload::Function(exposed) => exposed.clone(),
            _ => return Err(AgentError::NotAFunction(path.to_vec())),
        };

        // §4.4 step 3: "Invoke with [...dependencies, ...decode(args)]".
        let mut call_args = self.injector.provide(&exposed.tags)?;
        let decoded_args = (self.decode)(&args)?;
        match decoded_to_payload(decoded_args) {
            Payload::Array(items) => call_args.extend(items),
            other => call_args.push(other),
        }

        (exposed.call)(call_args)
            .await
            .map_err(|err| AgentError::Remote(payload_to_json_best_effort(&err)))
    }

    fn encode_error(&self, err: &AgentError) -> serde_json::Value {
        match err {
            AgentError::Remote(value) => value.clone(),
            other => serde_json::json!(other.to_string()),
        }
    }
}

/// Turn a decoded argument/return tree back into a [`Payload`], converting
/// any materialized [`Proxy`] into an invocable function that forwards the
/// call back out over the wire — this is what lets a server agent invoke
/// a callback it received as an argument (§2 "recursively spawning new
/// Server Agents for any function or proxy discovered"; scenario S2).
pub fn decoded_to_payload(decoded: Decoded<Proxy>) -> Payload {
    match decoded {
        Decoded::Null => Payload::Null,
        Decoded::Undefined => Payload::Undefined,
        Decoded::Bool(b) => Payload::Bool(b),
        Decoded::Number(n) => Payload::Number(n),
        Decoded::String(s) => Payload::String(s),
        Decoded::Array(items) => Payload::Array(items.into_iter().map(decoded_to_payload).collect()),
        Decoded::Object(map) => {
            Payload::Object(map.into_iter().map(|(k, v)| (k, decoded_to_payload(v))).collect())
        }
        Decoded::Map(entries) => Payload::Map(
            entries
                .into_iter()
                .map(|(k, v)| (decoded_to_payload(k), decoded_to_payload(v)))
                .collect(),
        ),
        Decoded::Set(items) => Payload::Set(items.into_iter().map(decoded_to_payload).collect()),
        Decoded::Proxy(proxy) => Payload::Function(transporter_codec::ExposedFn::new(proxy_to_callable(proxy))),
    }
}

fn proxy_to_callable(proxy: Proxy) -> transporter_codec::Callable {
    Arc::new(move |args: Vec<Payload>| {
        let proxy = proxy.clone();
        Box::pin(async move {
            match proxy.call(Payload::Array(args)).await {
                Ok(decoded) => Ok(decoded_to_payload(decoded)),
                Err(crate::error::AgentError::Remote(value)) => Err(Payload::from(value)),
                Err(other) => Err(Payload::String(other.to_string())),
            }
        })
    })
}

fn payload_to_json_best_effort(payload: &Payload) -> serde_json::Value {
    match payload {
        Payload::Null => serde_json::Value::Null,
        Payload::Undefined => transporter_protocol::Marker::undefined(),
        Payload::Bool(b) => serde_json::Value::Bool(*b),
        Payload::Number(n) => serde_json::Value::Number(n.clone()),
        Payload::String(s) => serde_json::Value::String(s.clone()),
        Payload::Array(items) => serde_json::Value::Array(items.iter().map(payload_to_json_best_effort).collect()),
        Payload::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), payload_to_json_best_effort(v))).collect(),
        ),
        Payload::Map(_) | Payload::Set(_) | Payload::Function(_) | Payload::Proxy(_) => {
            serde_json::json!("<unserializable thrown value>")
        }
    }
}

/// A server agent's public handle: the [`Fiber`] a supervisor observes.
/// The actual dispatch loop runs in a background task and is torn down
/// when the fiber terminates (explicit `close`, or a received
/// `GarbageCollect`).
pub struct ServerAgentHandle {
    pub fiber: Arc<Fiber>,
    pub address: Address,
}

/// Spawn a server agent wrapping `value` at `address` (auto-generating one
/// if `address.is_root()` is not desired — callers that want a fresh
/// non-root address should generate one before calling, e.g. via `uuid`).
///
/// `inbox` delivers `Call`/`GarbageCollect` envelopes addressed to
/// `address`; the session routes them here.
pub fn spawn_server_agent(
    address: Address,
    output: Outbox,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    value: Payload,
    injector: Arc<dyn Injector>,
    encode: EncodeHook,
    decode: DecodeHook,
) -> ServerAgentHandle {
    let fiber = Arc::new(Fiber::new(format!("server:{address}")));
    let shared = Arc::new(ServerAgentShared {
        address: address.clone(),
        fiber: fiber.clone(),
        output,
        value,
        injector,
        encode,
        decode,
    });

    let loop_fiber = fiber.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = loop_fiber.terminated() => break,
                received = inbox.recv() => {
                    match received {
                        Some(envelope) => {
                            match envelope.body {
                                MessageBody::Call { path, args, no_reply } => {
                                    let shared = shared.clone();
                                    let id = envelope.id;
                                    tokio::spawn(async move {
                                        shared.dispatch(id, path, args, no_reply).await;
                                    });
                                }
                                MessageBody::GarbageCollect => {
                                    tracing::debug!(address = %shared.address, "received GarbageCollect, terminating server agent");
                                    loop_fiber.terminate();
                                    break;
                                }
                                _ => {}
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    ServerAgentHandle { fiber, address }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use transporter_address::Address;
use transporter_codec::{Decoded, Payload};
use transporter_fiber::Fiber;
use transporter_protocol::{Envelope, MessageBody, MessageId};

use crate::error::AgentError;
use crate::hooks::{DecodeHook, EncodeHook};
use crate::outbox::Outbox;

/// Default timeout for an outstanding call at the raw proxy layer (§6
/// "Configuration options", §5 "Cancellation/timeouts").
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(1000);

type ReplyResult = Result<serde_json::Value, serde_json::Value>;

struct ClientAgentShared {
    server_address: Address,
    fiber: Arc<Fiber>,
    output: Outbox,
    no_reply: bool,
    timeout: Duration,
    encode: EncodeHook,
    decode: DecodeHook,
    outstanding: Mutex<HashMap<String, oneshot::Sender<ReplyResult>>>,
}

impl ClientAgentShared {
    fn handle_incoming(&self, envelope: Envelope) {
        match envelope.body {
            MessageBody::Set { value } => self.resolve(&envelope.id, Ok(value)),
            MessageBody::Error { error } => self.resolve(&envelope.id, Err(error)),
            // Ping/Pong/handshake variants belong to the socket's control
            // plane (§4.7) and never reach an agent's input stream; any
            // other variant arriving here is simply not meaningful for a
            // client agent and is ignored.
            _ => {}
        }
    }

    fn resolve(&self, id: &MessageId, result: ReplyResult) {
        if let Some(tx) = self.outstanding.lock().remove(id.as_str()) {
            let _ = tx.send(result);
        }
    }

    async fn call(&self, path: Vec<String>, args: &Payload) -> Result<Decoded<Proxy>, AgentError> {
        if self.fiber.is_terminated() {
            return Err(AgentError::Terminated);
        }
        let args_json = (self.encode)(args).map_err(AgentError::from)?;
        let id = MessageId::new();
        let envelope = Envelope::new(
            self.server_address.clone(),
            id.clone(),
            MessageBody::Call {
                path,
                args: args_json,
                no_reply: self.no_reply,
            },
        );

        if self.no_reply {
            self.output.send(envelope);
            return Ok(Decoded::Null);
        }

        let (tx, rx) = oneshot::channel();
        self.outstanding.lock().insert(id.as_str().to_string(), tx);
        self.output.send(envelope);

        let result = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => return Err(AgentError::Terminated),
            Err(_elapsed) => {
                self.outstanding.lock().remove(id.as_str());
                return Err(AgentError::Timeout);
            }
        };

        match result {
            Ok(value) => (self.decode)(&value).map_err(AgentError::from),
            Err(error) => Err(AgentError::Remote(error)),
        }
    }
}

impl Drop for ClientAgentShared {
    /// The finalization-driven GC the spec asks for (§4.3 "Lifetime",
    /// §8 "GC -> server release"). There is no `FinalizationRegistry`
    /// equivalent here — Rust's own `Arc` refcounting *is* the reachability
    /// tracker: the last [`Proxy`] holding this shared state to drop is
    /// exactly the moment the remote reference becomes unreachable, and
    /// this `Drop` impl fires synchronously and deterministically instead
    /// of at an unspecified later time. This resolves the Rust-native path
    /// spec.md §9 offers for hosts with no finalization primitive, but
    /// strictly better: nothing is leaked pending a GC pass that may never
    /// run.
    fn drop(&mut self) {
        if self.fiber.is_terminated() {
            return;
        }
        tracing::debug!(address = %self.server_address, "proxy unreachable, emitting GarbageCollect");
        self.output.send(Envelope::new(
            self.server_address.clone(),
            MessageId::new(),
            MessageBody::GarbageCollect,
        ));
        self.fiber.terminate();
    }
}

/// A handle to a remote value, indistinguishable from the local value it
/// stands in for except that every call returns a future (§1 "the
/// illusion of locality").
///
/// Per `SPEC_FULL.md` §12 (resolution of Open Question (i)), `Proxy` is
/// never awaitable/thenable itself: dereferencing and invocation are
/// explicit methods (`get`, `call`), each already returning a genuine
/// `impl Future`. Two proxies are reference-equal iff they denote the
/// same `(address, path)` (§3 "Proxy").
#[derive(Clone)]
pub struct Proxy {
    shared: Arc<ClientAgentShared>,
    path: Vec<String>,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("address", &self.shared.server_address)
            .field("path", &self.path)
            .finish()
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.shared.server_address == other.shared.server_address && self.path == other.path
    }
}
impl Eq for Proxy {}

impl std::hash::Hash for Proxy {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.shared.server_address.hash(state);
        self.path.hash(state);
    }
}

impl Proxy {
    /// The `(address, path)` metadata exposed "through a sentinel key so
    /// tooling (caches, tracing) can identify the remote target without
    /// forcing a round-trip" (§4.3 "Metadata").
    pub fn address(&self) -> &Address {
        &self.shared.server_address
    }

    pub fn object_path(&self) -> &[String] {
        &self.path
    }

    /// Return a memoized child proxy for `path ++ [key]` (§4.3 "Proxy
    /// algorithm"). Referential stability is structural here: two
    /// `Proxy` values for the same `(address, path)` already compare
    /// equal, so no physical handle cache is required (contrast with the
    /// original's `WeakMap`-backed cache, needed only because JS object
    /// identity has no structural fallback).
    pub fn get(&self, key: impl Into<String>) -> Proxy {
        let mut path = self.path.clone();
        path.push(key.into());
        Proxy {
            shared: self.shared.clone(),
            path,
        }
    }

    /// Invoke the remote function this proxy denotes with `args`,
    /// returning the decoded result (§4.3 "Call").
    pub async fn call(&self, args: Payload) -> Result<Decoded<Proxy>, AgentError> {
        self.shared.call(self.path.clone(), &args).await
    }

    /// Fire-and-forget call: for non-bidirectional subprotocols the
    /// session configures every client agent with `no_reply = true`
    /// (§4.6 "Subprotocol gate"), so this always resolves immediately
    /// without waiting on a reply.
    pub async fn notify(&self, args: Payload) {
        let _ = self.shared.call(self.path.clone(), &args).await;
    }

    /// A non-owning handle for the session's `(address, path) -> Proxy`
    /// dedup cache (§4.3 "Proxy", §9 "Referential stability becomes a
    /// deliberate memoization").
    ///
    /// The cache must not itself keep the remote reference alive — doing
    /// so would pin every address ever decoded for the life of the
    /// session, defeating finalization-driven GC entirely. [`WeakProxy`]
    /// is this crate's equivalent of the original's `WeakMap`-backed
    /// cache: it costs nothing toward reachability, and `upgrade()` fails
    /// once the last owning [`Proxy`] has dropped.
    pub fn downgrade(&self) -> WeakProxy {
        WeakProxy { shared: Arc::downgrade(&self.shared), path: self.path.clone() }
    }
}

/// See [`Proxy::downgrade`].
#[derive(Clone)]
pub struct WeakProxy {
    shared: std::sync::Weak<ClientAgentShared>,
    path: Vec<String>,
}

impl WeakProxy {
    /// Recover a live [`Proxy`], or `None` if every strong handle to this
    /// `(address, path)` has already dropped.
    pub fn upgrade(&self) -> Option<Proxy> {
        self.shared.upgrade().map(|shared| Proxy { shared, path: self.path.clone() })
    }
}

/// Spawn a client agent bound to `server_address`, returning its root
/// proxy and the [`Fiber`] handle a supervisor observes (§4.3, §4.5).
///
/// `inbox` delivers `Set`/`Error` envelopes addressed to `server_address`;
/// the session is responsible for routing them here (possibly to several
/// client agents sharing the same address — each only reacts to the
/// message ids it itself issued).
pub fn spawn_client_agent(
    server_address: Address,
    output: Outbox,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    no_reply: bool,
    timeout: Duration,
    encode: EncodeHook,
    decode: DecodeHook,
) -> (Proxy, Arc<Fiber>) {
    let fiber = Arc::new(Fiber::new(format!("client:{server_address}")));
    let shared = Arc::new(ClientAgentShared {
        server_address,
        fiber: fiber.clone(),
        output,
        no_reply,
        timeout,
        encode,
        decode,
        outstanding: Mutex::new(HashMap::new()),
    });

    // The background loop holds only a *weak* reference: once every
    // `Proxy` sharing `shared` drops, `Arc::strong_count` reaches zero,
    // `ClientAgentShared::drop` fires, and `fiber.terminate()` wakes this
    // loop via `terminated()` on the very next poll.
    let weak = Arc::downgrade(&shared);
    let loop_fiber = fiber.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = loop_fiber.terminated() => break,
                received = inbox.recv() => {
                    match received {
                        Some(envelope) => {
                            let Some(shared) = weak.upgrade() else { break };
                            shared.handle_incoming(envelope);
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let proxy = Proxy { shared, path: Vec::new() };
    (proxy, fiber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use transporter_codec::EncodeFailure;

    fn identity_hooks() -> (EncodeHook, DecodeHook) {
        let encode: EncodeHook = Arc::new(|payload: &Payload| -> Result<serde_json::Value, EncodeFailure<AgentError>> {
            match payload {
                Payload::Null => Ok(serde_json::Value::Null),
                Payload::Array(items) if items.is_empty() => Ok(serde_json::json!([])),
                other => Ok(serde_json::json!(format!("{other:?}"))),
            }
        });
        let decode: DecodeHook = Arc::new(|value: &serde_json::Value| -> Result<Decoded<Proxy>, AgentError> {
            Ok(Decoded::String(value.to_string()))
        });
        (encode, decode)
    }

    #[tokio::test]
    async fn call_times_out_when_no_reply_arrives() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (encode, decode) = identity_hooks();
        let (proxy, _fiber) = spawn_client_agent(
            Address::new("srv"),
            Outbox::new(out_tx),
            rx,
            false,
            Duration::from_millis(20),
            encode,
            decode,
        );
        drop(tx);
        let err = proxy.call(Payload::Array(vec![])).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout));
    }

    #[tokio::test]
    async fn call_resolves_on_matching_set_reply() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (encode, decode) = identity_hooks();
        let (proxy, _fiber) = spawn_client_agent(
            Address::new("srv"),
            Outbox::new(out_tx),
            rx,
            false,
            Duration::from_secs(1),
            encode,
            decode,
        );

        let call = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.call(Payload::Array(vec![])).await }
        });

        let sent = out_rx.recv().await.unwrap();
        let MessageBody::Call { .. } = sent.body else { panic!("expected Call") };
        tx.send(Envelope::new(
            Address::new("srv"),
            sent.id.clone(),
            MessageBody::Set { value: serde_json::json!(13) },
        ))
        .unwrap();

        let result = call.await.unwrap().unwrap();
        assert!(matches!(result, Decoded::String(s) if s == "13"));
    }

    #[tokio::test]
    async fn call_rejects_on_matching_error_reply() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (encode, decode) = identity_hooks();
        let (proxy, _fiber) = spawn_client_agent(
            Address::new("srv"),
            Outbox::new(out_tx),
            rx,
            false,
            Duration::from_secs(1),
            encode,
            decode,
        );

        let call = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.call(Payload::Array(vec![])).await }
        });

        let sent = out_rx.recv().await.unwrap();
        tx.send(Envelope::new(
            Address::new("srv"),
            sent.id.clone(),
            MessageBody::Error { error: serde_json::json!("boom") },
        ))
        .unwrap();

        let err = call.await.unwrap().unwrap_err();
        match err {
            AgentError::Remote(v) => assert_eq!(v, serde_json::json!("boom")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_last_proxy_emits_garbage_collect() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (encode, decode) = identity_hooks();
        let (proxy, fiber) = spawn_client_agent(
            Address::new("srv"),
            Outbox::new(out_tx),
            rx,
            false,
            Duration::from_secs(1),
            encode,
            decode,
        );
        let child = proxy.get("foo");
        drop(proxy);
        drop(child);

        let gc = out_rx.recv().await.unwrap();
        assert!(matches!(gc.body, MessageBody::GarbageCollect));
        assert!(fiber.is_terminated());
    }

    #[test]
    fn proxies_with_same_address_and_path_are_reference_equal() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (encode, decode) = identity_hooks();
        let (proxy, _fiber) = spawn_client_agent(
            Address::new("srv"),
            Outbox::new(out_tx),
            rx,
            false,
            Duration::from_secs(1),
            encode,
            decode,
        );
        assert_eq!(proxy.get("a"), proxy.get("a"));
        assert_eq!(proxy.get("a").get("b"), proxy.get("a").get("b"));
        assert_ne!(proxy.get("a"), proxy.get("b"));
    }
}

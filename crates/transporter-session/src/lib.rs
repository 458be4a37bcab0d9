//! Spawns and supervises the agents that serve one conceptual connection
//! (§4.5 "Session"), gates them through the subprotocol's capabilities
//! (§4.6), and wires the recursive encode/decode hooks (§4.2, §4.5) that
//! let a call's arguments or return value themselves carry functions and
//! proxies.
//!
//! A session is one half of a connection: a *server* session wraps an
//! application value behind a root server agent; a *client* session holds
//! the root proxy obtained by dereferencing the peer's root address. A
//! single process can run either role, or (for transports that are
//! genuinely duplex) both at once by composing two sessions over the
//! same transport.

mod error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use transporter_address::{spaces, Address, ADDRESS_BOOK};
use transporter_agent::{
    spawn_client_agent, spawn_server_agent, AgentError, DecodeHook, EncodeHook, Injector,
    NoopInjector, Outbox, Proxy, WeakProxy, DEFAULT_CALL_TIMEOUT,
};
use transporter_codec::{decode, encode, Decoded, EncodeFailure, EncodeTarget, Payload};
use transporter_fiber::{Fiber, Supervisor, Task};
use transporter_protocol::{current_version, Envelope, MessageBody, Subprotocol, VersionCompat};

pub use error::SessionError;

/// What a session wraps: either the application value it serves, or
/// nothing (a pure consumer that only ever materializes proxies).
pub enum Role {
    /// Serve `value` at `address` (§3 "Address", default the session
    /// root `""`), resolving dependency-injection tags through `injector`
    /// (§4.4 step 2).
    Serve {
        value: Payload,
        address: Address,
        injector: Arc<dyn Injector>,
    },
    /// Consume the peer's agent at `server_address` (typically the
    /// peer's root, `""`, but configurable per §6 `connect()`'s
    /// `serverAddress` option).
    Consume { server_address: Address },
}

impl Role {
    pub fn serve(value: Payload) -> Self {
        Role::Serve {
            value,
            address: Address::root(),
            injector: Arc::new(NoopInjector),
        }
    }

    pub fn serve_at(value: Payload, address: Address, injector: Arc<dyn Injector>) -> Self {
        Role::Serve { value, address, injector }
    }

    pub fn consume() -> Self {
        Role::Consume { server_address: Address::root() }
    }

    pub fn consume_at(server_address: Address) -> Self {
        Role::Consume { server_address }
    }
}

struct ClientEntry {
    sender: mpsc::UnboundedSender<Envelope>,
    /// Weak on purpose: the dedup cache must not itself keep the client
    /// agent reachable, or a proxy's last strong owner dropping would
    /// never trigger GC (see [`transporter_agent::Proxy::downgrade`]).
    proxy: WeakProxy,
    fiber: Arc<Fiber>,
}

/// A supervisor over the client and server agents created to serve one
/// connection (§3 "Session", §4.5).
pub struct Session {
    supervisor: Arc<Supervisor>,
    subprotocol: Subprotocol,
    output: Outbox,
    call_timeout: Duration,
    no_reply: bool,
    injector: Arc<dyn Injector>,
    client_agents: Mutex<HashMap<Address, ClientEntry>>,
    server_agents: Mutex<HashMap<Address, mpsc::UnboundedSender<Envelope>>>,
    root_proxy: Mutex<Option<Proxy>>,
}

impl Session {
    /// Spawn a session over `input`/`output` (the transport's decoded
    /// inbound stream and outbound sink, per §6 "Consumed transport
    /// interface"). The session claims its root agent (if `role` is
    /// [`Role::Serve`]) or materializes its root proxy (if [`Role::Consume`])
    /// before returning.
    pub fn spawn(
        role: Role,
        subprotocol: Subprotocol,
        input: mpsc::UnboundedReceiver<Envelope>,
        output: mpsc::UnboundedSender<Envelope>,
    ) -> Result<Arc<Self>, SessionError> {
        Self::spawn_with_timeout(role, subprotocol, DEFAULT_CALL_TIMEOUT, input, output)
    }

    /// As [`Session::spawn`], but overriding the per-call timeout every
    /// client agent this session materializes is given (§6 "Configuration
    /// options": `connect()`'s `timeout` option).
    pub fn spawn_with_timeout(
        role: Role,
        subprotocol: Subprotocol,
        call_timeout: Duration,
        input: mpsc::UnboundedReceiver<Envelope>,
        output: mpsc::UnboundedSender<Envelope>,
    ) -> Result<Arc<Self>, SessionError> {
        let no_reply = !subprotocol.is_bidirectional();
        let injector: Arc<dyn Injector> = match &role {
            Role::Serve { injector, .. } => injector.clone(),
            Role::Consume { .. } => Arc::new(NoopInjector),
        };

        let session = Arc::new(Session {
            supervisor: Arc::new(Supervisor::new("session")),
            subprotocol,
            output: Outbox::new(output),
            call_timeout,
            no_reply,
            injector,
            client_agents: Mutex::new(HashMap::new()),
            server_agents: Mutex::new(HashMap::new()),
            root_proxy: Mutex::new(None),
        });

        match role {
            Role::Serve { value, address, injector } => {
                session.spawn_server_agent_at(address, value, injector)?;
            }
            Role::Consume { server_address } => {
                let proxy = session.make_proxy(server_address)?;
                *session.root_proxy.lock() = Some(proxy);
            }
        }

        session.spawn_input_router(input);
        session.spawn_auto_terminate_watcher();

        Ok(session)
    }

    /// The root proxy, if this session is a [`Role::Consume`] session.
    pub fn create_proxy(&self) -> Option<Proxy> {
        self.root_proxy.lock().clone()
    }

    pub fn subprotocol(&self) -> Subprotocol {
        self.subprotocol
    }

    pub fn task_count(&self) -> usize {
        self.supervisor.task_count()
    }

    pub fn is_terminated(&self) -> bool {
        self.supervisor.is_terminated()
    }

    /// Terminate every agent this session owns, then the session itself
    /// (§4.5 "terminate()"). Idempotent (§8 "Idempotent termination").
    pub fn terminate(&self) {
        self.supervisor.terminate();
    }

    fn encode_hook(self: &Arc<Self>) -> EncodeHook {
        let weak = Arc::downgrade(self);
        Arc::new(move |payload: &Payload| -> Result<serde_json::Value, EncodeFailure<AgentError>> {
            let Some(session) = weak.upgrade() else {
                return Err(EncodeFailure { created: Vec::new(), source: AgentError::Terminated });
            };
            encode(payload, &mut |target| session.make_ref(target))
        })
    }

    fn decode_hook(self: &Arc<Self>) -> DecodeHook {
        let weak = Arc::downgrade(self);
        Arc::new(move |value: &serde_json::Value| -> Result<Decoded<Proxy>, AgentError> {
            let Some(session) = weak.upgrade() else {
                return Err(AgentError::Terminated);
            };
            decode(value, &mut |address| session.make_proxy(address))
        })
    }

    /// §4.2 "makeRef": spawn (or, for a bare forwarded reference at its
    /// own root, reuse) the server agent that backs one discovered
    /// function or proxy.
    fn make_ref(self: &Arc<Self>, target: EncodeTarget) -> Result<Address, AgentError> {
        match target {
            EncodeTarget::Function(exposed) => {
                let address = Address::new(uuid::Uuid::new_v4().to_string());
                self.spawn_server_agent_at(address.clone(), Payload::Function(exposed), self.injector.clone())
                    .map_err(AgentError::from)?;
                Ok(address)
            }
            EncodeTarget::Proxy(handle) => {
                // A bare reference to an address this process already
                // handed out (no further dereference) forwards as-is:
                // no new agent is needed, the original still answers for
                // it. Forwarding a proxy *dereferenced* at a non-root path
                // would need a live handle capable of invoking through
                // it, which a address+path-only reference cannot provide
                // here — see DESIGN.md.
                if handle.path.is_empty() {
                    Ok(handle.address)
                } else {
                    Err(AgentError::Hook(format!(
                        "cannot forward proxy reference at non-root path {:?} without dereferencing it first",
                        handle.path
                    )))
                }
            }
        }
    }

    /// §4.2 "makeProxy": materialize (or reuse, if one is already live
    /// for this address) the client agent that stands in for one
    /// discovered address reference.
    fn make_proxy(self: &Arc<Self>, address: Address) -> Result<Proxy, AgentError> {
        {
            let mut agents = self.client_agents.lock();
            if let Some(entry) = agents.get(&address) {
                match entry.proxy.upgrade() {
                    Some(proxy) => return Ok(proxy),
                    None => {
                        agents.remove(&address);
                    }
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (proxy, fiber) = spawn_client_agent(
            address.clone(),
            self.output.clone(),
            rx,
            self.no_reply,
            self.call_timeout,
            self.encode_hook(),
            self.decode_hook(),
        );
        self.client_agents.lock().insert(
            address.clone(),
            ClientEntry { sender: tx, proxy: proxy.downgrade(), fiber: fiber.clone() },
        );
        let _ = self.supervisor.observe(fiber.clone() as Arc<dyn Task>);
        self.spawn_client_cleanup_watcher(address, fiber);
        Ok(proxy)
    }

    fn spawn_server_agent_at(
        self: &Arc<Self>,
        address: Address,
        value: Payload,
        injector: Arc<dyn Injector>,
    ) -> Result<(), SessionError> {
        ADDRESS_BOOK.add(spaces::SERVER_AGENT, address.clone())?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_server_agent(
            address.clone(),
            self.output.clone(),
            rx,
            value,
            injector,
            self.encode_hook(),
            self.decode_hook(),
        );
        self.server_agents.lock().insert(address.clone(), tx);
        let _ = self.supervisor.observe(handle.fiber.clone() as Arc<dyn Task>);
        self.spawn_server_cleanup_watcher(address, handle.fiber);
        Ok(())
    }

    /// Release the address and drop the routing entry once a server
    /// agent's fiber terminates — via explicit `close`, or a received
    /// `GarbageCollect` (§4.4 "On GarbageCollect{}: terminate self (which
    /// releases the address)").
    fn spawn_server_cleanup_watcher(self: &Arc<Self>, address: Address, fiber: Arc<Fiber>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            fiber.terminated().await;
            ADDRESS_BOOK.release(spaces::SERVER_AGENT, &address);
            if let Some(session) = weak.upgrade() {
                session.server_agents.lock().remove(&address);
            }
        });
    }

    /// Drop the client-side routing entry once the client agent's fiber
    /// terminates (proxy dropped, `GarbageCollect` already emitted by
    /// [`transporter_agent::Proxy`]'s own teardown).
    fn spawn_client_cleanup_watcher(self: &Arc<Self>, address: Address, fiber: Arc<Fiber>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            fiber.terminated().await;
            if let Some(session) = weak.upgrade() {
                let mut agents = session.client_agents.lock();
                if agents.get(&address).is_some_and(|e| e.fiber.is_terminated()) {
                    agents.remove(&address);
                }
            }
        });
    }

    /// Route every inbound envelope to the agent it addresses (§4.5,
    /// §7 "Protocol-level errors ... are logged and dropped").
    fn spawn_input_router(self: &Arc<Self>, mut input: mpsc::UnboundedReceiver<Envelope>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(envelope) = input.recv().await {
                let Some(session) = weak.upgrade() else { break };
                session.route(envelope);
            }
        });
    }

    fn route(&self, envelope: Envelope) {
        if !envelope.version.same_release_line(&current_version()) {
            tracing::warn!(
                address = %envelope.address,
                msg_version = %envelope.version,
                our_version = %current_version(),
                "message version differs in major or minor component; processing anyway"
            );
        }
        if envelope.is_control() {
            tracing::debug!(address = %envelope.address, "session ignoring socket control message");
            return;
        }
        let routed = match &envelope.body {
            MessageBody::Call { .. } | MessageBody::GarbageCollect => {
                self.server_agents.lock().get(&envelope.address).map(|tx| tx.clone())
            }
            MessageBody::Set { .. } | MessageBody::Error { .. } => {
                self.client_agents.lock().get(&envelope.address).map(|e| e.sender.clone())
            }
            _ => None,
        };
        match routed {
            Some(sender) => {
                let address = envelope.address.clone();
                if sender.send(envelope).is_err() {
                    tracing::debug!(%address, "agent inbox closed, dropping envelope");
                }
            }
            None => {
                tracing::debug!(address = %envelope.address, "no agent registered for address, dropping envelope");
            }
        }
    }

    /// §4.5 "Auto-termination": once the task count has held positive and
    /// returns to zero, schedule termination for the next microtask. The
    /// closest Tokio analogue to "next microtask" is yielding once so any
    /// watcher already woken by the same state change runs first.
    fn spawn_auto_terminate_watcher(self: &Arc<Self>) {
        let mut count_rx = self.supervisor.subscribe_task_count();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                if count_rx.changed().await.is_err() {
                    break;
                }
                let Some(session) = weak.upgrade() else { break };
                if session.supervisor.is_terminated() {
                    break;
                }
                if session.supervisor.has_ever_had_tasks() && session.supervisor.task_count() == 0 {
                    tokio::task::yield_now().await;
                    if session.supervisor.task_count() == 0 && !session.supervisor.is_terminated() {
                        tracing::debug!("session task count returned to zero, auto-terminating");
                        session.terminate();
                    }
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transporter_codec::ExposedFn;
    use transporter_protocol::{ConnectionMode, OperationMode, TransmissionMode};

    fn pair() -> (
        (mpsc::UnboundedSender<Envelope>, mpsc::UnboundedReceiver<Envelope>),
        (mpsc::UnboundedSender<Envelope>, mpsc::UnboundedReceiver<Envelope>),
    ) {
        (mpsc::unbounded_channel(), mpsc::unbounded_channel())
    }

    /// Wires two sessions back to back: server's output feeds client's
    /// input and vice versa, the way a transport would.
    fn connected_pair(value: Payload) -> (Arc<Session>, Arc<Session>) {
        let (server_out_tx, server_out_rx) = mpsc::unbounded_channel();
        let (client_out_tx, client_out_rx) = mpsc::unbounded_channel();

        let server = Session::spawn(Role::serve(value), Subprotocol::duplex_unicast(), client_out_rx, server_out_tx)
            .unwrap();
        let client = Session::spawn(Role::consume(), Subprotocol::duplex_unicast(), server_out_rx, client_out_tx)
            .unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn s1_primitive_round_trip() {
        let value = Payload::Function(ExposedFn::new(Arc::new(|_args| {
            Box::pin(async { Ok(Payload::Number(13.into())) })
        })));
        let (_server, client) = connected_pair(value);
        let proxy = client.create_proxy().unwrap();
        let result = proxy.call(Payload::Array(vec![])).await.unwrap();
        assert!(matches!(result, Decoded::Number(n) if n.as_i64() == Some(13)));
    }

    #[tokio::test]
    async fn s3_thrown_error_rejects_the_call() {
        let value = Payload::Function(ExposedFn::new(Arc::new(|_args| {
            Box::pin(async { Err(Payload::String("\u{1f4a3}".into())) })
        })));
        let (_server, client) = connected_pair(value);
        let proxy = client.create_proxy().unwrap();
        let err = proxy.call(Payload::Array(vec![])).await.unwrap_err();
        match err {
            AgentError::Remote(v) => assert_eq!(v, serde_json::json!("\u{1f4a3}")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_subprotocol_forces_no_reply() {
        let ((in_tx, in_rx), (out_tx, _out_rx)) = pair();
        drop(in_tx);
        let subprotocol =
            Subprotocol::new(ConnectionMode::Connectionless, OperationMode::Broadcast, TransmissionMode::Simplex);
        let value = Payload::Function(ExposedFn::new(Arc::new(|_| Box::pin(async { Ok(Payload::Null) }))));
        let session = Session::spawn(Role::serve(value), subprotocol, in_rx, out_tx).unwrap();
        assert!(session.no_reply);
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let ((in_tx, in_rx), (out_tx, _out_rx)) = pair();
        drop(in_tx);
        let value = Payload::Function(ExposedFn::new(Arc::new(|_| Box::pin(async { Ok(Payload::Null) }))));
        let session = Session::spawn(Role::serve(value), Subprotocol::duplex_unicast(), in_rx, out_tx).unwrap();
        session.terminate();
        session.terminate();
        assert!(session.is_terminated());
    }

    #[tokio::test]
    async fn duplicate_root_address_is_rejected() {
        let ((_in1_tx, in1_rx), (out1_tx, _out1_rx)) = pair();
        let ((_in2_tx, in2_rx), (out2_tx, _out2_rx)) = pair();
        let value1 = Payload::Object(Default::default());
        let addr = Address::new(format!("dup-root-{}", uuid::Uuid::new_v4()));
        let _session1 = Session::spawn(
            Role::serve_at(value1, addr.clone(), Arc::new(NoopInjector)),
            Subprotocol::duplex_unicast(),
            in1_rx,
            out1_tx,
        )
        .unwrap();
        let value2 = Payload::Object(Default::default());
        let err = Session::spawn(
            Role::serve_at(value2, addr, Arc::new(NoopInjector)),
            Subprotocol::duplex_unicast(),
            in2_rx,
            out2_tx,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Address(_)));
    }
}

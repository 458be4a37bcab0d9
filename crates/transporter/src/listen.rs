use std::sync::Arc;

use tokio::sync::mpsc;

use transporter_address::Address;
use transporter_agent::{Injector, NoopInjector};
use transporter_codec::Payload;
use transporter_session::{Role, Session};
use transporter_socket::{ConnectAttempt, ConnectFilter, SocketOptions, SocketServer};

use crate::error::TransporterError;

/// `listen({address?, handle, connectFilter?})` options (§6, §4.8 "Socket
/// Server"). `handle` in the original names whatever host-specific
/// primitive accepts incoming connections on a shared message target
/// (e.g. a `MessagePort` from a shared worker's `connect` event); here it
/// is the `incoming` stream of already-demultiplexed [`ConnectAttempt`]s
/// this crate actually consumes (see `DESIGN.md` for this resolved
/// ambiguity).
pub struct ListenOptions {
    pub address: Address,
    pub connect_filter: Option<ConnectFilter>,
    pub socket_options: SocketOptions,
    pub injector: Arc<dyn Injector>,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            address: Address::root(),
            connect_filter: None,
            socket_options: SocketOptions::default(),
            injector: Arc::new(NoopInjector),
        }
    }
}

impl ListenOptions {
    pub fn at(address: Address) -> Self {
        Self { address, ..Self::default() }
    }

    pub fn with_connect_filter(mut self, filter: ConnectFilter) -> Self {
        self.connect_filter = Some(filter);
        self
    }
}

/// A handle to a running listener (§6 "`listen` ... returns a server
/// handle with `stop()`").
pub struct ListenHandle {
    server: Arc<SocketServer>,
}

impl ListenHandle {
    pub fn address(&self) -> &Address {
        self.server.address()
    }

    pub fn client_count(&self) -> usize {
        self.server.client_count()
    }

    /// Broadcast disconnect to every connected client and release
    /// `address` (§4.8 "on `stop()` it broadcasts `Disconnect` to all").
    pub async fn stop(&self) {
        self.server.stop().await;
    }
}

/// Listen for connections on `incoming`, spawning one [`Socket`] and one
/// server session per accepted client, each serving a fresh value
/// produced by `value_factory` (§2 "Session ... Socket Server ... spawns
/// one socket per client").
///
/// `value_factory` is called once per accepted connection rather than
/// once up front so that stateful exposed values (e.g. a per-connection
/// counter or an authenticated-user handle) aren't accidentally shared
/// across clients — the same reasoning a real `listen()` callback in the
/// original host applies when it closes over per-connection state.
pub fn listen(
    value_factory: impl Fn() -> Payload + Send + Sync + 'static,
    incoming: mpsc::UnboundedReceiver<ConnectAttempt>,
    options: ListenOptions,
) -> Result<ListenHandle, TransporterError> {
    let (server, mut accepted) =
        SocketServer::listen(options.address, options.socket_options, options.connect_filter, incoming)?;

    let value_factory = Arc::new(value_factory);
    let injector = options.injector;
    tokio::spawn(async move {
        while let Some((socket, app_rx)) = accepted.recv().await {
            let (session_out_tx, mut session_out_rx) = mpsc::unbounded_channel();
            let forward_socket = socket.clone();
            tokio::spawn(async move {
                while let Some(envelope) = session_out_rx.recv().await {
                    forward_socket.send(envelope);
                }
            });

            let value = value_factory();
            let role = Role::serve_at(value, Address::root(), injector.clone());
            if let Err(err) = Session::spawn(role, transporter_protocol::Subprotocol::duplex_unicast(), app_rx, session_out_tx) {
                tracing::warn!(address = %socket.address(), "failed to spawn session for accepted client: {err}");
            }
        }
    });

    Ok(ListenHandle { server })
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use transporter_address::{spaces, Address, AddressError, ADDRESS_BOOK};
use transporter_protocol::{Envelope, MessageBody};

use crate::options::SocketOptions;
use crate::socket::{Socket, SocketRole};

/// Accepts or denies an incoming connection, typically based on the
/// transport-supplied origin (§4.8 "e.g., based on origin").
pub type ConnectFilter = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// The dedicated duplex channel pair a transport hands the server for one
/// accepted client (the "client-provided port" of §4.8). How a concrete
/// transport obtains this pair per connection attempt is outside the
/// core's scope (§1, §13) — the server only needs it already demultiplexed.
pub type ClientPort = (mpsc::UnboundedSender<Envelope>, mpsc::UnboundedReceiver<Envelope>);

/// One inbound connection attempt: the `Connect` envelope, the origin the
/// transport observed it arrive with (if any), and its dedicated port.
pub struct ConnectAttempt {
    pub envelope: Envelope,
    pub origin: Option<String>,
    pub port: ClientPort,
}

/// Listens for `Connect{address}` attempts matching one registered
/// address and spawns one [`Socket`] per accepted client (§4.8).
pub struct SocketServer {
    address: Address,
    options: SocketOptions,
    connect_filter: Option<ConnectFilter>,
    clients: Mutex<HashMap<u64, Arc<Socket>>>,
    next_client_id: std::sync::atomic::AtomicU64,
}

impl SocketServer {
    /// Register `address` in the `SocketServer` address space and start
    /// accepting connections from `incoming`. Returns the server handle
    /// plus a stream of accepted `(socket, inbound application envelopes)`
    /// pairs, one per client, in the shape `transporter-session`'s
    /// `Session::spawn` already consumes.
    pub fn listen(
        address: Address,
        options: SocketOptions,
        connect_filter: Option<ConnectFilter>,
        incoming: mpsc::UnboundedReceiver<ConnectAttempt>,
    ) -> Result<(Arc<SocketServer>, mpsc::UnboundedReceiver<(Arc<Socket>, mpsc::UnboundedReceiver<Envelope>)>), AddressError> {
        ADDRESS_BOOK.add(spaces::SOCKET_SERVER, address.clone())?;

        let server = Arc::new(SocketServer {
            address,
            options,
            connect_filter,
            clients: Mutex::new(HashMap::new()),
            next_client_id: std::sync::atomic::AtomicU64::new(0),
        });

        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        server.spawn_accept_loop(incoming, accepted_tx);
        Ok((server, accepted_rx))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Broadcast `Disconnect` (via each socket's own graceful close) to
    /// every live client and release the server's address (§4.8 "on
    /// `stop()` it broadcasts `Disconnect` to all ... released on stop").
    pub async fn stop(&self) {
        let sockets: Vec<Arc<Socket>> = self.clients.lock().drain().map(|(_, socket)| socket).collect();
        let closes = sockets.iter().map(|socket| socket.close());
        futures::future::join_all(closes).await;
        ADDRESS_BOOK.release(spaces::SOCKET_SERVER, &self.address);
    }

    fn spawn_accept_loop(
        self: &Arc<Self>,
        mut incoming: mpsc::UnboundedReceiver<ConnectAttempt>,
        accepted_tx: mpsc::UnboundedSender<(Arc<Socket>, mpsc::UnboundedReceiver<Envelope>)>,
    ) {
        let server = self.clone();
        tokio::spawn(async move {
            while let Some(attempt) = incoming.recv().await {
                let MessageBody::Connect { address } = &attempt.envelope.body else {
                    tracing::debug!("socket server ignoring non-Connect envelope on its listen target");
                    continue;
                };
                if *address != server.address {
                    continue;
                }
                if let Some(filter) = &server.connect_filter {
                    if !filter(attempt.origin.as_deref()) {
                        tracing::debug!(origin = ?attempt.origin, "socket server rejected connection via connectFilter");
                        continue;
                    }
                }

                let client_id = server.next_client_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let (raw_out, raw_in) = attempt.port;
                let (socket, app_rx) = Socket::open(
                    server.address.clone(),
                    server.options.clone(),
                    SocketRole::Accepted,
                    raw_out,
                    raw_in,
                );
                server.clients.lock().insert(client_id, socket.clone());
                server.spawn_cleanup_watcher(client_id, socket.clone());

                if accepted_tx.send((socket, app_rx)).is_err() {
                    tracing::debug!("socket server's accept stream has no more listeners");
                    break;
                }
            }
        });
    }

    /// Drives `clients` off `state_changes()` rather than `closed()`
    /// directly, so the server's bookkeeping is a real consumer of the
    /// `Observable` surface `Socket` hands out for §4.7's `stateChange`.
    fn spawn_cleanup_watcher(self: &Arc<Self>, client_id: u64, socket: Arc<Socket>) {
        let server = self.clone();
        tokio::spawn(async move {
            let mut states = socket.state_changes().subscribe();
            while let Some(state) = states.next().await {
                if state.is_terminal() {
                    break;
                }
            }
            server.clients.lock().remove(&client_id);
        });
    }
}

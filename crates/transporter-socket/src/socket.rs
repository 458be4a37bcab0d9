use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};

use transporter_address::Address;
use transporter_protocol::{Envelope, MessageBody, MessageId};

use crate::error::SocketError;
use crate::options::{BufferOverflowStrategy, SocketOptions};
use crate::state::SocketState;

/// Which side of the handshake a [`Socket`] starts as (§4.7, §4.8).
pub enum SocketRole {
    /// This process is dialing out; a `Connect{address}` is sent
    /// immediately and the socket starts `Connecting`.
    Client { server_address: Address },
    /// A Socket Server already accepted this connection; the socket
    /// starts `Connected` and immediately announces that with `Connected`.
    Accepted,
}

/// A connection-oriented envelope wrapper over one raw duplex port
/// (§4.7). `raw_out`/`raw_in` stand in for "the transport's native
/// cloning facility" — whatever carries [`Envelope`]s between processes.
pub struct Socket {
    address: Address,
    options: SocketOptions,
    state_tx: watch::Sender<SocketState>,
    state_rx: watch::Receiver<SocketState>,
    raw_out: mpsc::UnboundedSender<Envelope>,
    buffer: Mutex<VecDeque<Envelope>>,
    pending_pings: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl Socket {
    /// Open a socket over a raw duplex port. Returns the socket handle and
    /// a receiver of inbound *application* envelopes — §4.7 "Public
    /// receive": every control message (`Connect`, `Connected`,
    /// `Disconnect`, `Disconnected`, `Ping`, `Pong`) is filtered out
    /// before it reaches this stream.
    pub fn open(
        address: Address,
        options: SocketOptions,
        role: SocketRole,
        raw_out: mpsc::UnboundedSender<Envelope>,
        raw_in: mpsc::UnboundedReceiver<Envelope>,
    ) -> (Arc<Socket>, mpsc::UnboundedReceiver<Envelope>) {
        let initial = match role {
            SocketRole::Client { .. } => SocketState::Connecting,
            SocketRole::Accepted => SocketState::Connected,
        };
        let (state_tx, state_rx) = watch::channel(initial);
        let (app_tx, app_rx) = mpsc::unbounded_channel();

        let socket = Arc::new(Socket {
            address,
            options,
            state_tx,
            state_rx,
            raw_out,
            buffer: Mutex::new(VecDeque::new()),
            pending_pings: Mutex::new(HashMap::new()),
        });

        match role {
            SocketRole::Client { server_address } => {
                let _ = socket.raw_out.send(Envelope::new(
                    socket.address.clone(),
                    MessageId::new(),
                    MessageBody::Connect { address: server_address },
                ));
                socket.spawn_connect_timeout_watcher();
            }
            SocketRole::Accepted => {
                let _ = socket.raw_out.send(Envelope::new(
                    socket.address.clone(),
                    MessageId::new(),
                    MessageBody::Connected,
                ));
            }
        }

        socket.spawn_input_router(raw_in, app_tx);
        socket.spawn_lifecycle_watcher();

        (socket, app_rx)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn state(&self) -> SocketState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SocketState> {
        self.state_rx.clone()
    }

    /// The same state transitions as [`Socket::subscribe_state`], handed
    /// back as a [`transporter_reactive::BehaviorSubject`] instead of a
    /// raw `watch::Receiver` — for callers (§4.7's `stateChange`
    /// consumers) that want the replay-on-subscribe `Observable` surface
    /// rather than `watch`'s API directly.
    pub fn state_changes(&self) -> transporter_reactive::BehaviorSubject<SocketState> {
        let subject = transporter_reactive::BehaviorSubject::new(self.state_rx.borrow().clone());
        let mut rx = self.state_rx.clone();
        let bridge = subject.clone();
        tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let state = rx.borrow().clone();
                let terminal = state.is_terminal();
                bridge.set(state);
                if terminal {
                    break;
                }
            }
        });
        subject
    }

    /// Resolves once the socket reaches `Closed`, with whatever error (if
    /// any) was recorded on the terminal state (§4.7 "`stateChange`
    /// completes").
    pub async fn closed(&self) -> Option<SocketError> {
        let mut rx = self.state_rx.clone();
        loop {
            if let SocketState::Closed(err) = &*rx.borrow() {
                return err.clone();
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Queue an application envelope for send (§4.7 "Send policy").
    pub fn send(&self, envelope: Envelope) {
        let mut buf = self.buffer.lock();
        match self.state_rx.borrow().clone() {
            SocketState::Closing(_) | SocketState::Closed(_) => {
                tracing::debug!(address = %self.address, "socket closed, dropping outbound payload");
            }
            SocketState::Connecting => self.enqueue_locked(&mut buf, envelope),
            SocketState::Connected => {
                buf.push_back(envelope);
                self.drain_locked(&mut buf);
            }
        }
    }

    /// A manual heartbeat probe, independent of the background cron
    /// (§4.7 "Ping API").
    pub async fn ping(&self) -> Result<(), SocketError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_pings.lock().insert(id.clone(), tx);
        let _ = self.raw_out.send(Envelope::new(
            self.address.clone(),
            MessageId::new(),
            MessageBody::Ping { id: id.clone() },
        ));
        match tokio::time::timeout(self.options.heartbeat_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            _ => {
                self.pending_pings.lock().remove(&id);
                Err(SocketError::HeartbeatTimeoutError)
            }
        }
    }

    /// Explicit graceful close (§4.7 "Close"): emits `Disconnect`, awaits
    /// `Disconnected` within `disconnectTimeout`, records
    /// `DisconnectTimeoutError` on timeout.
    pub async fn close(&self) {
        if self.state_rx.borrow().is_closing_or_closed() {
            return;
        }
        let _ = self.state_tx.send(SocketState::Closing(None));
        let _ = self.raw_out.send(Envelope::new(
            self.address.clone(),
            MessageId::new(),
            MessageBody::Disconnect,
        ));

        let mut rx = self.state_rx.clone();
        let wait_closed = async {
            loop {
                if rx.borrow().is_terminal() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        if tokio::time::timeout(self.options.disconnect_timeout, wait_closed).await.is_err() {
            tracing::warn!(address = %self.address, "disconnect timed out awaiting peer acknowledgement");
            let _ = self.state_tx.send(SocketState::Closed(Some(SocketError::DisconnectTimeoutError)));
        }
    }

    fn enqueue_locked(&self, buf: &mut VecDeque<Envelope>, envelope: Envelope) {
        if let Some(limit) = self.options.buffer_limit.0 {
            if buf.len() >= limit {
                match self.options.buffer_overflow_strategy {
                    BufferOverflowStrategy::DropOldest => {
                        buf.pop_front();
                    }
                    BufferOverflowStrategy::DropLatest => {
                        tracing::debug!(address = %self.address, "send buffer full, dropping latest payload");
                        return;
                    }
                    BufferOverflowStrategy::Error => {
                        tracing::warn!(address = %self.address, "send buffer overflow, closing socket");
                        self.fail(SocketError::BufferOverflowError);
                        return;
                    }
                }
            }
        }
        buf.push_back(envelope);
    }

    fn drain_locked(&self, buf: &mut VecDeque<Envelope>) {
        while let Some(envelope) = buf.pop_front() {
            let _ = self.raw_out.send(envelope);
        }
    }

    fn drain_buffer(&self) {
        let mut buf = self.buffer.lock();
        self.drain_locked(&mut buf);
    }

    /// Transition straight to a terminal error state: best-effort notify
    /// the peer, then close without waiting for an acknowledgement (the
    /// peer that triggered the failure is presumably unresponsive).
    fn fail(&self, err: SocketError) {
        if self.state_rx.borrow().is_closing_or_closed() {
            return;
        }
        tracing::debug!(address = %self.address, error = %err, "socket closing due to error");
        let _ = self.state_tx.send(SocketState::Closing(Some(err.clone())));
        let _ = self.raw_out.send(Envelope::new(
            self.address.clone(),
            MessageId::new(),
            MessageBody::Disconnect,
        ));
        let _ = self.state_tx.send(SocketState::Closed(Some(err)));
    }

    /// The peer asked to close: acknowledge with `Disconnected` and settle
    /// immediately, without arming a disconnect-timeout watcher of our own
    /// (that watcher belongs to whichever side called `close()`).
    fn handle_disconnect_received(&self) {
        if !matches!(*self.state_rx.borrow(), SocketState::Connected) {
            return;
        }
        let _ = self.state_tx.send(SocketState::Closing(None));
        let _ = self.raw_out.send(Envelope::new(
            self.address.clone(),
            MessageId::new(),
            MessageBody::Disconnected,
        ));
        let _ = self.state_tx.send(SocketState::Closed(None));
    }

    fn handle_disconnected_received(&self) {
        let current = self.state_rx.borrow().clone();
        if let SocketState::Closing(err) = current {
            let _ = self.state_tx.send(SocketState::Closed(err));
        }
    }

    fn spawn_connect_timeout_watcher(self: &Arc<Self>) {
        let socket = self.clone();
        let timeout = self.options.connect_timeout;
        let mut rx = self.state_rx.clone();
        tokio::spawn(async move {
            let wait_connected = async {
                loop {
                    if !matches!(*rx.borrow(), SocketState::Connecting) {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            };
            if tokio::time::timeout(timeout, wait_connected).await.is_err() {
                tracing::debug!(address = %socket.address, "connect timed out");
                socket.fail(SocketError::ConnectTimeoutError);
            }
        });
    }

    /// Drains the send buffer and starts the heartbeat cron the moment the
    /// socket is `Connected`, whichever role got it there.
    fn spawn_lifecycle_watcher(self: &Arc<Self>) {
        let socket = self.clone();
        let mut rx = self.state_rx.clone();
        tokio::spawn(async move {
            loop {
                let state = rx.borrow().clone();
                if matches!(state, SocketState::Connected) {
                    socket.drain_buffer();
                    socket.spawn_heartbeat();
                    return;
                }
                if state.is_closing_or_closed() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        });
    }

    /// §4.7 "Heartbeat": a cron task that pings on `heartbeatInterval` and
    /// closes on a missed `heartbeatTimeout`. Unsubscribes on `Closing`.
    fn spawn_heartbeat(self: &Arc<Self>) {
        let socket = self.clone();
        let interval = self.options.heartbeat_interval;
        let timeout = self.options.heartbeat_timeout;
        let mut rx = self.state_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = rx.changed() => {
                        if changed.is_err() || rx.borrow().is_closing_or_closed() {
                            return;
                        }
                        continue;
                    }
                }
                if rx.borrow().is_closing_or_closed() {
                    return;
                }
                let id = uuid::Uuid::new_v4().to_string();
                let (tx, pong_rx) = oneshot::channel();
                socket.pending_pings.lock().insert(id.clone(), tx);
                let _ = socket.raw_out.send(Envelope::new(
                    socket.address.clone(),
                    MessageId::new(),
                    MessageBody::Ping { id: id.clone() },
                ));
                if tokio::time::timeout(timeout, pong_rx).await.is_err() {
                    socket.pending_pings.lock().remove(&id);
                    tracing::debug!(address = %socket.address, "heartbeat timed out, no matching pong");
                    socket.fail(SocketError::HeartbeatTimeoutError);
                    return;
                }
            }
        });
    }

    fn spawn_input_router(
        self: &Arc<Self>,
        mut raw_in: mpsc::UnboundedReceiver<Envelope>,
        app_tx: mpsc::UnboundedSender<Envelope>,
    ) {
        let socket = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = raw_in.recv().await {
                match &envelope.body {
                    MessageBody::Connected => {
                        if matches!(*socket.state_rx.borrow(), SocketState::Connecting) {
                            let _ = socket.state_tx.send(SocketState::Connected);
                        }
                    }
                    MessageBody::Disconnect => socket.handle_disconnect_received(),
                    MessageBody::Disconnected => socket.handle_disconnected_received(),
                    MessageBody::Ping { id } => {
                        let _ = socket.raw_out.send(Envelope::new(
                            socket.address.clone(),
                            MessageId::new(),
                            MessageBody::Pong { id: id.clone() },
                        ));
                    }
                    MessageBody::Pong { id } => {
                        if let Some(tx) = socket.pending_pings.lock().remove(id) {
                            let _ = tx.send(());
                        }
                    }
                    MessageBody::Connect { .. } => {
                        tracing::debug!(address = %socket.address, "ignoring inbound Connect on an already-open socket");
                    }
                    _ => {
                        if app_tx.send(envelope).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(address = %socket.address, "raw transport ended, failing socket");
            socket.fail(SocketError::TransportClosed("input stream ended".into()));
        });
    }
}

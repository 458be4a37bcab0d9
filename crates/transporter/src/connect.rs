use std::sync::Arc;
use std::time::Duration;

use transporter_address::Address;
use transporter_agent::{Proxy, DEFAULT_CALL_TIMEOUT};
use transporter_session::{Role, Session};

use crate::error::TransporterError;
use crate::transport::Transport;

/// `connect(transport, {address?, origin?, serverAddress?, timeout?})`
/// options (§6). `address` and `origin` are window-transport-specific
/// identity/origin fields consumed by concrete adapters (out of scope
/// per §1/§13, see `DESIGN.md`); only `serverAddress` and `timeout` have
/// meaning for the core session this crate spawns.
pub struct ConnectOptions {
    /// The peer's address to dereference — typically its session root
    /// (`""`), but configurable for multiplexed peers (§3 "Address").
    pub server_address: Address,
    /// Per-call timeout every client agent materialized by this session
    /// is given (§5 "Cancellation/timeouts", §6 default 1000ms).
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self { server_address: Address::root(), timeout: DEFAULT_CALL_TIMEOUT }
    }
}

impl ConnectOptions {
    pub fn at(server_address: Address) -> Self {
        Self { server_address, ..Self::default() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A handle to one client session (§6 "`connect` ... returns a proxy and
/// a `close()`").
pub struct ConnectHandle {
    session: Arc<Session>,
}

impl ConnectHandle {
    pub fn is_closed(&self) -> bool {
        self.session.is_terminated()
    }

    /// Terminate every client agent this session has materialized,
    /// cancelling their outstanding calls (§5 "disposal of the enclosing
    /// session ... cancels all pending calls by completing the input
    /// stream"). Idempotent.
    pub fn close(&self) {
        self.session.terminate();
    }
}

/// Connect to a peer over `transport`, returning its root proxy and a
/// handle to close the underlying session (§2 "Session (client side)
/// materializes a proxy").
pub fn connect(transport: impl Transport, options: ConnectOptions) -> Result<(Proxy, ConnectHandle), TransporterError> {
    let subprotocol = transport.subprotocol();
    let (out_tx, in_rx) = Box::new(transport).into_channels();
    let session = Session::spawn_with_timeout(
        Role::consume_at(options.server_address),
        subprotocol,
        options.timeout,
        in_rx,
        out_tx,
    )?;
    let proxy = session.create_proxy().ok_or(TransporterError::NoRootProxy)?;
    Ok((proxy, ConnectHandle { session }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expose::{expose, ExposeOptions};
    use crate::transport::ChannelTransport;
    use transporter_codec::{Decoded, ExposedFn, Payload};

    #[tokio::test]
    async fn connect_materializes_a_working_proxy() {
        let (server_transport, client_transport) = ChannelTransport::duplex_pair();
        let value = Payload::Function(ExposedFn::new(Arc::new(|_| {
            Box::pin(async { Ok(Payload::Number(13.into())) })
        })));
        let _expose_handle = expose(value, server_transport, ExposeOptions::default()).unwrap();

        let (proxy, close) = connect(client_transport, ConnectOptions::default()).unwrap();
        let result = proxy.call(Payload::Array(vec![])).await.unwrap();
        assert!(matches!(result, Decoded::Number(n) if n.as_i64() == Some(13)));
        close.close();
        assert!(close.is_closed());
    }
}

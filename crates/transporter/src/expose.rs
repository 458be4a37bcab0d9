use std::sync::Arc;

use transporter_address::Address;
use transporter_agent::{Injector, NoopInjector};
use transporter_codec::Payload;
use transporter_session::{Role, Session};

use crate::error::TransporterError;
use crate::transport::Transport;

/// `expose(value, transport, {address?, namespace?})` options (§6).
///
/// `namespace` has no runtime effect on the core — it exists in the
/// original purely as a human-facing label distinguishing multiple
/// values exposed on the same transport — so it is carried here only as
/// metadata callers can read back off the handle, never consulted by
/// dispatch.
pub struct ExposeOptions {
    pub address: Address,
    pub namespace: Option<String>,
    pub injector: Arc<dyn Injector>,
}

impl Default for ExposeOptions {
    fn default() -> Self {
        Self { address: Address::root(), namespace: None, injector: Arc::new(NoopInjector) }
    }
}

impl ExposeOptions {
    pub fn at(address: Address) -> Self {
        Self { address, ..Self::default() }
    }

    pub fn with_injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// A handle to one exposed value (§6 "`expose` ... returns a handle with
/// `stop()`"). Dropping the handle does not itself stop serving — callers
/// must call [`ExposeHandle::stop`] explicitly, the same way an
/// `expose()` call in the original host returns a disposer rather than
/// tying lifetime to a scope.
pub struct ExposeHandle {
    session: Arc<Session>,
    namespace: Option<String>,
}

impl ExposeHandle {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn task_count(&self) -> usize {
        self.session.task_count()
    }

    pub fn is_stopped(&self) -> bool {
        self.session.is_terminated()
    }

    /// Terminate every agent serving this value and tear down its
    /// session (§4.5 "terminate()"). Idempotent (§8 "Idempotent
    /// termination").
    pub fn stop(&self) {
        self.session.terminate();
    }
}

/// Expose `value` over `transport`, spawning a server session that
/// answers calls at `options.address` (§2 "application value -> Session
/// (server side) creates a Server Agent at an address").
pub fn expose(
    value: Payload,
    transport: impl Transport,
    options: ExposeOptions,
) -> Result<ExposeHandle, TransporterError> {
    let subprotocol = transport.subprotocol();
    let (out_tx, in_rx) = Box::new(transport).into_channels();
    let role = Role::serve_at(value, options.address, options.injector);
    let session = Session::spawn(role, subprotocol, in_rx, out_tx)?;
    Ok(ExposeHandle { session, namespace: options.namespace })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use transporter_codec::ExposedFn;

    #[tokio::test]
    async fn expose_stop_terminates_the_session() {
        let (transport, _peer) = ChannelTransport::duplex_pair();
        let value = Payload::Function(ExposedFn::new(Arc::new(|_| Box::pin(async { Ok(Payload::Null) }))));
        let handle = expose(value, transport, ExposeOptions::default()).unwrap();
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
    }
}

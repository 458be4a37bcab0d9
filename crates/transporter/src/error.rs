/// The facade's unified error type (§7 "Error handling design"),
/// aggregating every crate-level error domain with `#[from]` the same way
/// the teacher's `aura_agent::errors::AgentError` wraps `StorageError`,
/// `NetworkError`, `CryptoError` and friends into one public surface.
#[derive(Debug, thiserror::Error)]
pub enum TransporterError {
    #[error(transparent)]
    Address(#[from] transporter_address::AddressError),

    #[error(transparent)]
    Session(#[from] transporter_session::SessionError),

    #[error(transparent)]
    Agent(#[from] transporter_agent::AgentError),

    #[error(transparent)]
    Socket(#[from] transporter_socket::SocketError),

    #[error(transparent)]
    Request(#[from] transporter_rr::RequestError),

    /// `connect()`'s root dereference is only meaningful once the peer's
    /// session has actually spawned the matching client agent; this
    /// surfaces a session that failed before a root proxy ever existed
    /// (always a bug in this crate, not user-facing misconfiguration, but
    /// modeled as an error rather than a panic since it crosses an
    /// `Arc<Session>` boundary).
    #[error("session produced no root proxy")]
    NoRootProxy,
}

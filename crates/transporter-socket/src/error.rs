/// Errors a [`crate::Socket`] records on its terminal state (§7
/// "Socket-level errors are *recorded on* the state transition ...
/// rather than thrown").
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SocketError {
    /// No `Connected` arrived within `connectTimeout`.
    #[error("connect timed out")]
    ConnectTimeoutError,
    /// The send buffer overflowed under the `Error` overflow strategy.
    #[error("send buffer overflow")]
    BufferOverflowError,
    /// No matching `Pong` arrived within `heartbeatTimeout`.
    #[error("heartbeat timed out")]
    HeartbeatTimeoutError,
    /// No `Disconnected` arrived within `disconnectTimeout` after `close()`.
    #[error("disconnect timed out")]
    DisconnectTimeoutError,
    /// The underlying port closed or errored out from under the socket.
    #[error("transport closed: {0}")]
    TransportClosed(String),
}

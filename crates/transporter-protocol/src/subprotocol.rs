use serde::{Deserialize, Serialize};

/// Whether a transport requires a handshake before carrying traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    Connectionless,
    ConnectionOriented,
}

/// How many peers a single logical send reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    Broadcast,
    Multicast,
    Unicast,
}

/// Whether the transport can carry traffic in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransmissionMode {
    Simplex,
    HalfDuplex,
    Duplex,
}

/// Capability descriptor for a transport (§3 "Subprotocol").
///
/// Passed as a plain value at session construction time (§9 "Subprotocol
/// as a capability token": "Pass subprotocol flags as a value, not as a
/// type parameter").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subprotocol {
    pub connection_mode: ConnectionMode,
    pub operation_mode: OperationMode,
    pub transmission_mode: TransmissionMode,
}

impl Subprotocol {
    pub const fn new(
        connection_mode: ConnectionMode,
        operation_mode: OperationMode,
        transmission_mode: TransmissionMode,
    ) -> Self {
        Self {
            connection_mode,
            operation_mode,
            transmission_mode,
        }
    }

    /// A duplex, unicast, connection-oriented subprotocol — the shape most
    /// transports (window, worker, port, WebView bridge) present.
    pub const fn duplex_unicast() -> Self {
        Self::new(
            ConnectionMode::ConnectionOriented,
            OperationMode::Unicast,
            TransmissionMode::Duplex,
        )
    }

    /// A connectionless, broadcast, simplex subprotocol — e.g.
    /// `BroadcastChannel`.
    pub const fn broadcast_simplex() -> Self {
        Self::new(
            ConnectionMode::Connectionless,
            OperationMode::Broadcast,
            TransmissionMode::Simplex,
        )
    }

    /// Derived capability (§3): true iff not broadcast/multicast and not
    /// simplex. Only bidirectional subprotocols permit recursive RPC —
    /// passing functions or proxies through function IO.
    pub fn is_bidirectional(&self) -> bool {
        !matches!(
            self.operation_mode,
            OperationMode::Broadcast | OperationMode::Multicast
        ) && !matches!(self.transmission_mode, TransmissionMode::Simplex)
    }

    /// Whether response correlation is even meaningful: broadcast/multicast
    /// subprotocols suppress it entirely (§4.6).
    pub fn suppresses_response_correlation(&self) -> bool {
        matches!(
            self.operation_mode,
            OperationMode::Broadcast | OperationMode::Multicast
        )
    }
}

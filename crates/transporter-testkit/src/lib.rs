//! Scenario wiring shared by Transporter's own behavioral tests (§8
//! "Concrete scenarios" S1-S6).
//!
//! This crate is not part of the public API surface (`publish = false`):
//! it exists purely so `transporter`'s `tests/` directory, and any other
//! crate in this workspace that wants to exercise a full client/server
//! round trip, don't each reinvent the same in-memory channel wiring —
//! the same reasoning the teacher applies to keeping test harnesses out
//! of library crates (`aura-testkit` ships no production code either).

use tokio::sync::mpsc;

use transporter_address::Address;
use transporter_protocol::{Envelope, Subprotocol};
use transporter_session::{Role, Session};

/// A bare duplex pair of envelope channels: what a real transport would
/// hand two sessions that are talking to each other directly over a
/// `MessageChannel`-like primitive (§1 "MessagePort pairs").
pub struct EnvelopeDuplex {
    pub out_tx: mpsc::UnboundedSender<Envelope>,
    pub in_rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Cross-wire two [`EnvelopeDuplex`]es so that whatever one side sends,
/// the other receives, and vice versa.
pub fn envelope_duplex_pair() -> (EnvelopeDuplex, EnvelopeDuplex) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
    (
        EnvelopeDuplex { out_tx: a_to_b_tx, in_rx: b_to_a_rx },
        EnvelopeDuplex { out_tx: b_to_a_tx, in_rx: a_to_b_rx },
    )
}

/// Spawn a server session (`role`) and a client session back to back over
/// an in-memory duplex, the way a real transport would once it has
/// decoded/encoded messages on either end. Both sessions use the same
/// `subprotocol` (§3 "Subprotocol"), which is the common case: the two
/// ends of one connection agree on its capabilities out of band.
pub fn connected_sessions(
    role: Role,
    subprotocol: Subprotocol,
) -> (std::sync::Arc<Session>, std::sync::Arc<Session>) {
    let (server_duplex, client_duplex) = envelope_duplex_pair();

    let server = Session::spawn(role, subprotocol, client_duplex.in_rx, server_duplex.out_tx)
        .expect("server session address is fresh");
    let client = Session::spawn(Role::consume(), subprotocol, server_duplex.in_rx, client_duplex.out_tx)
        .expect("client session never claims an address");

    (server, client)
}

/// A fresh address guaranteed not to collide with another call to this
/// function within the process (tests that spawn many sessions at a
/// non-root address need this to avoid tripping the address book's
/// uniqueness invariant across unrelated test cases).
pub fn fresh_address(prefix: &str) -> Address {
    Address::new(format!("{prefix}-{}", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use transporter_codec::{ExposedFn, Payload};
    use transporter_protocol::ConnectionMode;
    use transporter_protocol::OperationMode;
    use transporter_protocol::TransmissionMode;

    #[tokio::test]
    async fn connected_sessions_round_trip_a_call() {
        let value = Payload::Function(ExposedFn::new(std::sync::Arc::new(|_args| {
            Box::pin(async { Ok(Payload::Number(7.into())) })
        })));
        let (_server, client) = connected_sessions(
            Role::serve(value),
            Subprotocol::new(ConnectionMode::ConnectionOriented, OperationMode::Unicast, TransmissionMode::Duplex),
        );
        let proxy = client.create_proxy().unwrap();
        let result = proxy.call(Payload::Array(vec![])).await.unwrap();
        assert!(matches!(result, transporter_codec::Decoded::Number(n) if n.as_i64() == Some(7)));
    }

    #[test]
    fn fresh_address_is_unique_across_calls() {
        assert_ne!(fresh_address("x"), fresh_address("x"));
    }
}

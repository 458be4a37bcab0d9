use tokio::sync::mpsc;

use transporter_protocol::{Envelope, Subprotocol};

/// What a concrete transport adapter must supply (§6 "Consumed transport
/// interface"): an outbound sink, an inbound source of already-decoded
/// envelopes, and the subprotocol capabilities this transport presents
/// (§3 "Subprotocol"). Concrete adapters — window/worker/port/broadcast
/// bridges, the React Native WebView shim — are external collaborators
/// per §1/§13 and live outside this crate; they only need to produce this
/// shape. Serialization of payload fragments is the transport's native
/// cloning facility, never this crate's concern (§1 "Transporter does not
/// define a wire encoding").
///
/// A transport is consumed by exactly one [`crate::expose`]/[`crate::connect`]
/// call: `into_channels` takes it by value.
pub trait Transport: Send + 'static {
    /// The subprotocol this transport presents (§3). Governs whether the
    /// session it backs permits recursive RPC and awaits replies at all
    /// (§4.6 "Subprotocol gate").
    fn subprotocol(&self) -> Subprotocol;

    /// Split the transport into its outbound sink and inbound stream.
    fn into_channels(self: Box<Self>) -> (mpsc::UnboundedSender<Envelope>, mpsc::UnboundedReceiver<Envelope>);
}

/// A bare in-memory transport backed directly by a channel pair and a
/// fixed subprotocol. This is the transport every concrete adapter in a
/// real host effectively degenerates to once it has decoded incoming
/// payloads and before it hands outgoing ones to the host's native
/// `postMessage`; it is also what this crate's own tests and
/// `transporter-testkit` wire sessions over directly.
pub struct ChannelTransport {
    subprotocol: Subprotocol,
    out_tx: mpsc::UnboundedSender<Envelope>,
    in_rx: mpsc::UnboundedReceiver<Envelope>,
}

impl ChannelTransport {
    pub fn new(
        subprotocol: Subprotocol,
        out_tx: mpsc::UnboundedSender<Envelope>,
        in_rx: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self { subprotocol, out_tx, in_rx }
    }

    /// A cross-wired pair of duplex, unicast, connection-oriented
    /// transports — the shape most real bridges (window, worker,
    /// `MessagePort`) present (§3 "duplex_unicast").
    pub fn duplex_pair() -> (ChannelTransport, ChannelTransport) {
        Self::pair(Subprotocol::duplex_unicast())
    }

    /// A cross-wired pair of transports presenting `subprotocol` on both
    /// ends (the common case: the two sides of one connection agree on
    /// capabilities out of band).
    pub fn pair(subprotocol: Subprotocol) -> (ChannelTransport, ChannelTransport) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
        let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
        (
            ChannelTransport::new(subprotocol, a_to_b_tx, b_to_a_rx),
            ChannelTransport::new(subprotocol, b_to_a_tx, a_to_b_rx),
        )
    }
}

impl Transport for ChannelTransport {
    fn subprotocol(&self) -> Subprotocol {
        self.subprotocol
    }

    fn into_channels(self: Box<Self>) -> (mpsc::UnboundedSender<Envelope>, mpsc::UnboundedReceiver<Envelope>) {
        (self.out_tx, self.in_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplex_pair_presents_a_bidirectional_subprotocol_on_both_ends() {
        let (a, b) = ChannelTransport::duplex_pair();
        assert!(a.subprotocol().is_bidirectional());
        assert!(b.subprotocol().is_bidirectional());
    }
}

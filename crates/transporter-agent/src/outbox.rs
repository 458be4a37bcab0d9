use tokio::sync::mpsc;
use transporter_protocol::Envelope;

/// The sink agents emit outbound envelopes into. A thin, cloneable wrapper
/// around an unbounded channel — the session owns the receiving half and
/// forwards it to whatever stream the transport ultimately reads from.
#[derive(Clone)]
pub struct Outbox(mpsc::UnboundedSender<Envelope>);

impl Outbox {
    pub fn new(sender: mpsc::UnboundedSender<Envelope>) -> Self {
        Self(sender)
    }

    /// Best-effort send. A closed receiver means the session has already
    /// torn down its output stream; there is nothing more this agent can
    /// do about it, so the failure is logged and swallowed rather than
    /// propagated (agents never panic on a disconnected peer).
    pub fn send(&self, envelope: Envelope) {
        if self.0.send(envelope).is_err() {
            tracing::debug!("outbox closed, dropping outbound envelope");
        }
    }
}

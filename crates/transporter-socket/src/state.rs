use crate::error::SocketError;

/// §4.7 "State machine": `Connecting -> Connected -> Closing(error?) ->
/// Closed(error?)`. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Connected,
    Closing(Option<SocketError>),
    Closed(Option<SocketError>),
}

impl SocketState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SocketState::Closed(_))
    }

    pub fn is_closing_or_closed(&self) -> bool {
        matches!(self, SocketState::Closing(_) | SocketState::Closed(_))
    }
}

/// Errors from the stateless request/response overlay (§4.9).
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No matching response arrived within the caller's timeout.
    #[error("request timed out")]
    Timeout,
    /// The outbound request channel is closed; nothing will ever be sent.
    #[error("request channel closed")]
    Closed,
    /// A request or response body contained a function or proxy
    /// reference. This overlay has no session to spawn agents for one
    /// (§11 "a memoization cache ... remain external collaborators" — the
    /// same reasoning extends to reference-bearing bodies here).
    #[error("request/response bodies may not contain function or proxy references")]
    ReferencesUnsupported,
}

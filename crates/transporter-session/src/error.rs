use transporter_address::AddressError;

/// Errors a [`crate::Session`] can surface while spawning or routing for
/// its agents (§4.5 "Session").
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session could not claim the address it was asked to serve at
    /// (§4.1 "Address Book"), usually because another live server already
    /// occupies it in the same process.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// The session has already terminated; no further agents can be spawned.
    #[error("session is terminated")]
    Terminated,
}

impl From<SessionError> for transporter_agent::AgentError {
    fn from(err: SessionError) -> Self {
        transporter_agent::AgentError::Hook(err.to_string())
    }
}

/// Errors surfaced to application code calling through a [`crate::Proxy`]
/// or returned from server-agent dispatch (§7 "Error handling design").
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Awaiting a reply took longer than the call's configured timeout
    /// (§5 "Cancellation/timeouts", default 1000ms at the raw proxy layer).
    #[error("call timed out waiting for a reply")]
    Timeout,

    /// The client agent (or the session it belongs to) terminated while a
    /// call was outstanding — the pending promise rejects via the
    /// completed input stream (§5 "Cancellation/timeouts").
    #[error("client agent terminated before a reply arrived")]
    Terminated,

    /// The peer's function threw or rejected; `value` is the decoded
    /// thrown value (§7 "Remote exception").
    #[error("remote call rejected")]
    Remote(serde_json::Value),

    /// `path` did not resolve to anything inside the exposed value
    /// (§4.4 "Resolve path inside the provided value").
    #[error("no such path: {0:?}")]
    PathNotFound(Vec<String>),

    /// `path` resolved to a value, but it is not invocable.
    #[error("path {0:?} does not resolve to a function")]
    NotAFunction(Vec<String>),

    /// The injector could not produce a dependency for one of the
    /// function's tags (§4.4 step 2).
    #[error("dependency injection failed: {0}")]
    Injection(String),

    /// A hook supplied by the session (encode/decode) failed.
    #[error("{0}")]
    Hook(String),
}

impl From<transporter_codec::EncodeFailure<AgentError>> for AgentError {
    fn from(failure: transporter_codec::EncodeFailure<AgentError>) -> Self {
        failure.source
    }
}

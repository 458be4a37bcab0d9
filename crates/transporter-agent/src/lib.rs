//! Client agent (proxy generator) and server agent (dispatcher) pair that
//! marshal calls and replies (§4.3, §4.4).
//!
//! Neither agent knows how to spawn *new* agents recursively — that is
//! the session's job (§4.5 "Encode hook"/"Decode hook"). Agents are
//! handed an [`hooks::EncodeHook`]/[`hooks::DecodeHook`] at construction
//! time and call through them whenever a payload might contain nested
//! functions or proxies.

mod client;
mod error;
mod hooks;
mod outbox;
mod server;

pub use client::{spawn_client_agent, Proxy, WeakProxy, DEFAULT_CALL_TIMEOUT};
pub use error::AgentError;
pub use hooks::{DecodeHook, EncodeHook};
pub use outbox::Outbox;
pub use server::{decoded_to_payload, spawn_server_agent, Injector, NoopInjector, ServerAgentHandle};

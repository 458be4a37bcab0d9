use std::sync::Arc;

use transporter_codec::{Decoded, EncodeFailure, Payload};

use crate::client::Proxy;
use crate::error::AgentError;

/// Bound by the session at agent-construction time (§4.5 "Encode hook"):
/// given a payload, recursively discover functions/proxies inside it and
/// spawn a server agent per reference, returning wire JSON.
pub type EncodeHook = Arc<dyn Fn(&Payload) -> Result<serde_json::Value, EncodeFailure<AgentError>> + Send + Sync>;

/// Bound by the session at agent-construction time (§4.5 "Decode hook"):
/// given wire JSON, recursively materialize a [`Proxy`] for each address
/// reference found inside it.
pub type DecodeHook = Arc<dyn Fn(&serde_json::Value) -> Result<Decoded<Proxy>, AgentError> + Send + Sync>;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use transporter_address::Address;
use transporter_codec::Payload;
use transporter_protocol::{RequestMessage, ResponseMessage};

use crate::codec::{decode_body, encode_body};
use crate::error::RequestError;

/// Default timeout for one request, matching the raw proxy layer's
/// default call timeout (§5 "Cancellation/timeouts").
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);

/// Posts [`RequestMessage`]s and correlates the matching [`ResponseMessage`]
/// by id (§4.9). Stateless: there is no handshake, no buffer, no socket to
/// tear down — dropping the client simply fails every outstanding request.
pub struct RequestClient {
    output: mpsc::UnboundedSender<RequestMessage>,
    pending: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
    timeout: Duration,
}

impl RequestClient {
    /// `output` posts requests to the shared message target; `responses`
    /// is the stream of inbound [`ResponseMessage`]s the transport
    /// demultiplexes back to this client (by whatever means it recognizes
    /// its own traffic on the shared target).
    pub fn new(
        output: mpsc::UnboundedSender<RequestMessage>,
        responses: mpsc::UnboundedReceiver<ResponseMessage>,
        timeout: Duration,
    ) -> Arc<RequestClient> {
        let client = Arc::new(RequestClient { output, pending: Mutex::new(HashMap::new()), timeout });
        client.clone().spawn_response_router(responses);
        client
    }

    /// Send `body` to `address` and await the matching response
    /// (§4.9 "Correlation is by `id`").
    pub async fn request(&self, address: Address, origin: Option<String>, body: Payload) -> Result<Payload, RequestError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        let encoded = match encode_body(&body) {
            Ok(value) => value,
            Err(err) => {
                self.pending.lock().remove(&id);
                return Err(err);
            }
        };
        let request = RequestMessage { id: id.clone(), address, origin, body: encoded };
        if self.output.send(request).is_err() {
            self.pending.lock().remove(&id);
            return Err(RequestError::Closed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(value)) => decode_body(&value),
            Ok(Err(_)) => Err(RequestError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(RequestError::Timeout)
            }
        }
    }

    fn spawn_response_router(self: Arc<Self>, mut responses: mpsc::UnboundedReceiver<ResponseMessage>) {
        tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                if let Some(tx) = self.pending.lock().remove(&response.id) {
                    let _ = tx.send(response.body);
                } else {
                    tracing::debug!(id = %response.id, "no pending request for this response, dropping");
                }
            }
        });
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use transporter_codec::Payload;
use transporter_protocol::{RequestMessage, ResponseMessage};

use crate::codec::{decode_body, encode_body};

/// A handler for one request body, producing the response body (§4.9:
/// "the server's handler returns a body that is wrapped as `{id, body}`
/// and posted back"). Unlike the Server Agent (§4.4), this overlay has no
/// wire-level error channel: a handler that wants to report failure
/// encodes that into the returned [`Payload`] itself.
pub type RequestHandler =
    Arc<dyn Fn(Payload, Option<String>) -> Pin<Box<dyn Future<Output = Payload> + Send>> + Send + Sync>;

/// Listens on a shared request stream and answers each request
/// independently and concurrently — there is no per-connection state to
/// serialize against (§4.9 "no heartbeat, no buffer, no state machine").
pub struct RequestServer {
    handler: RequestHandler,
}

impl RequestServer {
    pub fn listen(
        handler: RequestHandler,
        mut incoming: mpsc::UnboundedReceiver<RequestMessage>,
        outgoing: mpsc::UnboundedSender<ResponseMessage>,
    ) -> Arc<RequestServer> {
        let server = Arc::new(RequestServer { handler });
        tokio::spawn(async move {
            while let Some(request) = incoming.recv().await {
                let handler = server.handler.clone();
                let outgoing = outgoing.clone();
                tokio::spawn(async move {
                    let body = match decode_body(&request.body) {
                        Ok(body) => body,
                        Err(err) => {
                            tracing::debug!(id = %request.id, error = %err, "dropping malformed request body");
                            return;
                        }
                    };
                    let result = (handler)(body, request.origin).await;
                    match encode_body(&result) {
                        Ok(value) => {
                            let _ = outgoing.send(ResponseMessage { id: request.id, body: value });
                        }
                        Err(err) => {
                            tracing::debug!(id = %request.id, error = %err, "dropping unencodable response body");
                        }
                    }
                });
            }
        });
        server
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transporter_address::Address;

    #[tokio::test]
    async fn a_request_is_answered_by_the_handler() {
        let handler: RequestHandler = Arc::new(|body, _origin| {
            Box::pin(async move {
                match body {
                    Payload::String(s) => Payload::String(format!("{s}-pong")),
                    other => other,
                }
            })
        });

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let _server = RequestServer::listen(handler, in_rx, out_tx);

        in_tx
            .send(RequestMessage {
                id: "req-1".into(),
                address: Address::root(),
                origin: Some("https://example.test".into()),
                body: serde_json::json!("ping"),
            })
            .unwrap();

        let response = out_rx.recv().await.unwrap();
        assert_eq!(response.id, "req-1");
        assert_eq!(response.body, serde_json::json!("ping-pong"));
    }
}

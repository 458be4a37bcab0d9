//! End-to-end coverage of the documented concrete scenarios, exercised
//! through the public `expose`/`connect`/`listen` surface rather than the
//! lower crates directly.

use std::sync::Arc;

use tokio::sync::mpsc;

use transporter::{connect, expose, listen, Address, ConnectOptions, Decoded, ExposedFn, ExposeOptions, ListenOptions, Payload};
use transporter_protocol::{Envelope, MessageBody, MessageId};
use transporter_socket::{ConnectAttempt, SocketOptions};

fn channel_pair() -> (transporter::ChannelTransport, transporter::ChannelTransport) {
    transporter::ChannelTransport::duplex_pair()
}

/// S1 — Primitive round-trip: expose `async () => 13`; client proxy call
/// resolves to `13`.
#[tokio::test]
async fn s1_primitive_round_trip() {
    let (server_transport, client_transport) = channel_pair();
    let value = Payload::Function(ExposedFn::new(Arc::new(|_args| {
        Box::pin(async { Ok(Payload::Number(13.into())) })
    })));
    let _handle = expose(value, server_transport, ExposeOptions::default()).unwrap();

    let (proxy, _close) = connect(client_transport, ConnectOptions::default()).unwrap();
    let result = proxy.call(Payload::Array(vec![])).await.unwrap();
    assert!(matches!(result, Decoded::Number(n) if n.as_i64() == Some(13)));
}

/// S2 — Callback: expose `async (cb) => cb()`; client passes a callback
/// resolving to "👍"; exactly one server agent for the callback is spawned
/// and the result is "👍".
#[tokio::test]
async fn s2_callback_round_trip() {
    let (server_transport, client_transport) = channel_pair();
    let value = Payload::Function(ExposedFn::new(Arc::new(|args: Vec<Payload>| {
        Box::pin(async move {
            let Some(Payload::Function(cb)) = args.into_iter().next() else {
                return Err(Payload::String("expected a callback argument".into()));
            };
            (cb.call)(vec![]).await
        })
    })));
    let _handle = expose(value, server_transport, ExposeOptions::default()).unwrap();

    let (proxy, _close) = connect(client_transport, ConnectOptions::default()).unwrap();
    let callback = Payload::Function(ExposedFn::new(Arc::new(|_| {
        Box::pin(async { Ok(Payload::String("\u{1f44d}".into())) })
    })));
    let result = proxy.call(Payload::Array(vec![callback])).await.unwrap();
    assert!(matches!(result, Decoded::String(s) if s == "\u{1f44d}"));
}

/// S3 — Error: expose `async () => { throw "💣" }`; client promise rejects
/// with "💣".
#[tokio::test]
async fn s3_thrown_error_rejects_the_call() {
    let (server_transport, client_transport) = channel_pair();
    let value = Payload::Function(ExposedFn::new(Arc::new(|_args| {
        Box::pin(async { Err(Payload::String("\u{1f4a3}".into())) })
    })));
    let _handle = expose(value, server_transport, ExposeOptions::default()).unwrap();

    let (proxy, _close) = connect(client_transport, ConnectOptions::default()).unwrap();
    let err = proxy.call(Payload::Array(vec![])).await.unwrap_err();
    match err {
        transporter_agent::AgentError::Remote(v) => assert_eq!(v, serde_json::json!("\u{1f4a3}")),
        other => panic!("unexpected error {other:?}"),
    }
}

/// S4 — Referential stability: `proxy.get("foo").get("bar")` is the same
/// `(address, path)` identity every time it's obtained, independent of
/// unrelated proxies being dropped and garbage-collected in between.
#[tokio::test]
async fn s4_referential_stability_under_gc() {
    let (server_transport, client_transport) = channel_pair();
    let value = Payload::Object(Default::default());
    let _handle = expose(value, server_transport, ExposeOptions::default()).unwrap();

    let (proxy, _close) = connect(client_transport, ConnectOptions::default()).unwrap();

    let unrelated = proxy.get("unrelated");
    drop(unrelated);
    tokio::task::yield_now().await;

    let foo_bar_first = proxy.get("foo").get("bar");
    let foo_bar_second = proxy.get("foo").get("bar");
    assert_eq!(foo_bar_first, foo_bar_second);
}

/// `listen` accepts one connection, serving a fresh per-connection value,
/// and the client obtained through the accepted socket can call through.
#[tokio::test]
async fn listen_accept_and_call_through_a_socket() {
    let addr = Address::new(format!("scenario-listen-{}", uuid::Uuid::new_v4()));
    let (connect_tx, connect_rx) = mpsc::unbounded_channel::<ConnectAttempt>();

    let handle = listen(
        || Payload::Function(ExposedFn::new(Arc::new(|_| Box::pin(async { Ok(Payload::Number(7.into())) })))),
        connect_rx,
        ListenOptions {
            socket_options: SocketOptions {
                disconnect_timeout: std::time::Duration::from_millis(50),
                ..SocketOptions::default()
            },
            ..ListenOptions::at(addr.clone())
        },
    )
    .unwrap();

    let (client_to_server_tx, client_to_server_rx) = mpsc::unbounded_channel();
    let (server_to_client_tx, server_to_client_rx) = mpsc::unbounded_channel();
    connect_tx
        .send(ConnectAttempt {
            envelope: Envelope::new(Address::root(), MessageId::new(), MessageBody::Connect { address: addr.clone() }),
            origin: None,
            port: (server_to_client_tx, client_to_server_rx),
        })
        .unwrap();

    let client_transport =
        transporter::ChannelTransport::new(transporter_protocol::Subprotocol::duplex_unicast(), client_to_server_tx, server_to_client_rx);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (proxy, _close) = connect(client_transport, ConnectOptions::default()).unwrap();
    let result = proxy.call(Payload::Array(vec![])).await.unwrap();
    assert!(matches!(result, Decoded::Number(n) if n.as_i64() == Some(7)));
    assert_eq!(handle.client_count(), 1);

    handle.stop().await;
}

//! Cross-session behavioral scenarios from spec.md §8.

use std::sync::Arc;

use tokio::sync::mpsc;
use transporter_address::Address;
use transporter_agent::NoopInjector;
use transporter_codec::{Decoded, ExposedFn, Payload};
use transporter_protocol::{Envelope, Subprotocol};
use transporter_session::{Role, Session};

fn connected_pair(value: Payload) -> (Arc<Session>, Arc<Session>) {
    let (server_out_tx, server_out_rx) = mpsc::unbounded_channel::<Envelope>();
    let (client_out_tx, client_out_rx) = mpsc::unbounded_channel::<Envelope>();

    let server = Session::spawn(
        Role::serve_at(value, Address::root(), Arc::new(NoopInjector)),
        Subprotocol::duplex_unicast(),
        client_out_rx,
        server_out_tx,
    )
    .unwrap();
    let client = Session::spawn(Role::consume(), Subprotocol::duplex_unicast(), server_out_rx, client_out_tx).unwrap();
    (server, client)
}

/// S2: a callback passed as an argument is invoked by the server and its
/// result flows back through the same call.
#[tokio::test]
async fn s2_callback_round_trips() {
    let echo_via_callback = Payload::Function(ExposedFn::new(Arc::new(|args: Vec<Payload>| {
        Box::pin(async move {
            let Some(Payload::Function(cb)) = args.into_iter().next() else {
                return Err(Payload::String("expected a callback".into()));
            };
            (cb.call)(vec![]).await
        })
    })));

    let (server, client) = connected_pair(echo_via_callback);
    let proxy = client.create_proxy().unwrap();

    let callback = Payload::Function(ExposedFn::new(Arc::new(|_args| {
        Box::pin(async { Ok(Payload::String("\u{1f44d}".into())) })
    })));

    let result = proxy.call(Payload::Array(vec![callback])).await.unwrap();
    assert!(matches!(result, Decoded::String(s) if s == "\u{1f44d}"));

    // Give the callback's server agent a chance to observe the
    // GarbageCollect its proxy emits once the call completes and the
    // argument proxy drops.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(server.task_count(), 1); // only the root server agent remains
    drop(client);
}

/// S3: a thrown value surfaces as a rejected call.
#[tokio::test]
async fn s3_thrown_value_rejects() {
    let boom = Payload::Function(ExposedFn::new(Arc::new(|_args| {
        Box::pin(async { Err(Payload::String("\u{1f4a3}".into())) })
    })));
    let (_server, client) = connected_pair(boom);
    let proxy = client.create_proxy().unwrap();
    let err = proxy.call(Payload::Array(vec![])).await.unwrap_err();
    match err {
        transporter_agent::AgentError::Remote(v) => assert_eq!(v, serde_json::json!("\u{1f4a3}")),
        other => panic!("unexpected error: {other:?}"),
    }
}

/// GC -> server release (§8): dropping every local proxy for a nested
/// reference causes the corresponding server agent to terminate.
#[tokio::test]
async fn nested_reference_gc_releases_the_server_agent() {
    let make_counter = Payload::Function(ExposedFn::new(Arc::new(|_args| {
        Box::pin(async move {
            let count = Arc::new(std::sync::atomic::AtomicI64::new(0));
            let inner = count.clone();
            Ok(Payload::Function(ExposedFn::new(Arc::new(move |_args| {
                let inner = inner.clone();
                Box::pin(async move { Ok(Payload::Number(inner.fetch_add(1, std::sync::atomic::Ordering::SeqCst).into())) })
            }))))
        })
    })));

    let (server, client) = connected_pair(make_counter);
    let proxy = client.create_proxy().unwrap();

    let counter = proxy.call(Payload::Array(vec![])).await.unwrap();
    let Decoded::Proxy(counter_proxy) = counter else { panic!("expected a proxy back") };
    assert_eq!(server.task_count(), 2); // root + the spawned counter

    drop(counter_proxy);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(server.task_count(), 1);
}

//! S6 — Buffer overflow (spec.md §8): with `bufferLimit=1` and
//! `DropOldest`, sending `"🍔"` then `"🌭"` while `Connecting` leaves only
//! `"🌭"` once the socket reaches `Connected`.

use tokio::sync::mpsc;
use transporter_address::Address;
use transporter_protocol::{Envelope, MessageBody, MessageId};
use transporter_socket::{BufferLimit, BufferOverflowStrategy, Socket, SocketOptions, SocketRole, SocketState};

fn burger_env(text: &str) -> Envelope {
    Envelope::new(Address::root(), MessageId::new(), MessageBody::Set { value: serde_json::json!(text) })
}

#[tokio::test]
async fn drop_oldest_keeps_only_the_latest_entry() {
    let options = SocketOptions {
        buffer_limit: BufferLimit::bounded(1),
        buffer_overflow_strategy: BufferOverflowStrategy::DropOldest,
        ..SocketOptions::default()
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (socket, _app_rx) = Socket::open(
        Address::new("c"),
        options,
        SocketRole::Client { server_address: Address::root() },
        out_tx,
        in_rx,
    );
    let _ = out_rx.recv().await.unwrap(); // Connect handshake frame

    socket.send(burger_env("\u{1f354}"));
    socket.send(burger_env("\u{1f32d}"));

    in_tx
        .send(Envelope::new(Address::root(), MessageId::new(), MessageBody::Connected))
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(matches!(socket.state(), SocketState::Connected));

    let delivered = out_rx.recv().await.unwrap();
    match delivered.body {
        MessageBody::Set { value } => assert_eq!(value, serde_json::json!("\u{1f32d}")),
        other => panic!("unexpected body: {other:?}"),
    }
    assert!(out_rx.try_recv().is_err());
}

#[tokio::test]
async fn error_strategy_closes_the_socket_on_overflow() {
    let options = SocketOptions {
        buffer_limit: BufferLimit::bounded(1),
        buffer_overflow_strategy: BufferOverflowStrategy::Error,
        ..SocketOptions::default()
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (_in_tx, in_rx) = mpsc::unbounded_channel();
    let (socket, _app_rx) = Socket::open(
        Address::new("c"),
        options,
        SocketRole::Client { server_address: Address::root() },
        out_tx,
        in_rx,
    );
    let _ = out_rx.recv().await.unwrap(); // Connect handshake frame

    socket.send(burger_env("\u{1f354}"));
    socket.send(burger_env("\u{1f32d}"));

    let err = socket.closed().await;
    assert_eq!(err, Some(transporter_socket::SocketError::BufferOverflowError));
}

//! Room membership, roomcast and targeted-delivery behavior over real
//! websocket connections.

mod common;

use common::*;
use sacsock_client::Connection;
use sacsock_core::Payload;
use sacsock_protocol::{PayloadTag, SUBPROTOCOL};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn join_roomcast_leave() {
    let (server, url) = start_server().await;
    register_room_handlers(&server);

    let mut a = Connection::connect(&url).await.unwrap();
    let mut b = Connection::connect(&url).await.unwrap();

    join_room(&mut a, "lobby").await;

    server.roomcast("lobby", "hi", "world").await;
    let payload = expect_event(&mut a, "hi").await;
    assert_eq!(payload, b"world");
    assert_silent(&mut b).await;

    a.emit("leave", "lobby").await.unwrap();
    expect_event(&mut a, "left").await;

    server.roomcast("lobby", "hi", "again").await;
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn socketcast_reaches_exactly_one_socket() {
    let (server, url) = start_server().await;
    server.on_connect(|socket| async move {
        let _ = socket.emit("welcome", socket.id().to_string());
    });

    let mut x = Connection::connect(&url).await.unwrap();
    let mut y = Connection::connect(&url).await.unwrap();

    let x_id = String::from_utf8(expect_event(&mut x, "welcome").await).unwrap();
    let _y_id = expect_event(&mut y, "welcome").await;

    server.socketcast(&x_id, "pm", "hi").await;
    let payload = expect_event(&mut x, "pm").await;
    assert_eq!(payload, b"hi");
    assert_silent(&mut y).await;
}

#[tokio::test]
async fn room_shadow_answers_membership_queries() {
    let (server, url) = start_server().await;
    register_room_handlers(&server);
    server.on("check", |socket, data| async move {
        let room = String::from_utf8_lossy(&data).into_owned();
        let _ = socket.emit("check", socket.in_room(&room).to_string());
    });

    let mut conn = Connection::connect(&url).await.unwrap();

    conn.emit("check", "lobby").await.unwrap();
    assert_eq!(expect_event(&mut conn, "check").await, b"false");

    join_room(&mut conn, "lobby").await;
    conn.emit("check", "lobby").await.unwrap();
    assert_eq!(expect_event(&mut conn, "check").await, b"true");
}

#[tokio::test]
async fn binary_payloads_survive_the_round_trip() {
    let (server, url) = start_server().await;
    server.on("scramble", |socket, data| async move {
        let reversed: Vec<u8> = data.into_iter().rev().collect();
        let _ = socket.emit("scramble", Payload::Bin(reversed));
    });

    let mut conn = Connection::connect(&url).await.unwrap();
    conn.emit("scramble", Payload::Bin(vec![0, 1, 2, 3])).await.unwrap();

    let frame = conn.next_event().await.unwrap().expect("reply");
    assert_eq!(frame.event, "scramble");
    assert_eq!(frame.tag, PayloadTag::Bin);
    assert_eq!(frame.payload, vec![3, 2, 1, 0]);
}

#[tokio::test]
async fn structured_payloads_arrive_as_json_frames() {
    let (server, url) = start_server().await;
    server.on("whoami", |socket, _data| async move {
        let body = Payload::json(&serde_json::json!({
            "id": socket.id(),
            "rooms": socket.rooms().len(),
        }))
        .expect("serializable");
        let _ = socket.emit("whoami", body);
    });

    let mut conn = Connection::connect(&url).await.unwrap();
    conn.emit("whoami", "").await.unwrap();

    let frame = conn.next_event().await.unwrap().expect("reply");
    assert_eq!(frame.event, "whoami");
    assert_eq!(frame.tag, PayloadTag::Json);
    let value: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
    // Connected sockets always sit in their own singleton room.
    assert_eq!(value["rooms"], 1);
    assert!(value["id"].as_str().is_some());
}

#[tokio::test]
async fn unknown_events_are_dropped_without_killing_the_connection() {
    let (server, url) = start_server().await;
    server.on("echo", |socket, data| async move {
        let _ = socket.emit("echo", data);
    });

    let mut conn = Connection::connect(&url).await.unwrap();
    conn.emit("nobody-home", "x").await.unwrap();
    conn.emit("echo", b"still alive".as_slice()).await.unwrap();

    let payload = expect_event(&mut conn, "echo").await;
    assert_eq!(payload, b"still alive");
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_killing_the_connection() {
    let (server, url) = start_server().await;
    server.on("echo", |socket, data| async move {
        let _ = socket.emit("echo", data);
    });

    // Raw connection so we can put arbitrary bytes on the wire.
    let mut request = url.as_str().into_client_request().unwrap();
    request.headers_mut().insert(
        header::SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(SUBPROTOCOL),
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    use futures_util::{SinkExt, StreamExt};
    ws.send(Message::Text("no separators here".to_string())).await.unwrap();
    ws.send(Message::Text("echo\u{1}S\u{2}ok".to_string())).await.unwrap();

    let reply = loop {
        match ws.next().await.expect("connection stayed open").unwrap() {
            Message::Text(text) => break text,
            _ => continue,
        }
    };
    assert_eq!(reply, "echo\u{1}S\u{2}ok");
}

#[tokio::test]
async fn handshake_without_the_subprotocol_is_rejected() {
    let (_server, url) = start_server().await;

    // No Sec-WebSocket-Protocol header at all.
    let result = tokio_tungstenite::connect_async(url.as_str()).await;
    assert!(result.is_err(), "handshake should have been rejected");
}

#[tokio::test]
async fn connections_past_the_client_limit_are_refused() {
    let mut config = test_config();
    config.max_clients = 1;
    let (_server, url) = start_server_with(config).await;

    let _first = Connection::connect(&url).await.unwrap();
    // Give the accept loop a beat to register the first connection.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = Connection::connect(&url).await;
    assert!(second.is_err(), "second connection should have been refused");
}

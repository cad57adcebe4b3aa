//! Helpers shared by the integration tests: ephemeral-port servers, real
//! client connections, and small waiting utilities.

#![allow(dead_code)]

use std::time::Duration;

use sacsock_client::Connection;
use sacsock_server::{Config, Server};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        max_clients: 256,
    }
}

/// Start a server on an ephemeral port; returns the facade and a
/// connectable `ws://` URL.
pub async fn start_server_with(config: Config) -> (Server, String) {
    let server = Server::new(config);
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let accept = server.clone();
    tokio::spawn(async move {
        let _ = accept.serve_on(listener).await;
    });
    (server, format!("ws://{addr}"))
}

pub async fn start_server() -> (Server, String) {
    start_server_with(test_config()).await
}

/// Register `join`/`leave` handlers that ack with `joined`/`left`, so a
/// test can wait until the membership change has been queued.
pub fn register_room_handlers(server: &Server) {
    server.on("join", |socket, data| async move {
        let room = String::from_utf8_lossy(&data).into_owned();
        socket.join(&room).await;
        let _ = socket.emit("joined", room);
    });
    server.on("leave", |socket, data| async move {
        let room = String::from_utf8_lossy(&data).into_owned();
        socket.leave(&room).await;
        let _ = socket.emit("left", room);
    });
}

/// Wait for the next event and assert its name; returns the payload.
pub async fn expect_event(conn: &mut Connection, event: &str) -> Vec<u8> {
    let frame = timeout(Duration::from_secs(2), conn.next_event())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {event:?}"))
        .expect("read failed")
        .unwrap_or_else(|| panic!("connection closed while waiting for {event:?}"));
    assert_eq!(frame.event, event);
    frame.payload
}

/// Assert that nothing arrives on this connection for a little while.
pub async fn assert_silent(conn: &mut Connection) {
    match timeout(Duration::from_millis(200), conn.next_event()).await {
        Err(_) => {}
        Ok(event) => panic!("expected silence, got {event:?}"),
    }
}

pub async fn join_room(conn: &mut Connection, room: &str) {
    conn.emit("join", room).await.expect("join emit");
    expect_event(conn, "joined").await;
}

/// Poll a condition until it holds or a deadline passes.
pub async fn eventually(mut check: impl FnMut() -> bool, what: &str) {
    for _ in 0..200 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

//! The mock backend's canned producers drive the remote fan-out path end
//! to end.

mod common;

use std::time::Duration;

use common::*;
use sacsock_client::Connection;
use sacsock_server::backend::dummy::DummyBackend;

#[tokio::test]
async fn dummy_backend_ticks_reach_connected_sockets() {
    let (server, url) = start_server().await;
    register_room_handlers(&server);

    let mut conn = Connection::connect(&url).await.unwrap();
    join_room(&mut conn, "dummy-room").await;

    // Installed after the join so the first canned messages already find
    // a member in the room.
    server
        .set_multihome_backend(DummyBackend::new(
            "tick",
            "dummy-room",
            "dummy-cast",
            "beat",
            Duration::from_millis(50),
        ))
        .await;

    // Both canned producers should show up; order between them is not
    // fixed.
    let mut saw_tick = false;
    let mut saw_cast = false;
    while !(saw_tick && saw_cast) {
        let frame = tokio::time::timeout(Duration::from_secs(2), conn.next_event())
            .await
            .expect("dummy traffic never arrived")
            .unwrap()
            .expect("connection closed early");
        match frame.event.as_str() {
            "tick" => {
                assert_eq!(frame.payload, b"beat");
                saw_tick = true;
            }
            "dummy-cast" => {
                assert_eq!(frame.payload, b"beat");
                saw_cast = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    server.shutdown().await;
}

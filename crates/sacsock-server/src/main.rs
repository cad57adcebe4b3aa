//! Demo websocket event server.
//!
//! Registers the classic handler set (echo, join, leave, roomcast,
//! broadcast) and serves until interrupted, then shuts down cleanly.

use sacsock_server::config::Config;
use sacsock_server::Server;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Deserialize)]
struct JoinBody {
    room: String,
}

#[derive(Deserialize)]
struct LeaveBody {
    room: String,
}

#[derive(Deserialize)]
struct RoomcastBody {
    room: String,
    event: String,
    data: String,
}

#[derive(Deserialize)]
struct BroadcastBody {
    event: String,
    data: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Read config from env + CLI. CLI (e.g. --port 9090) wins.
    let config = Config::from_env_and_args()?;
    info!(addr = %config.socket_addr_string(), "starting demo server");

    let server = Server::new(config);

    server.on("echo", |socket, data| async move {
        let text = String::from_utf8_lossy(&data).into_owned();
        if let Err(e) = socket.emit("echo", text) {
            debug!(id = %socket.id(), error = %e, "echo emit failed");
        }
    });

    server.on("join", |socket, data| async move {
        match serde_json::from_slice::<JoinBody>(&data) {
            Ok(body) => {
                socket.join(&body.room).await;
                let _ = socket.emit("echo", format!("joined: {}", body.room));
            }
            Err(e) => warn!(id = %socket.id(), error = %e, "bad join body"),
        }
    });

    server.on("leave", |socket, data| async move {
        match serde_json::from_slice::<LeaveBody>(&data) {
            Ok(body) => {
                socket.leave(&body.room).await;
                let _ = socket.emit("echo", format!("left: {}", body.room));
            }
            Err(e) => warn!(id = %socket.id(), error = %e, "bad leave body"),
        }
    });

    server.on("roomcast", |socket, data| async move {
        match serde_json::from_slice::<RoomcastBody>(&data) {
            Ok(body) => socket.roomcast(&body.room, &body.event, body.data).await,
            Err(e) => warn!(id = %socket.id(), error = %e, "bad roomcast body"),
        }
    });

    server.on("broadcast", |socket, data| async move {
        match serde_json::from_slice::<BroadcastBody>(&data) {
            Ok(body) => socket.broadcast(&body.event, body.data).await,
            Err(e) => warn!(id = %socket.id(), error = %e, "bad broadcast body"),
        }
    });

    server.on_connect(|socket| async move {
        info!(id = %socket.id(), "client connected");
    });

    server.on_disconnect(|socket| async move {
        info!(id = %socket.id(), "client disconnected");
    });

    tokio::select! {
        result = server.serve() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
            server.shutdown().await;
        }
    }

    Ok(())
}

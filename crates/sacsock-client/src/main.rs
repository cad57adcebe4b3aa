//! Interactive command-line client.
//!
//! Connects to a sacsock server, sends one event per input line
//! (`event payload`), and prints every event the server delivers.

use anyhow::Result;
use clap::Parser;
use sacsock_client::Connection;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[clap(name = "sacsock-client")]
#[clap(about = "Interactive client for sacsock websocket servers")]
struct Cli {
    /// Server URL
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt::init();
    }

    let conn = Connection::connect(&cli.url).await?;
    println!("connected to {} - type `event payload` lines, ctrl-d quits", cli.url);

    let (mut sink, mut stream) = conn.split();

    let reader = tokio::spawn(async move {
        loop {
            match stream.next_event().await {
                Ok(Some(frame)) => {
                    println!("[{}] {}", frame.event, String::from_utf8_lossy(&frame.payload));
                }
                Ok(None) => {
                    println!("server closed the connection");
                    break;
                }
                Err(e) => {
                    eprintln!("read error: {e}");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (event, payload) = line.split_once(' ').unwrap_or((line, ""));
        sink.emit(event, payload).await?;
    }

    sink.close().await?;
    reader.await?;
    Ok(())
}

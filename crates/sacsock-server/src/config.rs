//! Configuration for the websocket server.
//!
//! For now this is intentionally simple: you can either use defaults
//! or override via a few environment variables:
//!
//! - `SACSOCK_BIND_ADDR`   (default: "0.0.0.0")
//! - `SACSOCK_PORT`        (default: "8080")
//! - `SACSOCK_MAX_CLIENTS` (default: "1024")

use std::env;
use std::str::FromStr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on. 0 asks the OS for an ephemeral port.
    pub port: u16,

    /// Maximum number of simultaneously connected sockets.
    pub max_clients: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            max_clients: 1024,
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to reasonable defaults.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let bind_addr = env::var("SACSOCK_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = read_env_or_default("SACSOCK_PORT", 8080u16)?;
        let max_clients = read_env_or_default("SACSOCK_MAX_CLIENTS", 1024usize)?;

        Ok(Config {
            bind_addr,
            port,
            max_clients,
        })
    }

    /// Environment variables plus command-line overrides; the CLI wins.
    /// Recognized flags: `--addr <ip>`, `--port <port>`, `--max-clients <n>`.
    pub fn from_env_and_args() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Config::from_env()?;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--addr" => {
                    config.bind_addr = args.next().ok_or("missing value for --addr")?;
                }
                "--port" => {
                    config.port = args.next().ok_or("missing value for --port")?.parse()?;
                }
                "--max-clients" => {
                    config.max_clients =
                        args.next().ok_or("missing value for --max-clients")?.parse()?;
                }
                other => return Err(format!("unknown argument: {other}").into()),
            }
        }

        Ok(config)
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_env_or_default<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::error::Error + 'static,
{
    match env::var(key) {
        Ok(val) => Ok(val.parse::<T>()?),
        Err(_) => Ok(default),
    }
}

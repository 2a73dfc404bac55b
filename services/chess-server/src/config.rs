//! Command-line entry point configuration.
//!
//! Positional arguments per spec.md §6: `authentication`,
//! `admin_authentication`, `port` (default `55555`), `ip` (default =
//! auto-detected local address, per `original_source`'s `get_local_ip`).

use clap::Parser;
use std::net::UdpSocket;

#[derive(Debug, Parser)]
#[command(name = "chess-server", version)]
pub struct Cli {
    /// Shared secret a regular client must present first.
    pub authentication: String,
    /// Shared secret that promotes a connection to the admin channel.
    pub admin_authentication: String,
    /// Listening port; on conflict the next MAX_ATTEMPTS-1 ports are tried.
    #[arg(default_value = "55555")]
    pub port: u16,
    /// Bind address; defaults to the machine's outbound-routable address.
    pub ip: Option<String>,
}

impl Cli {
    pub fn resolve_ip(&self) -> String {
        self.ip.clone().unwrap_or_else(|| local_ip().unwrap_or_else(|_| "0.0.0.0".to_owned()))
    }
}

/// Discover the local outbound IP by connecting a UDP socket to a
/// well-known public address and reading back the local endpoint. No
/// packets are actually sent; `connect` on a UDP socket only binds the
/// route.
pub fn local_ip() -> std::io::Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip().to_string())
}

/// Directory name for this server's persisted state: `data_<ip>_<port>`
/// with dots replaced by underscores, per spec.md §6.
pub fn data_dir_name(ip: &str, port: u16) -> String {
    format!("data_{ip}_{port}").replace('.', "_")
}

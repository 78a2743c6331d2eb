//! Runtime configuration, from flags or the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::relay::SenderPolicy;

/// WebRTC signaling relay
///
/// Assigns ids to browser peers and forwards offers, answers and ICE
/// candidates between them over WebSocket.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED), env = "HOST")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// Directory served for plain HTTP requests (demo page)
    #[arg(long, default_value = "public", env = "RELAY_STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Forward the `sender` a client claims instead of stamping its real id
    #[arg(long, default_value_t = false, env = "RELAY_TRUST_CLIENT_SENDER")]
    pub trust_client_sender: bool,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn sender_policy(&self) -> SenderPolicy {
        if self.trust_client_sender {
            SenderPolicy::TrustClient
        } else {
            SenderPolicy::Stamp
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            static_dir: PathBuf::from("public"),
            trust_client_sender: false,
        }
    }
}

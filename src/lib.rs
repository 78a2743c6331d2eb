//! WebRTC signaling relay.
//!
//! Browser peers connect over WebSocket, receive an id and the list of peers
//! already present, and exchange offers, answers and ICE candidates through
//! the relay until they can talk to each other directly. No media passes
//! through here.

pub mod app_state;
pub mod config;
pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod signal;
pub mod socket;

pub use app_state::AppState;
pub use config::Config;
pub use error::{MessageError, RelayError};
pub use registry::{ClientId, Outbox, Registry};
pub use relay::{Relay, SenderPolicy};
pub use signal::{ClientMessage, ServerMessage, SignalKind};

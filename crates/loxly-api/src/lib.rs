// loxly-api: Async Rust client for the Loxone Miniserver WebSocket protocol

pub mod auth;
pub mod error;
pub mod frame;
pub mod state_id;
pub mod structure;
pub mod transport;
pub mod websocket;

pub use auth::{AuthSession, AuthState, HashAlg, KeyInfo};
pub use error::Error;
pub use frame::{MessageHeader, MessageType, RawUpdate, StateValue};
pub use state_id::{StateId, StateIdParseError};
pub use structure::{StructureClient, StructureDocument};
pub use transport::TransportConfig;
pub use websocket::{MessageStream, WsStream};

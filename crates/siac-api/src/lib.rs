// siac-api: Async Rust client for the SIAC-IoT backend (REST + event stream)

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use auth::{CredentialStore, MemoryCredentialStore, StoredToken};
pub use client::ApiClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{
    ConnectionState, Connector, EventPayload, EventSocket, Frame, ReconnectConfig, StreamClient,
    StreamEvent, TungsteniteConnector,
};

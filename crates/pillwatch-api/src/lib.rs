// pillwatch-api: Async Rust client for the Home Assistant REST + WebSocket APIs

pub mod error;
pub mod models;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use models::{StateChange, StateObject};
pub use rest::RestClient;
pub use websocket::{EventStreamHandle, ReconnectConfig};

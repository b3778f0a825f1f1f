//! WebSocket module
//!
//! Reusable reconnecting client used by the oracle stream

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsEvent};

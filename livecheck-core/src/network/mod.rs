//! Duplex channel to the verification service.
//!
//! | Module      | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | `transport` | `Connector` seam and the WebSocket implementation    |
//! | `endpoint`  | Page origin → WebSocket URL resolution               |
//! | `manager`   | Connect / reconnect supervisor and the guarded sender |

pub mod endpoint;
pub mod manager;
pub mod transport;

pub use endpoint::resolve_endpoint;
pub use manager::{ConnectionManager, FrameSender, ManagerSettings, RECONNECT_DELAY};
pub use transport::{Channel, Connector, TextSink, TextStream, WsConnector};

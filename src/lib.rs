//! Real-time location radar relay.
//!
//! Many WebSocket clients report positions; the server keeps an in-memory
//! presence map, derives who is near whom, and pushes incremental updates
//! to every interested connection. Identity and authorization are resolved
//! upstream — this crate trusts the `user_id` it is handed.
//!
//! The library surface exists for client binaries and tests: the wire types
//! in [`message`] and the reconnect contract in [`reconnect`] are shared
//! with consumers; everything else is the server.

pub mod config;
pub mod hub;
pub mod message;
pub mod proximity;
pub mod reconnect;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;

//! # printrelay-client
//!
//! Client library for the printrelay receipt-printing daemon.
//!
//! This crate provides:
//! - A connection manager that owns the single WebSocket link and retries
//!   forever with a fixed delay
//! - A message exchange that gates submissions on connectivity and
//!   classifies daemon replies
//! - A high-level `PrintClient` with typed job helpers

pub mod client;
pub mod connection;
pub mod error;
pub mod exchange;
pub mod transport;

pub use client::PrintClient;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::ClientError;
pub use exchange::MessageExchange;
pub use transport::{Connector, Link, TransportEvent, WsConnector};

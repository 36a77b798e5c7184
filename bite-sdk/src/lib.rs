//! Shared wire types for the Bite Share matching engine.
//!
//! - [`objects`] holds the request/response bodies and WebSocket frames.
//! - [`signature`] signs and verifies the gateway identity assertion.
//! - [`client`] (feature `client`) is a typed HTTP + WebSocket client.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;

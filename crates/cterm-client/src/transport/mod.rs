//! Concrete channel transports.
//!
//! The channel adapter drives the [`TransportSink`]/[`TransportStream`]
//! pair from `cterm-core`; this module provides the production WebSocket
//! implementation. Tests supply an in-memory pair implementing the same
//! traits.
//!
//! [`TransportSink`]: cterm_core::TransportSink
//! [`TransportStream`]: cterm_core::TransportStream

pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use websocket::connect as connect_websocket;

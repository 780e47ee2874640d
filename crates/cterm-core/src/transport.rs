//! Abstract transport capability for the terminal channel.
//!
//! The channel adapter never talks to a socket directly; it drives a pair
//! of boxed trait objects, one per direction. Any transport that can move
//! text frames (a WebSocket, a multiplexed stream, a test double) can
//! implement the pair.

use std::future::Future;
use std::pin::Pin;

use crate::error::CtermResult;

/// Boxed future used by the object-safe transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half of a channel transport.
pub trait TransportSink: Send {
    /// Transmit one text frame.
    fn send<'a>(&'a mut self, text: &'a str) -> BoxFuture<'a, CtermResult<()>>;

    /// Close the transport. Called at most once by the channel pump.
    fn close(&mut self) -> BoxFuture<'_, CtermResult<()>>;
}

/// Inbound half of a channel transport.
pub trait TransportStream: Send {
    /// Wait for the next inbound text frame.
    ///
    /// Returns `None` on clean remote close. An `Err` whose
    /// [`is_frame_local`](crate::error::CtermError::is_frame_local) is true
    /// means one bad frame arrived and the stream is still usable; any
    /// other error is fatal to the connection.
    fn next(&mut self) -> BoxFuture<'_, Option<CtermResult<String>>>;
}

/// A connected transport: the sink and stream halves.
pub type TransportPair = (Box<dyn TransportSink>, Box<dyn TransportStream>);

//! cterm-core: shared library for the cterm terminal session bridge.
//!
//! Provides the session descriptor model, the text-safe frame codec used on
//! the terminal channel, the error taxonomy, and the abstract transport
//! traits that concrete channel transports implement.

pub mod descriptor;
pub mod error;
pub mod frames;
pub mod transport;

// Re-export commonly used items at crate root.
pub use descriptor::SessionDescriptor;
pub use error::{CtermError, CtermResult};
pub use frames::{Direction, FrameEnvelope};
pub use transport::{TransportPair, TransportSink, TransportStream};

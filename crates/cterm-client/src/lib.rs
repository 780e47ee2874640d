//! cterm-client: the interactive terminal session bridge.
//!
//! Resolves a cluster name to a session descriptor over a credentialed
//! HTTP call, opens a persistent WebSocket channel keyed by the session
//! id, pumps base64-transcoded bytes between the channel and a local
//! terminal surface, and guarantees exactly-once teardown on every close
//! path.
//!
//! # Quick Start
//!
//! ```no_run
//! use cterm_client::{Credentials, Negotiator, TerminalBridge, CrosstermSurface};
//!
//! # async fn example() {
//! let negotiator = Negotiator::new(
//!     "https://dashboard.example.com",
//!     Credentials::bearer("secret-token"),
//! );
//! let bridge = TerminalBridge::new(negotiator, Box::new(CrosstermSurface::new()));
//!
//! bridge.open("cluster-7").await;
//! bridge.wait().await;
//!
//! if let Some(reason) = bridge.last_error() {
//!     eprintln!("session ended with error: {reason}");
//! }
//! # }
//! ```

pub mod auth;
pub mod bridge;
pub mod channel;
pub mod negotiate;
pub mod surface;
pub mod transport;

// Re-export primary public types.
pub use auth::Credentials;
pub use bridge::{BridgeState, TerminalBridge};
pub use channel::{ChannelState, TerminalChannel};
pub use negotiate::Negotiator;
pub use surface::{CrosstermSurface, Surface, SurfaceEvent, ViewportGeometry};

// Re-export cterm-core types for convenience.
pub use cterm_core::{CtermError, CtermResult, SessionDescriptor};

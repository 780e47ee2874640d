//! Text-safe framing for the terminal channel.
//!
//! The channel transport carries only text frames, so every payload is
//! transcoded through base64 (standard alphabet): arbitrary terminal
//! bytes are encoded on the way out and decoded on the way in. This
//! invariant holds for every frame, including payloads that already look
//! like plain text.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{CtermError, CtermResult};

/// Which way a frame is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remote output, headed for the terminal surface.
    Inbound,
    /// Local keystrokes, headed for the remote session.
    Outbound,
}

/// The unit exchanged over the terminal channel: a raw byte payload plus
/// its direction. The wire carries only the base64 rendering of `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEnvelope {
    pub direction: Direction,
    pub payload: Vec<u8>,
}

impl FrameEnvelope {
    /// Wrap local bytes for transmission.
    pub fn outbound(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            direction: Direction::Outbound,
            payload: payload.into(),
        }
    }

    /// Encode the payload into its text-safe wire form.
    pub fn encode(&self) -> String {
        STANDARD.encode(&self.payload)
    }

    /// Decode an inbound wire frame back to raw bytes.
    ///
    /// Fails with [`CtermError::Decode`] when the frame is not valid
    /// base64; callers drop such frames rather than tearing the session
    /// down.
    pub fn decode_inbound(text: &str) -> CtermResult<Self> {
        let payload = STANDARD
            .decode(text.trim_end_matches(['\r', '\n']))
            .map_err(|e| CtermError::Decode(format!("invalid base64 frame: {e}")))?;
        Ok(Self {
            direction: Direction::Inbound,
            payload,
        })
    }
}

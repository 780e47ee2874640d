use thiserror::Error;

/// Errors produced by the cterm session bridge.
#[derive(Debug, Error)]
pub enum CtermError {
    /// The terminal session negotiation request failed. `status` carries the
    /// HTTP status when the endpoint answered with a non-success code, and is
    /// `None` for transport-level failures (unreachable host, bad body).
    #[error("{detail}")]
    Negotiation {
        status: Option<u16>,
        detail: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("frame decode error: {0}")]
    Decode(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CtermError {
    /// Build a negotiation failure from an HTTP status line.
    pub fn negotiation_status(status: u16, status_text: &str) -> Self {
        CtermError::Negotiation {
            status: Some(status),
            detail: format!("terminal session request failed: {status} {status_text}")
                .trim_end()
                .to_string(),
        }
    }

    /// Build a negotiation failure with no HTTP status (transport or parse).
    pub fn negotiation(detail: impl Into<String>) -> Self {
        CtermError::Negotiation {
            status: None,
            detail: detail.into(),
        }
    }

    /// Whether this error is recoverable at the frame level (the frame is
    /// dropped and the session continues).
    pub fn is_frame_local(&self) -> bool {
        matches!(self, CtermError::Decode(_))
    }
}

pub type CtermResult<T> = Result<T, CtermError>;

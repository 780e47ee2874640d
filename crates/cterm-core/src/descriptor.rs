//! Session descriptor returned by the negotiation endpoint.

use serde::{Deserialize, Serialize};

/// The routing information needed to open a terminal channel.
///
/// Obtained once per dialog from the negotiation endpoint and never
/// mutated afterwards. The wire format uses `hostname`/`username`; the
/// struct keeps the shorter field names used throughout the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Opaque channel routing key, used as a path component when opening
    /// the terminal channel.
    pub session_id: String,

    /// Target host the session runs on.
    #[serde(rename = "hostname")]
    pub host: String,

    /// Target port.
    pub port: u16,

    /// Remote user the session runs as.
    #[serde(rename = "username")]
    pub user: String,
}

impl SessionDescriptor {
    /// `user@host:port` form for logs and status lines.
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negotiation_response() {
        let json = r#"{"session_id":"abc123","hostname":"10.0.0.5","port":22,"username":"ubuntu"}"#;
        let d: SessionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.session_id, "abc123");
        assert_eq!(d.host, "10.0.0.5");
        assert_eq!(d.port, 22);
        assert_eq!(d.user, "ubuntu");
        assert_eq!(d.endpoint(), "ubuntu@10.0.0.5:22");
    }

    #[test]
    fn missing_field_is_an_error() {
        let json = r#"{"session_id":"abc123","hostname":"10.0.0.5"}"#;
        assert!(serde_json::from_str::<SessionDescriptor>(json).is_err());
    }
}

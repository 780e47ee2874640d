//! Session negotiation against the dashboard.
//!
//! A single credentialed GET converts a cluster name into a
//! [`SessionDescriptor`]. One attempt per call, no retries — the caller
//! decides whether to retry by reopening the dialog.

use std::time::Duration;

use cterm_core::{CtermError, CtermResult, SessionDescriptor};

/// Resolves cluster names to terminal session descriptors.
pub struct Negotiator {
    http: reqwest::Client,
    base_url: String,
    credentials: crate::auth::Credentials,
}

impl Negotiator {
    /// Build a negotiator for the dashboard at `base_url`.
    ///
    /// The URL may omit the scheme (`http://` is assumed). Timeouts are
    /// deliberately short so a dead dashboard surfaces as a negotiation
    /// failure instead of a hang.
    pub fn new(base_url: &str, credentials: crate::auth::Credentials) -> Self {
        let base_url = normalize_base_url(base_url);

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// Resolve `cluster` to a session descriptor.
    ///
    /// Exactly one outbound request. Fails with
    /// [`CtermError::Negotiation`] on an empty cluster name, a non-2xx
    /// status (the status is embedded in the message), or an unparsable
    /// response body.
    pub async fn negotiate(&self, cluster: &str) -> CtermResult<SessionDescriptor> {
        if cluster.is_empty() {
            return Err(CtermError::negotiation("cluster name is empty"));
        }

        let url = format!("{}/api/v1/clusters/{cluster}/terminal", self.base_url);
        tracing::debug!(url = %url, "negotiating terminal session");

        let response = self
            .credentials
            .apply(self.http.get(&url))
            .send()
            .await
            .map_err(|e| {
                CtermError::negotiation(format!("terminal session request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CtermError::negotiation_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
            ));
        }

        let descriptor: SessionDescriptor = response.json().await.map_err(|e| {
            CtermError::negotiation(format!("unparsable terminal session response: {e}"))
        })?;

        tracing::info!(
            session_id = %descriptor.session_id,
            endpoint = %descriptor.endpoint(),
            "negotiated terminal session"
        );
        Ok(descriptor)
    }

    /// The WebSocket endpoint for a negotiated session, derived from the
    /// dashboard base URL (`http` → `ws`, `https` → `wss`).
    pub fn channel_url(&self, session_id: &str) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{ws_base}/api/v1/terminals/{session_id}")
    }

    /// The credentials used for both negotiation and the channel handshake.
    pub fn credentials(&self) -> &crate::auth::Credentials {
        &self.credentials
    }
}

/// Trim trailing slashes and default to `http://` when no scheme is given.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response on an ephemeral port.
    async fn one_shot_http(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn negotiate_parses_descriptor() {
        let base = one_shot_http(
            "200 OK",
            r#"{"session_id":"abc123","hostname":"10.0.0.5","port":22,"username":"ubuntu"}"#,
        )
        .await;

        let negotiator = Negotiator::new(&base, Credentials::anonymous());
        let d = negotiator.negotiate("cluster-7").await.unwrap();
        assert_eq!(d.session_id, "abc123");
        assert_eq!(d.host, "10.0.0.5");
        assert_eq!(d.port, 22);
        assert_eq!(d.user, "ubuntu");
    }

    #[tokio::test]
    async fn negotiate_surfaces_http_status() {
        let base = one_shot_http("404 Not Found", "{}").await;

        let negotiator = Negotiator::new(&base, Credentials::anonymous());
        let err = negotiator.negotiate("missing-cluster").await.unwrap_err();
        match err {
            CtermError::Negotiation { status, detail } => {
                assert_eq!(status, Some(404));
                assert!(detail.contains("404"), "detail was: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn negotiate_rejects_unparsable_body() {
        let base = one_shot_http("200 OK", "not json at all").await;

        let negotiator = Negotiator::new(&base, Credentials::anonymous());
        let err = negotiator.negotiate("cluster-7").await.unwrap_err();
        assert!(matches!(err, CtermError::Negotiation { status: None, .. }));
    }

    #[tokio::test]
    async fn negotiate_rejects_empty_cluster_without_a_request() {
        // Unroutable base URL — an attempted request would fail differently.
        let negotiator = Negotiator::new("http://127.0.0.1:9", Credentials::anonymous());
        let err = negotiator.negotiate("").await.unwrap_err();
        match err {
            CtermError::Negotiation { detail, .. } => assert!(detail.contains("empty")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn channel_url_swaps_scheme() {
        let n = Negotiator::new("https://dash.example.com/", Credentials::anonymous());
        assert_eq!(
            n.channel_url("abc123"),
            "wss://dash.example.com/api/v1/terminals/abc123"
        );

        let n = Negotiator::new("dash.example.com:8265", Credentials::anonymous());
        assert_eq!(
            n.channel_url("abc123"),
            "ws://dash.example.com:8265/api/v1/terminals/abc123"
        );
    }
}

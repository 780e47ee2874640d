//! Credential application for dashboard requests.
//!
//! The bridge never implements an authentication scheme itself; it only
//! attaches whatever credentials the host supplies to the negotiation
//! request and to the channel handshake.

use tokio_tungstenite::tungstenite::http;

/// Credentials attached to every outbound dashboard call.
///
/// Either slot may be empty; an all-empty value produces anonymous
/// requests (useful against unauthenticated dev dashboards).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    token: Option<String>,
    cookie: Option<String>,
}

impl Credentials {
    /// Anonymous credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Bearer-token credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            cookie: None,
        }
    }

    /// Session-cookie credentials.
    pub fn cookie(cookie: impl Into<String>) -> Self {
        Self {
            token: None,
            cookie: Some(cookie.into()),
        }
    }

    /// Apply the credentials to an HTTP request.
    pub fn apply(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(cookie) = &self.cookie {
            req = req.header(reqwest::header::COOKIE, cookie);
        }
        req
    }

    /// Apply the credentials to a WebSocket handshake request.
    pub fn apply_handshake(&self, req: &mut http::Request<()>) {
        let headers = req.headers_mut();
        if let Some(token) = &self.token {
            if let Ok(value) = http::HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(http::header::AUTHORIZATION, value);
            }
        }
        if let Some(cookie) = &self.cookie {
            if let Ok(value) = http::HeaderValue::from_str(cookie) {
                headers.insert(http::header::COOKIE, value);
            }
        }
    }
}

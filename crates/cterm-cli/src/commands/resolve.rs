//! `cterm resolve <cluster>` — negotiate and print the session descriptor.
//!
//! Debugging aid: exercises the negotiation path without opening a
//! channel, so a misconfigured dashboard or token fails fast and visibly.

use anyhow::{Context, Result};

/// Negotiate a session for `cluster` and print the descriptor.
pub async fn run(cluster: &str, dashboard: &str, token: Option<&str>) -> Result<()> {
    let negotiator = super::negotiator(dashboard, token);

    let descriptor = negotiator
        .negotiate(cluster)
        .await
        .with_context(|| format!("could not negotiate a session for {cluster}"))?;

    println!("session_id: {}", descriptor.session_id);
    println!("endpoint:   {}", descriptor.endpoint());
    println!("channel:    {}", negotiator.channel_url(&descriptor.session_id));
    Ok(())
}

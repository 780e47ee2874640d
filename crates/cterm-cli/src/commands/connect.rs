//! `cterm connect <cluster>` — open an interactive terminal session.
//!
//! Builds the bridge with the local crossterm surface, opens the dialog,
//! and blocks until any close trigger (Ctrl+] detach, remote close,
//! transport failure) tears it down.

use anyhow::Result;
use tracing::info;

use cterm_client::{CrosstermSurface, TerminalBridge};

/// Run an interactive session against `cluster`.
pub async fn run(cluster: &str, dashboard: &str, token: Option<&str>) -> Result<()> {
    let negotiator = super::negotiator(dashboard, token);
    let bridge = TerminalBridge::new(negotiator, Box::new(CrosstermSurface::new()));

    eprintln!("Connecting to {cluster} (press Ctrl+] to detach)...");
    bridge.open(cluster).await;

    // Ctrl+C must tear the dialog down, not leave the terminal raw.
    tokio::select! {
        _ = bridge.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, closing session");
            bridge.close().await;
            bridge.wait().await;
        }
    }

    if let Some(reason) = bridge.last_error() {
        anyhow::bail!("session to {cluster} failed: {reason}");
    }
    eprintln!("\r\nConnection to {cluster} closed.");
    Ok(())
}

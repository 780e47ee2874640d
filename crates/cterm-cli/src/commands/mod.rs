//! cterm subcommand implementations.

pub mod connect;
pub mod resolve;

use cterm_client::{Credentials, Negotiator};

/// Build a negotiator from the shared CLI arguments.
pub fn negotiator(dashboard: &str, token: Option<&str>) -> Negotiator {
    let credentials = match token {
        Some(token) => Credentials::bearer(token),
        None => Credentials::anonymous(),
    };
    Negotiator::new(dashboard, credentials)
}

//! Deadline-bound outbound HTTP calls.
//!
//! Every network call the service makes (probes, snapshot polls, proxy forwards) runs through
//! [`bounded`], which races it against a deadline and a [`CancellationToken`]. Callers see either
//! the call's own result or a uniform [`CallError::Timeout`] / [`CallError::Cancelled`], regardless
//! of how the transport would have expressed it. Losing the race drops the call's future, which
//! aborts the in-flight request.

use reqwest::{Client, StatusCode, redirect::Policy};
use std::{future::Future, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("reported status {0}")]
    Unhealthy(String),
}

/// Install the process-wide rustls crypto provider. Safe to call more than once.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build the shared HTTP client. Deadlines are applied per call by [`bounded`], not on the client.
pub fn build_client(max_redirects: usize) -> anyhow::Result<Client> {
    install_crypto_provider();
    let client = Client::builder().redirect(Policy::limited(max_redirects)).build()?;
    Ok(client)
}

/// Run `call` until it finishes, `deadline` elapses, or `token` is cancelled.
pub async fn bounded<F, T>(deadline: Duration, token: &CancellationToken, call: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, CallError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CallError::Cancelled),
        outcome = tokio::time::timeout(deadline, call) => outcome.unwrap_or(Err(CallError::Timeout(deadline))),
    }
}
